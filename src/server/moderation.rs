use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::auth::{RequireAdmin, RequireModerator, RequireUser};
use crate::types::BadgeKind;

use super::AppState;
use super::dto::{ChangeOwnerBody, SetBadgeBody, SetDuplicateBody, UpdateTagsBody};
use super::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};

fn skill_id_by_slug(state: &AppState, slug: &str) -> Result<String, ApiError> {
    // Moderation endpoints operate on soft-deleted skills too.
    let skill = state
        .store
        .get_skill_by_slug(slug)
        .api_err("Failed to get skill")?
        .or_not_found("Skill not found")?;
    Ok(skill.id)
}

pub async fn update_tags(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(body): Json<UpdateTagsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let skill_id = skill_id_by_slug(&state, &slug)?;

    let entries: Vec<(String, String)> = body
        .tags
        .into_iter()
        .map(|e| (e.tag, e.version_id))
        .collect();

    let skill = state
        .registry
        .update_tags(&auth.user, &skill_id, &entries)
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(skill)))
}

pub async fn soft_delete_skill(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let skill_id = skill_id_by_slug(&state, &slug)?;
    let skill = state
        .registry
        .set_soft_deleted(&auth.user, &skill_id, true)
        .map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(skill)))
}

pub async fn undelete_skill(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let skill_id = skill_id_by_slug(&state, &slug)?;
    let skill = state
        .registry
        .set_soft_deleted(&auth.user, &skill_id, false)
        .map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(skill)))
}

pub async fn set_badge(
    auth: RequireModerator,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(body): Json<SetBadgeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = BadgeKind::parse(&body.kind)
        .ok_or_else(|| ApiError::bad_request(format!("unknown badge kind: {}", body.kind)))?;
    let skill_id = skill_id_by_slug(&state, &slug)?;

    state
        .registry
        .set_badge(&auth.user, &skill_id, kind, body.on)
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(serde_json::json!({}))))
}

pub async fn delete_badge(
    auth: RequireModerator,
    State(state): State<Arc<AppState>>,
    Path((slug, kind)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = BadgeKind::parse(&kind)
        .ok_or_else(|| ApiError::bad_request(format!("unknown badge kind: {kind}")))?;
    let skill_id = skill_id_by_slug(&state, &slug)?;

    state
        .registry
        .set_badge(&auth.user, &skill_id, kind, false)
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(serde_json::json!({}))))
}

pub async fn set_duplicate(
    auth: RequireModerator,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(body): Json<SetDuplicateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let skill_id = skill_id_by_slug(&state, &slug)?;
    let skill = state
        .registry
        .set_duplicate(&auth.user, &skill_id, body.canonical_slug.as_deref())
        .map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(skill)))
}

pub async fn change_owner(
    auth: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(body): Json<ChangeOwnerBody>,
) -> Result<impl IntoResponse, ApiError> {
    let skill_id = skill_id_by_slug(&state, &slug)?;
    let skill = state
        .registry
        .change_owner(&auth.user, &skill_id, &body.new_owner_user_id)
        .map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(skill)))
}

pub async fn hard_delete_skill(
    auth: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let skill_id = skill_id_by_slug(&state, &slug)?;
    state
        .registry
        .hard_delete(&auth.user, &skill_id)
        .map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(serde_json::json!({}))))
}
