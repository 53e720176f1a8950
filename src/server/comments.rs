use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::types::Comment;

use super::AppState;
use super::dto::CreateCommentBody;
use super::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, StoreOptionExt, StoreResultExt,
};
use super::skills::require_live_skill;
use super::validation::clamp_limit;

#[derive(Debug, Deserialize)]
pub struct ListCommentsParams {
    pub limit: Option<i64>,
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(params): Query<ListCommentsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let skill = require_live_skill(&state, &slug)?;
    let limit = clamp_limit(params.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);

    let comments = state
        .store
        .list_comments(&skill.id, limit)
        .api_err("Failed to list comments")?;

    Ok(Json(ApiResponse::success(comments)))
}

pub async fn create_comment(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(body): Json<CreateCommentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let skill = require_live_skill(&state, &slug)?;

    let text = body.body.trim();
    if text.is_empty() {
        return Err(ApiError::bad_request("comment cannot be empty"));
    }

    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        skill_id: skill.id.clone(),
        user_id: auth.user.id.clone(),
        body: text.to_string(),
        created_at: Utc::now(),
        soft_deleted_at: None,
    };

    state
        .store
        .create_comment(&comment)
        .api_err("Failed to create comment")?;
    state
        .store
        .adjust_comment_count(&skill.id, 1)
        .api_err("Failed to update comment count")?;

    Ok(Json(ApiResponse::success(comment)))
}

pub async fn delete_comment(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .store
        .get_comment(&id)
        .api_err("Failed to get comment")?
        .or_not_found("Comment not found")?;

    if comment.user_id != auth.user.id && !auth.user.role.is_moderator() {
        return Err(ApiError::forbidden("Not your comment"));
    }

    let deleted = state
        .store
        .soft_delete_comment(&comment.id)
        .api_err("Failed to delete comment")?;
    if deleted {
        state
            .store
            .adjust_comment_count(&comment.skill_id, -1)
            .api_err("Failed to update comment count")?;
    }

    Ok(Json(ApiResponse::success(serde_json::json!({}))))
}
