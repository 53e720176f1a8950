use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;

use crate::auth::RequireUser;
use crate::types::Star;

use super::AppState;
use super::response::{ApiError, ApiResponse, StoreResultExt};
use super::skills::require_live_skill;

pub async fn star_skill(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let skill = require_live_skill(&state, &slug)?;

    let inserted = state
        .store
        .add_star(&Star {
            user_id: auth.user.id.clone(),
            skill_id: skill.id.clone(),
            created_at: Utc::now(),
        })
        .api_err("Failed to star skill")?;

    if inserted {
        state
            .store
            .adjust_star_count(&skill.id, 1)
            .api_err("Failed to update star count")?;
    }

    Ok(Json(ApiResponse::success(
        serde_json::json!({ "starred": true }),
    )))
}

pub async fn unstar_skill(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let skill = require_live_skill(&state, &slug)?;

    let removed = state
        .store
        .remove_star(&auth.user.id, &skill.id)
        .api_err("Failed to unstar skill")?;

    if removed {
        state
            .store
            .adjust_star_count(&skill.id, -1)
            .api_err("Failed to update star count")?;
    }

    Ok(Json(ApiResponse::success(
        serde_json::json!({ "starred": false }),
    )))
}
