use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{RequireUser, TokenGenerator};
use crate::types::ApiToken;

use super::AppState;
use super::dto::{CreateTokenBody, CreatedTokenResponse};
use super::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};

pub async fn create_token(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTokenBody>,
) -> Result<impl IntoResponse, ApiError> {
    let generator = TokenGenerator::new();
    let (raw_token, lookup, hash) = generator
        .generate()
        .map_err(|_| ApiError::internal("Failed to generate token"))?;

    let token = ApiToken {
        id: Uuid::new_v4().to_string(),
        token_hash: hash,
        token_lookup: lookup,
        user_id: auth.user.id.clone(),
        label: body.label,
        created_at: Utc::now(),
        revoked_at: None,
        last_used_at: None,
    };

    state
        .store
        .create_token(&token)
        .api_err("Failed to create token")?;

    Ok(Json(ApiResponse::success(CreatedTokenResponse {
        token: raw_token,
        id: token.id,
        label: token.label,
    })))
}

pub async fn list_tokens(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state
        .store
        .list_user_tokens(&auth.user.id)
        .api_err("Failed to list tokens")?;
    Ok(Json(ApiResponse::success(tokens)))
}

pub async fn revoke_token(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let token = state
        .store
        .get_token_by_id(&id)
        .api_err("Failed to get token")?
        .or_not_found("Token not found")?;

    if token.user_id != auth.user.id && !auth.user.role.is_moderator() {
        return Err(ApiError::forbidden("Not your token"));
    }

    state
        .store
        .revoke_token(&token.id)
        .api_err("Failed to revoke token")?;

    Ok(Json(ApiResponse::success(serde_json::json!({}))))
}
