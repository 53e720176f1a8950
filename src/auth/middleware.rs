use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{TokenValidationError, extract_token_from_header, validate_token};
use crate::server::AppState;
use crate::types::{ApiToken, User};

/// Extractor that requires a valid bearer token bound to a live user.
pub struct RequireUser {
    pub token: ApiToken,
    pub user: User,
}

/// Extractor that requires a moderator or admin.
pub struct RequireModerator {
    pub token: ApiToken,
    pub user: User,
}

/// Extractor that requires an admin.
pub struct RequireAdmin {
    pub token: ApiToken,
    pub user: User,
}

/// Extractor for endpoints that behave differently when authenticated but do
/// not require it.
pub struct OptionalUser(pub Option<User>);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenRevoked,
    NotModerator,
    NotAdmin,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenRevoked => (StatusCode::UNAUTHORIZED, "Token revoked"),
            AuthError::NotModerator => (StatusCode::FORBIDDEN, "Moderator access required"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                "Bearer realm=\"clawdhub\"".parse().unwrap(),
            );
        }

        response
    }
}

impl From<TokenValidationError> for AuthError {
    fn from(e: TokenValidationError) -> Self {
        match e {
            TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
            TokenValidationError::InvalidToken => AuthError::InvalidToken,
            TokenValidationError::TokenRevoked => AuthError::TokenRevoked,
            TokenValidationError::InternalError => AuthError::InternalError,
        }
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate(parts, state)?;
        Ok(RequireUser {
            token: validated.token,
            user: validated.user,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireModerator {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate(parts, state)?;

        if !validated.user.role.is_moderator() {
            return Err(AuthError::NotModerator);
        }

        Ok(RequireModerator {
            token: validated.token,
            user: validated.user,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate(parts, state)?;

        if validated.user.role != crate::types::Role::Admin {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin {
            token: validated.token,
            user: validated.user,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for OptionalUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match extract_token_from_header(auth_header) {
            Ok(None) => Ok(OptionalUser(None)),
            Ok(Some(raw)) => {
                let validated = validate_token(state, &raw).map_err(AuthError::from)?;
                Ok(OptionalUser(Some(validated.user)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn extract_and_validate(
    parts: &mut Parts,
    state: &Arc<AppState>,
) -> Result<super::helpers::ValidatedToken, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = extract_token_from_header(auth_header)
        .map_err(AuthError::from)?
        .ok_or(AuthError::MissingAuth)?;

    validate_token(state, &raw_token).map_err(AuthError::from)
}
