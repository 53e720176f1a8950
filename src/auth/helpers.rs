use std::sync::Arc;

use super::{TokenGenerator, parse_token};
use crate::server::AppState;
use crate::types::{ApiToken, User};

#[derive(Debug)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenRevoked,
    InternalError,
}

pub struct ValidatedToken {
    pub token: ApiToken,
    pub user: User,
}

/// Validates a raw token string against the store.
/// Returns the validated token and its owning user.
pub fn validate_token(
    state: &Arc<AppState>,
    raw_token: &str,
) -> Result<ValidatedToken, TokenValidationError> {
    let (lookup, _secret) =
        parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = state
        .store
        .get_token_by_lookup(&lookup)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    let generator = TokenGenerator::new();
    if !generator
        .verify(raw_token, &token.token_hash)
        .map_err(|_| TokenValidationError::InternalError)?
    {
        return Err(TokenValidationError::InvalidToken);
    }

    if token.revoked_at.is_some() {
        return Err(TokenValidationError::TokenRevoked);
    }

    let user = state
        .store
        .get_user(&token.user_id)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    if user.deleted_at.is_some() {
        return Err(TokenValidationError::TokenRevoked);
    }

    if let Err(e) = state.store.update_token_last_used(&token.id) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(ValidatedToken { token, user })
}

/// Extracts a token from an Authorization header. Bearer is the only
/// supported scheme on this API.
/// Returns None if no auth header is present.
pub fn extract_token_from_header(
    auth_header: Option<&str>,
) -> Result<Option<String>, TokenValidationError> {
    match auth_header {
        Some(header) if header.starts_with("Bearer ") => {
            Ok(Some(header.strip_prefix("Bearer ").unwrap().to_string()))
        }
        Some(_) => Err(TokenValidationError::InvalidScheme),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer() {
        let token = extract_token_from_header(Some("Bearer clawdhub_abc_def")).unwrap();
        assert_eq!(token.as_deref(), Some("clawdhub_abc_def"));
    }

    #[test]
    fn test_extract_missing() {
        assert!(extract_token_from_header(None).unwrap().is_none());
    }

    #[test]
    fn test_extract_wrong_scheme() {
        assert!(matches!(
            extract_token_from_header(Some("Basic dXNlcjpwYXNz")),
            Err(TokenValidationError::InvalidScheme)
        ));
    }
}
