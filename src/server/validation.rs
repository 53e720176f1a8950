use semver::Version;

use super::response::ApiError;
use crate::registry::{is_hex64, validate_slug};

pub fn require_slug(slug: &str) -> Result<(), ApiError> {
    if validate_slug(slug) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("invalid slug: {slug}")))
    }
}

pub fn require_semver(version: &str) -> Result<Version, ApiError> {
    Version::parse(version)
        .map_err(|e| ApiError::bad_request(format!("invalid version '{version}': {e}")))
}

pub fn require_hex64(hash: &str) -> Result<(), ApiError> {
    if is_hex64(hash) {
        Ok(())
    } else {
        Err(ApiError::bad_request(
            "hash must be 64 lowercase hex characters",
        ))
    }
}

/// Clamps a caller-supplied page size into `[1, max]`, defaulting when absent.
#[must_use]
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_slug() {
        assert!(require_slug("demo").is_ok());
        assert!(require_slug("Demo").is_err());
    }

    #[test]
    fn test_require_semver() {
        assert!(require_semver("1.0.0").is_ok());
        assert!(require_semver("1.0").is_err());
        assert!(require_semver("not-a-version").is_err());
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 50, 200), 50);
        assert_eq!(clamp_limit(Some(0), 50, 200), 1);
        assert_eq!(clamp_limit(Some(500), 50, 200), 200);
        assert_eq!(clamp_limit(Some(25), 50, 200), 25);
    }
}
