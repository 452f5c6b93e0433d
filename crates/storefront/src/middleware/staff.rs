//! Bearer-token guard for staff endpoints.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use secrecy::ExposeSecret;

use crate::error::AppError;
use crate::state::AppState;
use crate::stripe::constant_time_compare;

/// Extractor that admits requests carrying `Authorization: Bearer <STAFF_API_TOKEN>`.
///
/// When no staff token is configured, staff routes answer 404.
#[derive(Debug, Clone, Copy)]
pub struct RequireStaff;

impl FromRequestParts<AppState> for RequireStaff {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = &state.config().staff_api_token else {
            return Err(AppError::NotFound("staff API is disabled".to_string()));
        };

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        if !constant_time_compare(presented, expected.expose_secret()) {
            tracing::warn!(path = %parts.uri.path(), "Rejected staff request with wrong token");
            return Err(AppError::Unauthorized("invalid bearer token".to_string()));
        }
        Ok(Self)
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("bearer  abc123 "), Some("abc123"));
        assert_eq!(bearer_token("Basic abc123"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc123"), None);
    }
}
