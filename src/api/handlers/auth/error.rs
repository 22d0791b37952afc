//! Client-facing error taxonomy for the auth endpoints.
//!
//! Messages are deliberately generic: a 401 never reveals whether the email,
//! the password, or the session was the problem.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid session")]
    InvalidSession,
    #[error("reused refresh token")]
    ReusedToken,
    #[error("rate limited")]
    RateLimited { retry_after_seconds: u64 },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Invalid email or password".to_string(),
            )
                .into_response(),
            // Replay gets the same body as a stale session; the containment
            // action happens server-side.
            Self::InvalidSession | Self::ReusedToken => {
                (StatusCode::UNAUTHORIZED, "Invalid session".to_string()).into_response()
            }
            Self::RateLimited {
                retry_after_seconds,
            } => {
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                    response.headers_mut().insert(RETRY_AFTER, value);
                }
                response
            }
            Self::Internal(err) => {
                error!("Internal auth error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AuthError;
    use axum::http::{header::RETRY_AFTER, StatusCode};
    use axum::response::IntoResponse;

    #[test]
    fn credential_and_session_errors_are_unauthorized() {
        assert_eq!(
            AuthError::InvalidCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidSession.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::ReusedToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn reuse_and_stale_session_share_a_body() {
        // Same status, same message: the client cannot tell replay detection
        // from ordinary expiry.
        let stale = AuthError::InvalidSession.into_response();
        let reused = AuthError::ReusedToken.into_response();
        assert_eq!(stale.status(), reused.status());
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let response = AuthError::RateLimited {
            retry_after_seconds: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("42")
        );
    }

    #[test]
    fn internal_errors_hide_detail() {
        let response = AuthError::Internal(anyhow::anyhow!("pool exhausted")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
