//! Per-client rate limiting for every protected route.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use crate::api::handlers::auth::{
    error::AuthError, rate_limit::RateLimitDecision, AuthState,
};

/// Reject the request before it reaches the handler once the client key has
/// exhausted its window.
pub async fn rate_limit(
    auth_state: Extension<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let client_key = super::client_key(&request);
    match auth_state.rate_limiter().allow(&client_key) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Limited {
            retry_after_seconds,
        } => {
            debug!(%client_key, "Rate limit exceeded");
            AuthError::RateLimited {
                retry_after_seconds,
            }
            .into_response()
        }
    }
}
