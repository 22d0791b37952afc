//! Bearer access-token verification for protected API routes.

use axum::{
    extract::{Extension, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::audit::AuditIdentity;
use crate::api::handlers::auth::{store::Role, utils::extract_bearer_token, AuthState};

/// Verified subject attached to the request for downstream handlers.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: Role,
}

/// Reject the request unless it carries a valid, unexpired access token.
pub async fn require_bearer(
    auth_state: Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(request.headers()) else {
        return unauthorized();
    };

    let claims = match auth_state.verify_access_token(&token) {
        Ok(claims) => claims,
        Err(err) => {
            debug!("Rejected access token: {err}");
            return unauthorized();
        }
    };

    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return unauthorized();
    };

    request.extensions_mut().insert(AuthenticatedUser {
        user_id,
        role: claims.role,
    });

    let mut response = next.run(request).await;
    response.extensions_mut().insert(AuditIdentity(user_id));
    response
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response()
}
