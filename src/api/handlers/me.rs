//! Authenticated self-service endpoint.
//!
//! The bearer middleware verifies the access token and attaches the subject;
//! this handler only resolves the identity behind it.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::auth::{error::AuthError, AuthState};
use crate::api::middleware::bearer::AuthenticatedUser;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
    pub last_login: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Return the authenticated subject.", body = MeResponse),
        (status = 401, description = "Missing or invalid bearer token."),
    ),
    tag = "me"
)]
pub async fn me(
    user: Extension<AuthenticatedUser>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, AuthError> {
    let identity = auth_state.identities().find_by_id(user.user_id).await?;

    // A valid token for a deleted subject is still a dead session.
    let Some(identity) = identity else {
        return Err(AuthError::InvalidSession);
    };

    let response = MeResponse {
        id: identity.id.to_string(),
        email: identity.email,
        role: identity.role.as_str().to_string(),
        created_at: identity.created_at.to_rfc3339(),
        last_login: identity.last_login.map(|at| at.to_rfc3339()),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
