//! Password login endpoint.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;

use crate::api::middleware::audit::AuditIdentity;

use super::{
    error::AuthError,
    password::verify_password,
    session::refresh_cookie,
    state::AuthState,
    types::{LoginRequest, TokenResponse},
    utils::{generate_refresh_secret, hash_refresh_secret, normalize_email, valid_email},
};

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access token issued, refresh cookie set", body = TokenResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Ok((StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response());
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Ok((StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response());
    }

    let identity = auth_state.identities().find_by_email(&email).await?;

    let Some(identity) = identity else {
        // Burn the same hashing cost for unknown accounts so the response
        // does not reveal whether the email exists.
        let _ = verify_password(&request.password, auth_state.decoy_hash());
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(&request.password, &identity.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    // last_login is informational; a write failure must not block the login.
    if let Err(err) = auth_state.identities().record_login(identity.id).await {
        error!("Failed to record login timestamp: {err}");
    }

    let access_token = auth_state
        .issue_access_token(&identity)
        .map_err(|err| AuthError::Internal(anyhow::Error::new(err)))?;

    let refresh_secret = generate_refresh_secret()?;
    let refresh_hash = hash_refresh_secret(&refresh_secret);
    auth_state
        .sessions()
        .create(
            identity.id,
            &refresh_hash,
            auth_state.config().refresh_token_ttl_seconds(),
        )
        .await?;

    let cookie = refresh_cookie(auth_state.config(), &refresh_secret)
        .map_err(|err| AuthError::Internal(anyhow::Error::new(err)))?;

    let mut response =
        (StatusCode::OK, Json(TokenResponse::bearer(access_token))).into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    response.extensions_mut().insert(AuditIdentity(identity.id));
    Ok(response)
}
