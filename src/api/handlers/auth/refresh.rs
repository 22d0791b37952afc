//! Refresh token rotation endpoint.
//!
//! Each refresh chain walks `ISSUED -> ACTIVE -> ROTATED | EXPIRED | REVOKED`.
//! Presenting a consumed token is treated as theft: the whole chain for that
//! subject is revoked before the caller sees a 401.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::api::middleware::audit::AuditIdentity;

use super::{
    error::AuthError,
    session::{extract_refresh_cookie, refresh_cookie},
    state::AuthState,
    store::RotateOutcome,
    types::TokenResponse,
    utils::{generate_refresh_secret, hash_refresh_secret},
};

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Tokens rotated, new refresh cookie set", body = TokenResponse),
        (status = 401, description = "Invalid, expired, or replayed refresh token", body = String)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, AuthError> {
    let Some(presented) = extract_refresh_cookie(&headers) else {
        return Err(AuthError::InvalidSession);
    };
    let presented_hash = hash_refresh_secret(&presented);

    // Mint the successor before the claim so the store can install it in the
    // same atomic step that consumes the presented token.
    let successor_secret = generate_refresh_secret()?;
    let successor_hash = hash_refresh_secret(&successor_secret);

    let outcome = auth_state
        .sessions()
        .rotate(
            &presented_hash,
            &successor_hash,
            auth_state.config().refresh_token_ttl_seconds(),
        )
        .await?;

    match outcome {
        RotateOutcome::Missing => Err(AuthError::InvalidSession),
        RotateOutcome::Reused { user_id } => {
            warn!(%user_id, "Refresh token replay detected, revoking the rotation chain");
            if let Err(err) = auth_state.sessions().revoke_all_for_subject(user_id).await {
                error!("Failed to revoke sessions after replay: {err}");
            }
            Err(AuthError::ReusedToken)
        }
        RotateOutcome::Rotated { record } => {
            let identity = auth_state.identities().find_by_id(record.user_id).await?;
            let Some(identity) = identity else {
                // The subject vanished mid-chain; the successor must not
                // outlive it.
                if let Err(err) = auth_state
                    .sessions()
                    .revoke_all_for_subject(record.user_id)
                    .await
                {
                    error!("Failed to revoke sessions for missing subject: {err}");
                }
                return Err(AuthError::InvalidSession);
            };

            let access_token = auth_state
                .issue_access_token(&identity)
                .map_err(|err| AuthError::Internal(anyhow::Error::new(err)))?;
            let cookie = refresh_cookie(auth_state.config(), &successor_secret)
                .map_err(|err| AuthError::Internal(anyhow::Error::new(err)))?;

            let mut response =
                (StatusCode::OK, Json(TokenResponse::bearer(access_token))).into_response();
            response.headers_mut().insert(SET_COOKIE, cookie);
            response.extensions_mut().insert(AuditIdentity(identity.id));
            Ok(response)
        }
    }
}
