//! Refresh cookie handling and logout.
//!
//! The refresh secret travels only in an `HttpOnly` cookie so script-readable
//! storage never sees it; the access token is the deliberately script-visible
//! channel.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::{
    state::{AuthConfig, AuthState},
    types::LogoutResponse,
    utils::hash_refresh_secret,
};

const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Refresh token revoked and cookie cleared", body = LogoutResponse)
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    if let Some(secret) = extract_refresh_cookie(&headers) {
        let token_hash = hash_refresh_secret(&secret);
        if let Err(err) = auth_state.sessions().revoke(&token_hash).await {
            error!("Failed to revoke session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_refresh_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(LogoutResponse {
            message: "Logged out".to_string(),
        }),
    )
        .into_response()
}

/// Build a secure `HttpOnly` cookie carrying the refresh secret.
pub(super) fn refresh_cookie(
    config: &AuthConfig,
    secret: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.refresh_token_ttl_seconds();
    let secure = config.cookie_secure();
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={secret}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = config.cookie_secure();
    let mut cookie = format!("{REFRESH_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Pull the refresh secret out of the request cookies, if present.
pub(super) fn extract_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == REFRESH_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}
