//! OpenAPI document for the documented routes.
//!
//! Add new endpoints here via `paths(...)` so they stay in the served spec.
//! Routes like `/` and `/api/openapi.json` itself are intentionally not
//! documented.

use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

use super::handlers::{auth, health, me};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "lectern",
        description = "Session and trust layer for the Lectern curriculum platform"
    ),
    paths(
        auth::login::login,
        auth::refresh::refresh,
        auth::session::logout,
        health::health,
        me::me,
    ),
    components(schemas(
        auth::types::LoginRequest,
        auth::types::TokenResponse,
        auth::types::LogoutResponse,
        health::Health,
        me::MeResponse,
    )),
    tags(
        (name = "auth", description = "Login, refresh token rotation, and logout"),
        (name = "health", description = "Service health"),
        (name = "me", description = "Authenticated subject")
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

// axum handler serving the spec
pub async fn openapi_json() -> impl IntoResponse {
    Json(openapi())
}
