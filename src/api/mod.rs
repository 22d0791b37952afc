use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Extension, Router,
};
use secrecy::SecretString;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug, error, info, info_span, Span};
use ulid::Ulid;
use url::Url;

// Keep these internal to the crate while allowing CLI/server wiring to reference them.
pub mod handlers;
pub(crate) mod middleware;
mod openapi;

pub use openapi::openapi;

use handlers::auth::store::SessionStore;
use handlers::auth::{AuthConfig, AuthState, FixedWindowRateLimiter, PgIdentityStore, PgSessionStore};
use handlers::{auth, health, me, root};
use middleware::audit::{spawn_audit_worker, AuditRecorder};

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Build the application router with the full interceptor stack.
///
/// Outermost to innermost around the handlers: request-id, trace, CORS,
/// security headers, audit, rate limiter. The rate limiter sits innermost so
/// its 429 still passes through the header and audit interceptors.
///
/// # Errors
///
/// Returns an error when the public base URL cannot be turned into a CORS
/// origin.
pub fn app(pool: PgPool, auth_state: Arc<AuthState>, recorder: AuditRecorder) -> Result<Router> {
    let frontend_origin = frontend_origin(auth_state.config().public_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let router = Router::new()
        .route("/", get(root::root))
        .route("/auth/login", post(auth::login::login))
        .route("/auth/refresh", post(auth::refresh::refresh))
        .route("/auth/logout", post(auth::session::logout))
        .route("/api/health", get(health::health))
        .route("/api/openapi.json", get(openapi::openapi_json))
        .route(
            "/api/me",
            get(me::me)
                .route_layer(axum_middleware::from_fn(middleware::bearer::require_bearer)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(recorder))
                .layer(Extension(pool))
                .layer(axum_middleware::from_fn(
                    middleware::headers::security_headers,
                ))
                .layer(axum_middleware::from_fn(middleware::audit::audit))
                .layer(axum_middleware::from_fn(middleware::rate_limit::rate_limit)),
        );

    Ok(router)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    signing_secret: SecretString,
    config: AuthConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let identities = Arc::new(PgIdentityStore::new(pool.clone()));
    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));
    let rate_limiter = Arc::new(FixedWindowRateLimiter::new(
        config.rate_limit_capacity(),
        config.rate_limit_window(),
    ));

    let auth_state = Arc::new(
        AuthState::new(
            config,
            signing_secret,
            identities,
            sessions.clone(),
            rate_limiter,
        )
        .context("Failed to build auth state")?,
    );

    // Background worker drains audit entries off the request path.
    let recorder = spawn_audit_worker();

    // Expired refresh records are dead weight; sweep them periodically.
    spawn_purge_worker(sessions);

    let app = app(pool, auth_state, recorder)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn spawn_purge_worker(sessions: Arc<dyn SessionStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => {}
                Ok(count) => debug!("Purged {count} expired refresh tokens"),
                Err(err) => error!("Failed to purge expired refresh tokens: {err}"),
            }
        }
    });
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(public_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(public_base_url)
        .with_context(|| format!("Invalid public base URL: {public_base_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Public base URL must include a valid host: {public_base_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::frontend_origin;
    use anyhow::Result;

    #[test]
    fn frontend_origin_strips_path_and_keeps_port() -> Result<()> {
        let origin = frontend_origin("https://lectern.dev/app/")?;
        assert_eq!(origin.to_str()?, "https://lectern.dev");

        let origin = frontend_origin("http://localhost:8080")?;
        assert_eq!(origin.to_str()?, "http://localhost:8080");
        Ok(())
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }
}
