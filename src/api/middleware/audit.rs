//! Best-effort audit logging for sensitive requests.
//!
//! Entries are handed to a background worker over an unbounded channel; the
//! response never waits on the write and a logging failure never surfaces as
//! an HTTP error.

use axum::{
    extract::{Extension, Request},
    http::header::USER_AGENT,
    middleware::Next,
    response::Response,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

/// Subject attribution for the audit entry, inserted into response
/// extensions by handlers and the bearer middleware.
#[derive(Debug, Clone, Copy)]
pub struct AuditIdentity(pub Uuid);

/// One immutable audit record, serialized as a single JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub event_type: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub process_time_ms: u64,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::UnboundedSender<AuditEntry>,
}

impl AuditRecorder {
    /// Create a recorder plus the receiving end, so tests can observe what
    /// was recorded without a worker task.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AuditEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Fire-and-forget. A closed channel drops the entry silently.
    pub fn record(&self, entry: AuditEntry) {
        let _ = self.tx.send(entry);
    }
}

/// Background worker draining audit entries into the log stream.
pub fn spawn_audit_worker() -> AuditRecorder {
    let (recorder, mut rx) = AuditRecorder::channel();
    tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            match serde_json::to_string(&entry) {
                Ok(line) => info!(target: "audit", "{line}"),
                Err(err) => error!("Failed to serialize audit entry: {err}"),
            }
        }
    });
    recorder
}

/// Sensitive-path predicate: API and auth endpoints are audited, health and
/// metrics probes are not.
pub(crate) fn is_audited(path: &str) -> bool {
    if path == "/api/health" || path == "/api/metrics" {
        return false;
    }
    path.starts_with("/api/") || path.starts_with("/auth/")
}

fn event_type(path: &str) -> &'static str {
    match path {
        "/auth/login" => "auth.login",
        "/auth/refresh" => "auth.refresh",
        "/auth/logout" => "auth.logout",
        _ => "api.request",
    }
}

pub async fn audit(
    recorder: Extension<AuditRecorder>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !is_audited(&path) {
        return next.run(request).await;
    }

    let method = request.method().to_string();
    let ip_address = super::client_ip(&request);
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let started = Instant::now();
    let response = next.run(request).await;

    let user_id = response
        .extensions()
        .get::<AuditIdentity>()
        .map(|identity| identity.0.to_string());

    recorder.record(AuditEntry {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        event_type: event_type(&path).to_string(),
        method,
        path,
        status_code: response.status().as_u16(),
        user_id,
        ip_address,
        process_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        user_agent,
    });

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn health_and_metrics_are_not_audited() {
        assert!(!is_audited("/api/health"));
        assert!(!is_audited("/api/metrics"));
    }

    #[test]
    fn api_and_auth_paths_are_audited() {
        assert!(is_audited("/api/me"));
        assert!(is_audited("/api/curricula/42"));
        assert!(is_audited("/auth/login"));
        assert!(is_audited("/auth/refresh"));
        assert!(is_audited("/auth/logout"));
    }

    #[test]
    fn unrelated_paths_are_not_audited() {
        assert!(!is_audited("/"));
        assert!(!is_audited("/favicon.ico"));
    }

    #[test]
    fn event_types_match_the_endpoint() {
        assert_eq!(event_type("/auth/login"), "auth.login");
        assert_eq!(event_type("/auth/refresh"), "auth.refresh");
        assert_eq!(event_type("/auth/logout"), "auth.logout");
        assert_eq!(event_type("/api/me"), "api.request");
    }

    #[test]
    fn entry_serializes_to_a_single_json_line() -> Result<()> {
        let entry = AuditEntry {
            timestamp: "2026-08-06T00:00:00.000Z".to_string(),
            event_type: "auth.login".to_string(),
            method: "POST".to_string(),
            path: "/auth/login".to_string(),
            status_code: 200,
            user_id: None,
            ip_address: Some("1.2.3.4".to_string()),
            process_time_ms: 12,
            user_agent: Some("curl/8".to_string()),
        };
        let line = serde_json::to_string(&entry)?;
        assert!(!line.contains('\n'));
        assert!(line.contains("\"user_id\":null"));
        assert!(line.contains("\"status_code\":200"));
        assert!(line.contains("\"process_time_ms\":12"));
        Ok(())
    }

    #[test]
    fn record_is_silent_after_receiver_drops() {
        let (recorder, rx) = AuditRecorder::channel();
        drop(rx);
        recorder.record(AuditEntry {
            timestamp: String::new(),
            event_type: "api.request".to_string(),
            method: "GET".to_string(),
            path: "/api/me".to_string(),
            status_code: 200,
            user_id: None,
            ip_address: None,
            process_time_ms: 0,
            user_agent: None,
        });
    }
}
