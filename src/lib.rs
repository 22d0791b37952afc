//! # Lectern (Session & Trust Layer)
//!
//! `lectern` is the request-boundary session and trust layer of the Lectern
//! curriculum platform. It authenticates educators and administrators with a
//! password, issues short-lived bearer access tokens and long-lived refresh
//! tokens, rotates and revokes refresh tokens safely, and wraps every inbound
//! request with protective middleware (rate limiting, security headers, audit
//! logging).
//!
//! ## Credential channels
//!
//! - **Access tokens** are stateless HS256-signed claim sets returned in the
//!   response body for use in an `Authorization: Bearer` header. They expire
//!   within minutes and are never persisted or revocable before expiry.
//! - **Refresh tokens** are opaque high-entropy secrets delivered only via an
//!   `HttpOnly; SameSite=Lax` cookie. The server stores a SHA-256 hash, never
//!   the raw value, so a leaked database dump cannot be replayed.
//!
//! ## Rotation
//!
//! Each `/auth/refresh` call consumes the presented refresh token atomically
//! and issues a linked successor. Presenting a consumed token is treated as
//! credential theft: the whole rotation chain for that subject is revoked.
//!
//! Curriculum and lesson-plan entities live in sibling services; this crate
//! only reads identities (and stamps `last_login`) through a narrow store
//! seam.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
