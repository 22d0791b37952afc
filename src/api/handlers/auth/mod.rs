//! Auth handlers and supporting modules.
//!
//! This module coordinates password login, refresh-token rotation, and
//! logout, plus the seams the protective middleware needs (rate limiter,
//! token verification).
//!
//! ## Token channels
//!
//! Access tokens are stateless HS256 JWTs returned in response bodies;
//! refresh tokens are opaque secrets delivered only via an `HttpOnly` cookie
//! and tracked server-side by hash.
//!
//! ## Rotation chains
//!
//! A refresh token is single-use. Consuming it installs a linked successor;
//! presenting a consumed token again revokes every outstanding token for
//! that subject.
//!
//! > **Warning:** Rotating the signing secret invalidates all outstanding
//! > access tokens. Their TTL is short by design, so this is the accepted
//! > emergency revocation lever.

pub(crate) mod error;
pub(crate) mod login;
pub(crate) mod password;
pub(crate) mod rate_limit;
pub(crate) mod refresh;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub(crate) mod store;
pub(crate) mod token;
pub(crate) mod types;
pub(crate) mod utils;

pub use password::hash_password;
pub use rate_limit::{FixedWindowRateLimiter, NoopRateLimiter};
pub use state::{AuthConfig, AuthState};
pub use storage::{PgIdentityStore, PgSessionStore};
pub use store::{
    Identity, MemoryIdentityStore, MemorySessionStore, RefreshRecord, Role, RotateOutcome,
};
