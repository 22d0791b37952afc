//! Auth state and configuration shared across handlers and middleware.

use anyhow::{Context, Result};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;

use super::password;
use super::rate_limit::RateLimiter;
use super::store::{Identity, IdentityStore, SessionStore};
use super::token::{self, AccessTokenClaims, TOKEN_VERSION};
use super::utils::generate_refresh_secret;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_RATE_LIMIT_CAPACITY: u32 = 60;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
const DEFAULT_HASH_COST: u32 = 2;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    public_base_url: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    rate_limit_capacity: u32,
    rate_limit_window_seconds: u64,
    hash_cost: u32,
}

impl AuthConfig {
    #[must_use]
    pub fn new(public_base_url: String) -> Self {
        Self {
            public_base_url,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            rate_limit_capacity: DEFAULT_RATE_LIMIT_CAPACITY,
            rate_limit_window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
            hash_cost: DEFAULT_HASH_COST,
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_limit_capacity(mut self, capacity: u32) -> Self {
        self.rate_limit_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_rate_limit_window_seconds(mut self, seconds: u64) -> Self {
        self.rate_limit_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    #[must_use]
    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub fn rate_limit_capacity(&self) -> u32 {
        self.rate_limit_capacity
    }

    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }

    #[must_use]
    pub fn hash_cost(&self) -> u32 {
        self.hash_cost
    }

    /// Only mark cookies secure when the platform is served over HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.public_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    signing_secret: SecretString,
    identities: Arc<dyn IdentityStore>,
    sessions: Arc<dyn SessionStore>,
    rate_limiter: Arc<dyn RateLimiter>,
    decoy_hash: String,
}

impl AuthState {
    /// Build the shared auth state.
    ///
    /// # Errors
    ///
    /// Fails when the signing secret is empty or the decoy hash cannot be
    /// minted; both abort startup rather than serving misconfigured.
    pub fn new(
        config: AuthConfig,
        signing_secret: SecretString,
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionStore>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self> {
        anyhow::ensure!(
            !signing_secret.expose_secret().trim().is_empty(),
            "signing secret must not be empty"
        );

        // Unknown emails verify against this hash so the login timing does
        // not reveal whether an account exists.
        let decoy_password =
            generate_refresh_secret().context("failed to generate decoy password")?;
        let decoy_hash = password::hash_password(&decoy_password, config.hash_cost())
            .context("failed to mint decoy hash")?;

        Ok(Self {
            config,
            signing_secret,
            identities,
            sessions,
            rate_limiter,
            decoy_hash,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn identities(&self) -> &dyn IdentityStore {
        self.identities.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(super) fn decoy_hash(&self) -> &str {
        &self.decoy_hash
    }

    /// Mint a signed access token for the identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded or signed.
    pub fn issue_access_token(&self, identity: &Identity) -> Result<String, token::Error> {
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            v: TOKEN_VERSION,
            sub: identity.id.to_string(),
            role: identity.role,
            iat: now,
            exp: now + self.config.access_token_ttl_seconds(),
        };
        token::sign_hs256(self.signing_secret.expose_secret().as_bytes(), &claims)
    }

    /// Verify a presented access token against the signing secret and clock.
    ///
    /// # Errors
    ///
    /// Returns an error when the token is malformed, forged, or expired.
    pub fn verify_access_token(&self, presented: &str) -> Result<AccessTokenClaims, token::Error> {
        token::verify_hs256(
            presented,
            self.signing_secret.expose_secret().as_bytes(),
            Utc::now().timestamp(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::NoopRateLimiter;
    use super::super::store::{Identity, MemoryIdentityStore, MemorySessionStore, Role};
    use super::{AuthConfig, AuthState};
    use anyhow::Result;
    use chrono::Utc;
    use secrecy::SecretString;
    use std::sync::Arc;
    use uuid::Uuid;

    fn test_state(config: AuthConfig) -> Result<AuthState> {
        AuthState::new(
            config,
            SecretString::from("unit-test-secret".to_string()),
            Arc::new(MemoryIdentityStore::new()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(NoopRateLimiter),
        )
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://lectern.dev".to_string());

        assert_eq!(config.public_base_url(), "https://lectern.dev");
        assert_eq!(
            config.access_token_ttl_seconds(),
            super::DEFAULT_ACCESS_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.refresh_token_ttl_seconds(),
            super::DEFAULT_REFRESH_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.rate_limit_capacity(),
            super::DEFAULT_RATE_LIMIT_CAPACITY
        );
        assert_eq!(config.hash_cost(), super::DEFAULT_HASH_COST);

        let config = config
            .with_access_token_ttl_seconds(120)
            .with_refresh_token_ttl_seconds(3600)
            .with_rate_limit_capacity(5)
            .with_rate_limit_window_seconds(10)
            .with_hash_cost(1);

        assert_eq!(config.access_token_ttl_seconds(), 120);
        assert_eq!(config.refresh_token_ttl_seconds(), 3600);
        assert_eq!(config.rate_limit_capacity(), 5);
        assert_eq!(config.rate_limit_window().as_secs(), 10);
        assert_eq!(config.hash_cost(), 1);
    }

    #[test]
    fn cookie_secure_follows_scheme() {
        assert!(AuthConfig::new("https://lectern.dev".to_string()).cookie_secure());
        assert!(!AuthConfig::new("http://localhost:8080".to_string()).cookie_secure());
    }

    #[test]
    fn empty_signing_secret_is_fatal() {
        let config = AuthConfig::new("http://localhost:8080".to_string()).with_hash_cost(1);
        let result = AuthState::new(
            config,
            SecretString::from("   ".to_string()),
            Arc::new(MemoryIdentityStore::new()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(NoopRateLimiter),
        );
        assert!(result.is_err());
    }

    #[test]
    fn issued_tokens_verify_and_carry_the_role() -> Result<()> {
        let config = AuthConfig::new("http://localhost:8080".to_string()).with_hash_cost(1);
        let state = test_state(config)?;
        let identity = Identity {
            id: Uuid::new_v4(),
            email: "admin@example.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            role: Role::Admin,
            created_at: Utc::now(),
            last_login: None,
        };

        let token = state.issue_access_token(&identity)?;
        let claims = state.verify_access_token(&token)?;
        assert_eq!(claims.sub, identity.id.to_string());
        assert_eq!(claims.role, Role::Admin);
        assert!(claims.exp > claims.iat);
        Ok(())
    }

    #[test]
    fn decoy_hash_never_matches_submitted_passwords() -> Result<()> {
        let config = AuthConfig::new("http://localhost:8080".to_string()).with_hash_cost(1);
        let state = test_state(config)?;
        assert!(!super::password::verify_password(
            "any-password",
            state.decoy_hash()
        ));
        Ok(())
    }
}
