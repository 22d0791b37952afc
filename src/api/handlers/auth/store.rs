//! Store seams for identities and refresh-token sessions.
//!
//! Handlers never touch storage directly; they go through the [`IdentityStore`]
//! and [`SessionStore`] traits so the server can run against Postgres while
//! tests construct isolated in-memory instances.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Educator,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Educator => "educator",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "educator" => Some(Self::Educator),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Subject identity as seen by this crate: credential hash and role are read,
/// `last_login` is written. Everything else belongs to the user service.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Server-side view of one refresh token. The raw secret is never stored;
/// records are keyed by its SHA-256 hash.
#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub replaced_by: Option<Uuid>,
}

impl RefreshRecord {
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

/// Outcome of attempting to consume a refresh token for rotation.
#[derive(Debug)]
pub enum RotateOutcome {
    /// The presented token was active; it is now revoked and linked to the
    /// returned successor record.
    Rotated { record: RefreshRecord },
    /// The presented token exists but was already consumed or revoked.
    /// Strong signal of credential theft.
    Reused { user_id: Uuid },
    /// Unknown or expired token.
    Missing,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>>;
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<Identity>>;
    async fn record_login(&self, user_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start a new rotation chain for the subject.
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &[u8],
        ttl_seconds: i64,
    ) -> Result<RefreshRecord>;

    /// Atomically consume the presented token and install its successor.
    ///
    /// Two concurrent calls with the same hash must never both observe the
    /// record as active; exactly one wins, the other gets [`RotateOutcome::Reused`].
    async fn rotate(
        &self,
        token_hash: &[u8],
        successor_hash: &[u8],
        ttl_seconds: i64,
    ) -> Result<RotateOutcome>;

    /// Revoke a single token. Idempotent; unknown hashes are a no-op.
    async fn revoke(&self, token_hash: &[u8]) -> Result<()>;

    /// Containment measure on replay: revoke every outstanding token for the
    /// subject. Returns the number of records revoked.
    async fn revoke_all_for_subject(&self, user_id: Uuid) -> Result<u64>;

    /// Drop expired records. Returns the number of records removed.
    async fn purge_expired(&self) -> Result<u64>;
}

/// In-memory identity store for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: Mutex<HashMap<Uuid, Identity>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, identity: Identity) {
        let mut identities = self.identities.lock().await;
        identities.insert(identity.id, identity);
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let identities = self.identities.lock().await;
        Ok(identities
            .values()
            .find(|identity| identity.email == email)
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<Identity>> {
        let identities = self.identities.lock().await;
        Ok(identities.get(&user_id).cloned())
    }

    async fn record_login(&self, user_id: Uuid) -> Result<()> {
        let mut identities = self.identities.lock().await;
        if let Some(identity) = identities.get_mut(&user_id) {
            identity.last_login = Some(Utc::now());
        }
        Ok(())
    }
}

/// In-memory session store. The single map lock makes rotation atomic: the
/// losing concurrent caller observes the winner's revocation.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<Vec<u8>, RefreshRecord>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &[u8],
        ttl_seconds: i64,
    ) -> Result<RefreshRecord> {
        let now = Utc::now();
        let record = RefreshRecord {
            id: Uuid::new_v4(),
            user_id,
            issued_at: now,
            expires_at: now + TimeDelta::seconds(ttl_seconds),
            revoked: false,
            replaced_by: None,
        };
        let mut records = self.records.lock().await;
        records.insert(token_hash.to_vec(), record.clone());
        Ok(record)
    }

    async fn rotate(
        &self,
        token_hash: &[u8],
        successor_hash: &[u8],
        ttl_seconds: i64,
    ) -> Result<RotateOutcome> {
        let now = Utc::now();
        let mut records = self.records.lock().await;

        let Some(current) = records.get(token_hash).cloned() else {
            return Ok(RotateOutcome::Missing);
        };
        if current.expires_at <= now {
            return Ok(RotateOutcome::Missing);
        }
        if current.revoked {
            return Ok(RotateOutcome::Reused {
                user_id: current.user_id,
            });
        }

        let successor = RefreshRecord {
            id: Uuid::new_v4(),
            user_id: current.user_id,
            issued_at: now,
            expires_at: now + TimeDelta::seconds(ttl_seconds),
            revoked: false,
            replaced_by: None,
        };
        if let Some(entry) = records.get_mut(token_hash) {
            entry.revoked = true;
            entry.replaced_by = Some(successor.id);
        }
        records.insert(successor_hash.to_vec(), successor.clone());

        Ok(RotateOutcome::Rotated { record: successor })
    }

    async fn revoke(&self, token_hash: &[u8]) -> Result<()> {
        let mut records = self.records.lock().await;
        if let Some(entry) = records.get_mut(token_hash) {
            entry.revoked = true;
        }
        Ok(())
    }

    async fn revoke_all_for_subject(&self, user_id: Uuid) -> Result<u64> {
        let mut records = self.records.lock().await;
        let mut revoked = 0;
        for entry in records.values_mut() {
            if entry.user_id == user_id && !entry.revoked {
                entry.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| record.expires_at > now);
        Ok((before - records.len()) as u64)
    }
}
