//! Postgres-backed identity and session stores.
//!
//! Rotation relies on the database for atomicity: the claim `UPDATE` only
//! matches active rows, so of two concurrent rotations for the same token
//! hash the row lock lets exactly one through and the other observes the
//! token as already revoked.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::store::{Identity, IdentityStore, RefreshRecord, Role, RotateOutcome, SessionStore};

#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn identity_from_row(row: &sqlx::postgres::PgRow) -> Result<Identity> {
    let role_text: String = row.get("role");
    let role = Role::parse(&role_text)
        .with_context(|| format!("unknown role stored for user: {role_text}"))?;
    Ok(Identity {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
    })
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let query = r"
            SELECT id, email, password_hash, role, created_at, last_login
            FROM users
            WHERE email = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup identity by email")?;

        row.as_ref().map(identity_from_row).transpose()
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<Identity>> {
        let query = r"
            SELECT id, email, password_hash, role, created_at, last_login
            FROM users
            WHERE id = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup identity by id")?;

        row.as_ref().map(identity_from_row).transpose()
    }

    async fn record_login(&self, user_id: Uuid) -> Result<()> {
        let query = "UPDATE users SET last_login = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow, user_id: Uuid) -> RefreshRecord {
    RefreshRecord {
        id: row.get("id"),
        user_id,
        issued_at: row.get("issued_at"),
        expires_at: row.get("expires_at"),
        revoked: false,
        replaced_by: None,
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &[u8],
        ttl_seconds: i64,
    ) -> Result<RefreshRecord> {
        let query = r"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
            RETURNING id, issued_at, expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert refresh token")?;

        Ok(record_from_row(&row, user_id))
    }

    async fn rotate(
        &self,
        token_hash: &[u8],
        successor_hash: &[u8],
        ttl_seconds: i64,
    ) -> Result<RotateOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin rotation transaction")?;

        // Claim only matches active rows; the losing concurrent caller blocks
        // on the row lock and then sees zero rows.
        let query = r"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE token_hash = $1
              AND revoked = FALSE
              AND expires_at > NOW()
            RETURNING id, user_id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let claimed = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to claim refresh token")?;

        let Some(claimed) = claimed else {
            let query = r"
                SELECT user_id, revoked, expires_at
                FROM refresh_tokens
                WHERE token_hash = $1
                LIMIT 1
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(token_hash)
                .fetch_optional(&mut *tx)
                .instrument(span)
                .await
                .context("failed to probe refresh token")?;
            tx.commit().await.context("commit rotation probe")?;

            let Some(row) = row else {
                return Ok(RotateOutcome::Missing);
            };
            let expires_at: DateTime<Utc> = row.get("expires_at");
            let revoked: bool = row.get("revoked");
            if expires_at <= Utc::now() {
                return Ok(RotateOutcome::Missing);
            }
            if revoked {
                return Ok(RotateOutcome::Reused {
                    user_id: row.get("user_id"),
                });
            }
            return Ok(RotateOutcome::Missing);
        };

        let consumed_id: Uuid = claimed.get("id");
        let user_id: Uuid = claimed.get("user_id");

        let query = r"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
            RETURNING id, issued_at, expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let successor = sqlx::query(query)
            .bind(user_id)
            .bind(successor_hash)
            .bind(ttl_seconds)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert successor refresh token")?;

        let query = "UPDATE refresh_tokens SET replaced_by = $1 WHERE id = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let successor_id: Uuid = successor.get("id");
        sqlx::query(query)
            .bind(successor_id)
            .bind(consumed_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to link successor refresh token")?;

        tx.commit().await.context("commit rotation")?;

        Ok(RotateOutcome::Rotated {
            record: record_from_row(&successor, user_id),
        })
    }

    async fn revoke(&self, token_hash: &[u8]) -> Result<()> {
        // Logout is idempotent; it's fine if no rows match.
        let query = "UPDATE refresh_tokens SET revoked = TRUE WHERE token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh token")?;
        Ok(())
    }

    async fn revoke_all_for_subject(&self, user_id: Uuid) -> Result<u64> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE user_id = $1
              AND revoked = FALSE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke subject refresh tokens")?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let query = "DELETE FROM refresh_tokens WHERE expires_at <= NOW()";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to purge expired refresh tokens")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::{PgIdentityStore, PgSessionStore};
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn stores_construct_from_lazy_pool() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let _identities = PgIdentityStore::new(pool.clone());
        let _sessions = PgSessionStore::new(pool);
        Ok(())
    }
}
