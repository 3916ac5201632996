//! Refresh token storage for session tracking and revocation.
//!
//! Only refresh tokens are persisted. Access tokens are stateless and
//! expire on their own. A record is valid iff `revoked = 0 AND expires_at > now`;
//! every read applies that predicate inside the statement itself.

use sqlx::sqlite::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

/// A persisted refresh token.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: i64,
    pub created_at: i64,
    pub revoked: bool,
}

/// Refresh store failures. `Unavailable` is an infrastructure problem and
/// must never be read as "logged out".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    Revoked,
    Expired,
    Unavailable,
}

impl StoreError {
    /// Whether this is an auth decision rather than an infrastructure failure.
    pub fn is_auth_decision(&self) -> bool {
        !matches!(self, StoreError::Unavailable)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "refresh token not found"),
            StoreError::Revoked => write!(f, "refresh token revoked"),
            StoreError::Expired => write!(f, "refresh token expired"),
            StoreError::Unavailable => write!(f, "refresh token store unavailable"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Store for managing refresh tokens.
#[derive(Clone)]
pub struct RefreshTokenStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            pool,
            clock,
            timeout,
        }
    }

    /// Run one store round trip under the configured deadline.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(operation, error = %e, "Refresh store query failed");
                Err(StoreError::Unavailable)
            }
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Refresh store call timed out"
                );
                Err(StoreError::Unavailable)
            }
        }
    }

    /// Persist a newly issued refresh token.
    pub async fn store(
        &self,
        user_id: &str,
        token: &str,
        expires_at: i64,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let record = RefreshTokenRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token: token.to_string(),
            expires_at,
            created_at: self.clock.now(),
            revoked: false,
        };

        self.bounded(
            "store",
            sqlx::query(
                "INSERT INTO refresh_tokens (id, user_id, token, expires_at, created_at, revoked)
                 VALUES (?, ?, ?, ?, ?, 0)",
            )
            .bind(&record.id)
            .bind(&record.user_id)
            .bind(&record.token)
            .bind(record.expires_at)
            .bind(record.created_at)
            .execute(&self.pool),
        )
        .await?;

        Ok(record)
    }

    /// Look up a currently valid record. Revoked and expired rows are
    /// filtered out by the query, so both surface as `NotFound`.
    pub async fn get_by_token(&self, token: &str) -> Result<RefreshTokenRecord, StoreError> {
        let now = self.clock.now();
        let row: Option<RefreshTokenRecord> = self
            .bounded(
                "get_by_token",
                sqlx::query_as(
                    "SELECT id, user_id, token, expires_at, created_at, revoked
                     FROM refresh_tokens
                     WHERE token = ? AND revoked = 0 AND expires_at > ?",
                )
                .bind(token)
                .bind(now)
                .fetch_optional(&self.pool),
            )
            .await?;

        row.ok_or(StoreError::NotFound)
    }

    /// Explain why `get_by_token` missed. For logging only; never use the
    /// result to grant access.
    pub async fn diagnose(&self, token: &str) -> StoreError {
        let now = self.clock.now();
        let row: Result<Option<(bool, i64)>, StoreError> = self
            .bounded(
                "diagnose",
                sqlx::query_as("SELECT revoked, expires_at FROM refresh_tokens WHERE token = ?")
                    .bind(token)
                    .fetch_optional(&self.pool),
            )
            .await;

        match row {
            Ok(Some((true, _))) => StoreError::Revoked,
            Ok(Some((false, expires_at))) if expires_at <= now => StoreError::Expired,
            Ok(_) => StoreError::NotFound,
            Err(e) => e,
        }
    }

    /// Revoke a single token. Revoking an unknown or already revoked token
    /// is not an error.
    pub async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        self.bounded(
            "revoke",
            sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE token = ?")
                .bind(token)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    /// Revoke every valid token of a user (logout everywhere).
    pub async fn revoke_all_by_user_id(&self, user_id: &str) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self
            .bounded(
                "revoke_all_by_user_id",
                sqlx::query(
                    "UPDATE refresh_tokens SET revoked = 1
                     WHERE user_id = ? AND revoked = 0 AND expires_at > ?",
                )
                .bind(user_id)
                .bind(now)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every row that can never be valid again.
    pub async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let result = self
            .bounded(
                "cleanup_expired",
                sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ? OR revoked = 1")
                    .bind(now)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected())
    }

    /// Count valid tokens for a user.
    pub async fn count_by_user_id(&self, user_id: &str) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let count: (i64,) = self
            .bounded(
                "count_by_user_id",
                sqlx::query_as(
                    "SELECT COUNT(*) FROM refresh_tokens
                     WHERE user_id = ? AND revoked = 0 AND expires_at > ?",
                )
                .bind(user_id)
                .bind(now)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(count.0)
    }
}
