mod refresh_token;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::DEFAULT_STORE_TIMEOUT;

pub use refresh_token::{RefreshTokenRecord, RefreshTokenStore, StoreError};
pub use user::{LocalUser, NewUser, OAUTH_PASSWORD_SENTINEL, Role, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl Database {
    /// Open or create a database at the given path using the system clock.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        Self::open_with(path, Arc::new(SystemClock), DEFAULT_STORE_TIMEOUT).await
    }

    /// Open a database with an explicit clock and per-call store deadline.
    pub async fn open_with(
        path: &str,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let options = SqlitePoolOptions::new().acquire_timeout(store_timeout);
        let pool = if path == ":memory:" {
            // Every connection to an in-memory url is its own database, so
            // keep exactly one alive for the lifetime of the pool.
            options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?
        } else {
            options
                .max_connections(5)
                .connect(&format!("sqlite:{}?mode=rwc", path))
                .await?
        };

        let db = Self {
            pool,
            clock,
            store_timeout,
        };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        if version < 2 {
            self.migrate_v2().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE users (
                    id TEXT PRIMARY KEY NOT NULL,
                    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    full_name TEXT,
                    avatar_url TEXT,
                    role TEXT NOT NULL DEFAULT 'user',
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_users_email ON users(email)",
                "CREATE INDEX idx_users_username ON users(username)",
            ],
        )
        .await
    }

    async fn migrate_v2(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            2,
            &[
                // Refresh tokens. Rows are only ever flipped to revoked or
                // deleted by cleanup; the token value itself never changes.
                "CREATE TABLE refresh_tokens (
                    id TEXT PRIMARY KEY NOT NULL,
                    user_id TEXT NOT NULL,
                    token TEXT UNIQUE NOT NULL,
                    expires_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    revoked INTEGER NOT NULL DEFAULT 0
                )",
                "CREATE INDEX idx_refresh_tokens_user_id ON refresh_tokens(user_id)",
                "CREATE INDEX idx_refresh_tokens_expires_at ON refresh_tokens(expires_at)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone(), self.clock.clone())
    }

    /// Get the refresh token store.
    pub fn refresh_tokens(&self) -> RefreshTokenStore {
        RefreshTokenStore::new(self.pool.clone(), self.clock.clone(), self.store_timeout)
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
