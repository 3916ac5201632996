use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

use crate::clock::Clock;

/// Password hash stored for accounts created through OAuth. It is not a
/// valid PHC string, so password verification always fails against it.
pub const OAUTH_PASSWORD_SENTINEL: &str = "!oauth";

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

/// User role for authorization. Gates test set membership, not rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Owner => "owner",
        }
    }

    /// Unknown values fall back to the least privileged role.
    pub fn from_str(s: &str) -> Self {
        match s {
            "owner" => Role::Owner,
            "moderator" => Role::Moderator,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub created_at: i64,
}

impl LocalUser {
    /// Whether the account can only sign in through an OAuth provider.
    pub fn is_oauth_only(&self) -> bool {
        self.password_hash == OAUTH_PASSWORD_SENTINEL
    }
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    password_hash: String,
    full_name: Option<String>,
    avatar_url: Option<String>,
    role: String,
    created_at: i64,
}

impl From<UserRow> for LocalUser {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            full_name: row.full_name,
            avatar_url: row.avatar_url,
            role: Role::from_str(&row.role),
            created_at: row.created_at,
        }
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, full_name, avatar_url, role, created_at";

impl UserStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Create a user with the `user` role and return the stored record.
    pub async fn create(&self, new: NewUser<'_>) -> Result<LocalUser, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = self.clock.now();

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, full_name, avatar_url, role, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'user', ?)",
        )
        .bind(&id)
        .bind(new.username)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.full_name)
        .bind(new.avatar_url)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(LocalUser {
            id,
            username: new.username.to_string(),
            email: new.email.to_string(),
            password_hash: new.password_hash.to_string(),
            full_name: new.full_name.map(str::to_string),
            avatar_url: new.avatar_url.map(str::to_string),
            role: Role::User,
            created_at,
        })
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<LocalUser>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(LocalUser::from))
    }

    /// Get a user by email, ignoring case.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<LocalUser>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(LocalUser::from))
    }

    /// Get a user by username, ignoring case.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<LocalUser>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(LocalUser::from))
    }

    /// Set the role for a user.
    pub async fn set_role(&self, id: &str, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count users (used by tests and the startup log).
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
