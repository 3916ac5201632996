//! Password accounts.
//!
//! - POST `/register` - Create an account with an Argon2id password hash
//! - POST `/login` - Verify the password and issue a session

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use std::sync::LazyLock;
use tracing::{debug, error, info};

use super::error::{ApiError, ResultExt};
use super::session::issue_session;
use super::{AuthState, UserResponse};
use crate::db::NewUser;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 20;
const EMAIL_MAX: usize = 254;
const PASSWORD_MIN: usize = 8;

/// Hash a password with Argon2id. Returns a PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)?;
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Check a password against a stored hash. Anything that is not a PHC
/// string, including the OAuth-only sentinel, never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Hash checked when there is no usable password hash, so a login for an
/// unknown email or an OAuth-only account costs the same Argon2 run as a
/// real one. The hashed password is random and never known.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| {
    let mut password = [0u8; 32];
    rand::rng().fill_bytes(&mut password);
    hash_password(&URL_SAFE_NO_PAD.encode(password))
        .inspect_err(|e| error!("Failed to build dummy password hash: {}", e))
        .ok()
});

fn is_valid_username(username: &str) -> bool {
    (USERNAME_MIN..=USERNAME_MAX).contains(&username.len())
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn is_valid_email(email: &str) -> bool {
    if email.len() > EMAIL_MAX || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Deserialize)]
pub(super) struct RegisterRequest {
    username: String,
    email: String,
    password: String,
    #[serde(default)]
    full_name: Option<String>,
}

pub(super) async fn register(
    State(state): State<AuthState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim();
    let email = normalize_email(&req.email);
    let full_name = req
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request(
            "Username, email, and password are required",
        ));
    }
    if !is_valid_username(username) {
        return Err(ApiError::bad_request(
            "Invalid username format (3-20 chars, alphanumeric, underscore, hyphen)",
        ));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email format"));
    }
    if req.password.chars().count() < PASSWORD_MIN {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters",
        ));
    }

    let users = state.db.users();
    if users
        .get_by_email(&email)
        .await
        .db_err("Failed to check email")?
        .is_some()
    {
        return Err(ApiError::conflict("User already exists"));
    }
    if users
        .get_by_username(username)
        .await
        .db_err("Failed to check username")?
        .is_some()
    {
        return Err(ApiError::conflict("Username already taken"));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| {
            error!("Password hashing task failed: {}", e);
            ApiError::internal("Failed to register user")
        })?
        .map_err(|e| {
            error!("Failed to hash password: {}", e);
            ApiError::internal("Failed to register user")
        })?;

    let user = users
        .create(NewUser {
            username,
            email: &email,
            password_hash: &password_hash,
            full_name,
            avatar_url: None,
        })
        .await
        .map_err(|e| {
            // Lost a race with another registration for the same name or email.
            if e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                ApiError::conflict("User already exists")
            } else {
                ApiError::db_error("Failed to create user", e)
            }
        })?;

    info!(user_id = %user.id, "Registered password account");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "user": UserResponse::from(&user),
        })),
    ))
}

#[derive(Deserialize)]
pub(super) struct LoginRequest {
    email: String,
    password: String,
}

pub(super) async fn login(
    State(state): State<AuthState>,
    headers: HeaderMap,
    uri: Uri,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email format"));
    }

    let user = state
        .db
        .users()
        .get_by_email(&email)
        .await
        .db_err("Failed to get user")?
        .filter(|user| !user.is_oauth_only());

    let password = req.password;
    let hash = match &user {
        Some(user) => user.password_hash.clone(),
        None => DUMMY_HASH.clone().unwrap_or_default(),
    };
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| {
            error!("Password verification task failed: {}", e);
            ApiError::internal("Failed to login")
        })?;

    let user = match user {
        Some(user) if verified => user,
        Some(user) => {
            debug!(user_id = %user.id, "Password mismatch");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        None => {
            debug!("Login for unknown email or OAuth-only account");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    let [access, refresh] = issue_session(&state, &user, state.secure(&headers, &uri)).await?;
    info!(user_id = %user.id, "Password login succeeded");

    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]),
        Json(json!({
            "message": "Login successful",
            "user": UserResponse::from(&user),
        })),
    ))
}
