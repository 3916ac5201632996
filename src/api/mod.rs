mod error;
mod oauth;
mod password;
mod session;

use axum::{
    Router,
    http::{HeaderMap, Uri},
    middleware,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{is_secure_request, require_auth};
use crate::db::{Database, LocalUser, Role};
use crate::impl_has_auth_backend;
use crate::jwt::TokenIssuer;
use crate::oauth::OAuthFlow;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_oauth, rate_limit_register};

pub use error::{ApiError, ResultExt};
pub use password::{hash_password, verify_password};

/// State shared by every `/auth` handler.
#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub issuer: Arc<TokenIssuer>,
    pub flow: Arc<OAuthFlow>,
    pub secure_cookies: bool,
}

impl_has_auth_backend!(AuthState);

impl AuthState {
    fn secure(&self, headers: &HeaderMap, uri: &Uri) -> bool {
        is_secure_request(headers, uri, self.secure_cookies)
    }
}

/// Public view of a user account. Never carries the password hash.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub role: Role,
}

impl From<&LocalUser> for UserResponse {
    fn from(user: &LocalUser) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            avatar_url: user.avatar_url.clone(),
            role: user.role,
        }
    }
}

/// Create the `/auth` router.
///
/// - GET `/{provider}` - Redirect to the provider's consent page
/// - GET `/{provider}/callback` - Finish an OAuth login
/// - POST `/register` - Create a password account
/// - POST `/login` - Password login
/// - POST `/refresh` - Exchange the refresh cookie for a new access token
/// - POST `/logout` - Revoke the current refresh token and clear cookies
/// - POST `/logout-all` - Revoke every refresh token of the caller
/// - GET `/profile` - The caller's account
pub fn create_auth_router(state: AuthState, rate_limits: Arc<RateLimitConfig>) -> Router {
    let oauth_routes = Router::new()
        .route("/{provider}", get(oauth::begin))
        .route("/{provider}/callback", get(oauth::callback))
        .layer(middleware::from_fn_with_state(
            rate_limits.clone(),
            rate_limit_oauth,
        ))
        .with_state(state.clone());

    let register_routes = Router::new()
        .route("/register", post(password::register))
        .layer(middleware::from_fn_with_state(
            rate_limits.clone(),
            rate_limit_register,
        ))
        .with_state(state.clone());

    let login_routes = Router::new()
        .route("/login", post(password::login))
        .layer(middleware::from_fn_with_state(rate_limits, rate_limit_login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/logout-all", post(session::logout_all))
        .route("/profile", get(session::profile))
        .route_layer(middleware::from_fn_with_state(
            state.issuer.clone(),
            require_auth,
        ))
        .with_state(state.clone());

    let session_routes = Router::new()
        .route("/refresh", post(session::refresh))
        .route("/logout", post(session::logout))
        .with_state(state);

    Router::new()
        .merge(oauth_routes)
        .merge(register_routes)
        .merge(login_routes)
        .merge(protected_routes)
        .merge(session_routes)
}
