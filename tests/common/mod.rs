#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response},
};
use pixauth::{
    ServerConfig,
    clock::{Clock, ManualClock},
    config::AuthConfig,
    create_app,
    db::{Database, LocalUser, NewUser, Role},
    jwt::TokenIssuer,
    oauth::{OAuthError, OAuthFlow, OAuthProvider, ProviderProfile},
    rate_limit::RateLimitConfig,
};

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-test-access-secret";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-test-refresh-secret";
pub const COOKIE_SECRET: &[u8] = b"test-cookie-secret-test-cookie-secret";

/// Fixed starting time for every test clock.
pub const T0: i64 = 1_700_000_000;

pub const TEST_IP: [u8; 4] = [127, 0, 0, 1];

pub fn auth_config() -> AuthConfig {
    AuthConfig::new(ACCESS_SECRET, REFRESH_SECRET, COOKIE_SECRET).expect("valid test secrets")
}

/// Provider double: each authorization code maps to a fixed profile, any
/// other code fails the exchange.
pub struct FakeProvider {
    pub name: &'static str,
    pub display_name: &'static str,
    pub profiles: HashMap<String, ProviderProfile>,
}

impl FakeProvider {
    pub fn github() -> Self {
        Self {
            name: "github",
            display_name: "GitHub",
            profiles: HashMap::new(),
        }
    }

    pub fn with_profile(mut self, code: &str, profile: ProviderProfile) -> Self {
        self.profiles.insert(code.to_string(), profile);
        self
    }
}

#[async_trait]
impl OAuthProvider for FakeProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn display_name(&self) -> &str {
        self.display_name
    }

    fn auth_url(&self, state: &str) -> String {
        format!("https://provider.test/authorize?client_id=test&state={state}")
    }

    async fn exchange(&self, code: &str) -> Result<ProviderProfile, OAuthError> {
        self.profiles
            .get(code)
            .cloned()
            .ok_or(OAuthError::ExchangeFailed)
    }
}

pub fn octocat() -> ProviderProfile {
    ProviderProfile {
        external_id: "583231".into(),
        email: Some("octocat@example.com".into()),
        display_name: Some("The Octocat".into()),
        login: Some("octocat".into()),
        avatar_url: Some("https://avatars.test/583231".into()),
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub issuer: TokenIssuer,
}

/// Test app with a fake GitHub provider and permissive rate limits.
pub async fn create_test_app() -> TestApp {
    let provider = FakeProvider::github().with_profile("good-code", octocat());
    create_test_app_with(provider, RateLimitConfig::permissive(None)).await
}

pub async fn create_test_app_with(
    provider: FakeProvider,
    rate_limits: RateLimitConfig,
) -> TestApp {
    create_test_app_with_timeout(provider, rate_limits, Duration::from_secs(2)).await
}

pub async fn create_test_app_with_timeout(
    provider: FakeProvider,
    rate_limits: RateLimitConfig,
    store_timeout: Duration,
) -> TestApp {
    let clock = Arc::new(ManualClock::new(T0));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let auth = auth_config().with_store_timeout(store_timeout);

    let db = Database::open_with(":memory:", dyn_clock.clone(), store_timeout)
        .await
        .expect("Failed to open test database");

    let flow = OAuthFlow::new(&auth).with_provider(Arc::new(provider));
    let issuer = TokenIssuer::new(&auth, dyn_clock.clone());

    let config = ServerConfig {
        db: db.clone(),
        auth,
        clock: dyn_clock,
        flow,
        secure_cookies: false,
        rate_limits,
    };

    let app = create_app(&config);

    TestApp {
        app,
        db,
        clock,
        issuer,
    }
}

/// Insert a user directly and return it with the requested role.
pub async fn create_user(db: &Database, username: &str, email: &str, role: Role) -> LocalUser {
    let mut user = db
        .users()
        .create(NewUser {
            username,
            email,
            password_hash: "$argon2id$unused",
            full_name: None,
            avatar_url: None,
        })
        .await
        .expect("Failed to create user");
    if role != Role::User {
        db.users().set_role(&user.id, role).await.unwrap();
        user.role = role;
    }
    user
}

/// Issue a session for `user` the way login does, returning (access, refresh).
pub async fn login_tokens(t: &TestApp, user: &LocalUser) -> (String, String) {
    let access = t
        .issuer
        .issue_access_token(&user.id, &user.email, user.role)
        .unwrap();
    let refresh = t.issuer.issue_refresh_token(&user.id).unwrap();
    t.db.refresh_tokens()
        .store(&user.id, &refresh.token, refresh.expires_at)
        .await
        .unwrap();
    (access.token, refresh.token)
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", cookie_name)) && c.contains("Max-Age=0"))
}

/// Value of a cookie being set (not cleared) in the response.
pub fn cookie_value(cookies: &[String], cookie_name: &str) -> Option<String> {
    let prefix = format!("{}=", cookie_name);
    cookies
        .iter()
        .filter(|c| !c.contains("Max-Age=0"))
        .find_map(|c| c.strip_prefix(&prefix))
        .and_then(|rest| rest.split(';').next())
        .map(|v| v.to_string())
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Request builder carrying the peer address the server would record.
pub fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("GET")
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from((TEST_IP, 40000))))
}

pub fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .extension(ConnectInfo(SocketAddr::from((TEST_IP, 40000))))
}

pub fn json_body(value: serde_json::Value) -> Body {
    Body::from(value.to_string())
}
