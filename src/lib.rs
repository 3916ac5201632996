pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod jwt;
pub mod oauth;
pub mod rate_limit;

use api::{AuthState, create_auth_router};
use axum::Router;
use clock::Clock;
use config::AuthConfig;
use db::Database;
use jwt::TokenIssuer;
use oauth::OAuthFlow;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Signing secrets and token lifetimes
    pub auth: AuthConfig,
    /// Time source for token issuance and validation
    pub clock: Arc<dyn Clock>,
    /// Registered OAuth providers
    pub flow: OAuthFlow,
    /// Whether to always set the Secure flag on cookies
    pub secure_cookies: bool,
    /// Per-IP limits for login, registration, and OAuth routes
    pub rate_limits: RateLimitConfig,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let issuer = Arc::new(TokenIssuer::new(&config.auth, config.clock.clone()));

    let state = AuthState {
        db: config.db.clone(),
        issuer,
        flow: Arc::new(config.flow.clone()),
        secure_cookies: config.secure_cookies,
    };

    Router::new().nest(
        "/auth",
        create_auth_router(state, Arc::new(config.rate_limits.clone())),
    )
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) -> tokio::task::JoinHandle<()> {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone())
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
