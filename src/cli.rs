//! CLI argument parsing, validation, and startup helpers.

use crate::auth::ClientIpHeader;
use crate::clock::Clock;
use crate::config::{AuthConfig, ConfigError, MIN_SECRET_LENGTH};
use crate::db::Database;
use crate::oauth::{GithubProvider, GoogleProvider, OAuthClientConfig, OAuthFlow};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pixauth",
    about = "JWT sessions, refresh tokens, and OAuth login over HTTP"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "pixauth.db")]
    pub database: String,

    /// Access token lifetime in seconds
    #[arg(long, env = "JWT_ACCESS_TTL_SECS", default_value = "900")]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "JWT_REFRESH_TTL_SECS", default_value = "604800")]
    pub refresh_ttl_secs: u64,

    /// Deadline for a single refresh-store call in milliseconds
    #[arg(long, default_value = "2000")]
    pub store_timeout_ms: u64,

    /// Always set the Secure flag on cookies
    #[arg(long)]
    pub secure_cookies: bool,

    /// Read the client IP from this proxy header for rate limiting
    #[arg(long, value_enum)]
    pub client_ip_header: Option<ClientIpHeader>,

    /// Path to file containing the access token secret. Prefer JWT_ACCESS_SECRET
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer JWT_REFRESH_SECRET
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Path to file containing the OAuth state secret. Prefer COOKIE_SECRET
    #[arg(long)]
    pub cookie_secret_file: Option<String>,

    #[arg(long, env = "GITHUB_CLIENT_ID")]
    pub github_client_id: Option<String>,

    #[arg(long, env = "GITHUB_CLIENT_SECRET", hide_env_values = true)]
    pub github_client_secret: Option<String>,

    #[arg(
        long,
        env = "GITHUB_REDIRECT_URL",
        default_value = "http://localhost:8080/auth/github/callback"
    )]
    pub github_redirect_url: String,

    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: Option<String>,

    #[arg(
        long,
        env = "GOOGLE_REDIRECT_URL",
        default_value = "http://localhost:8080/auth/google/callback"
    )]
    pub google_redirect_url: String,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!("{} is required. Set the environment variable or use the matching --*-secret-file", env_var);
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_var, MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load all three secrets and build the auth configuration.
/// Returns None and logs an error on any invalid input.
pub fn build_auth_config(args: &Args) -> Option<AuthConfig> {
    let access = load_secret("JWT_ACCESS_SECRET", args.access_secret_file.as_deref());
    let refresh = load_secret("JWT_REFRESH_SECRET", args.refresh_secret_file.as_deref());
    let cookie = load_secret("COOKIE_SECRET", args.cookie_secret_file.as_deref());
    let (access, refresh, cookie) = (access?, refresh?, cookie?);

    match AuthConfig::new(access, refresh, cookie).and_then(|c| apply_lifetimes(c, args)) {
        Ok(config) => Some(config),
        Err(e) => {
            error!(error = %e, "Invalid auth configuration");
            None
        }
    }
}

fn apply_lifetimes(config: AuthConfig, args: &Args) -> Result<AuthConfig, ConfigError> {
    Ok(config
        .with_access_ttl(Duration::from_secs(args.access_ttl_secs))?
        .with_refresh_ttl(Duration::from_secs(args.refresh_ttl_secs))?
        .with_store_timeout(args.store_timeout()))
}

fn client_config(
    name: &str,
    client_id: Option<&str>,
    client_secret: Option<&str>,
    redirect_url: &str,
) -> Result<Option<OAuthClientConfig>, ()> {
    let Some(client_id) = client_id.filter(|id| !id.is_empty()) else {
        info!(provider = name, "OAuth provider disabled (no client ID)");
        return Ok(None);
    };
    let Some(client_secret) = client_secret.filter(|s| !s.is_empty()) else {
        error!(provider = name, "OAuth client ID is set but the client secret is missing");
        return Err(());
    };
    if !redirect_url.starts_with("https://") {
        warn!(provider = name, redirect_url, "OAuth redirect URL is not HTTPS");
    }

    Ok(Some(OAuthClientConfig {
        client_id: client_id.to_string(),
        client_secret: client_secret.to_string(),
        redirect_url: redirect_url.to_string(),
    }))
}

/// Register every provider whose client ID is configured.
/// Returns None and logs an error on a half-configured provider.
pub fn build_flow(args: &Args, config: &AuthConfig) -> Option<OAuthFlow> {
    let mut flow = OAuthFlow::new(config);

    let github = client_config(
        "github",
        args.github_client_id.as_deref(),
        args.github_client_secret.as_deref(),
        &args.github_redirect_url,
    )
    .ok()?;
    if let Some(client) = github {
        flow = flow.with_provider(Arc::new(GithubProvider::new(client)));
    }

    let google = client_config(
        "google",
        args.google_client_id.as_deref(),
        args.google_client_secret.as_deref(),
        &args.google_redirect_url,
    )
    .ok()?;
    if let Some(client) = google {
        flow = flow.with_provider(Arc::new(GoogleProvider::new(client)));
    }

    Some(flow)
}

/// Open the database, logging errors if it fails.
pub async fn open_database(
    path: &str,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
) -> Option<Database> {
    match Database::open_with(path, clock, store_timeout).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
