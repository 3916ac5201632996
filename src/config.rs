//! Immutable authentication configuration.
//!
//! Built once at startup and handed to the constructors that need it
//! ([`TokenIssuer`](crate::jwt::TokenIssuer),
//! [`StateSigner`](crate::oauth::StateSigner), the refresh-token store).

use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Minimum length in bytes for every signing secret.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Default access-token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh-token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Longest lifetime accepted for either token: 10 years.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Default deadline for a single refresh-store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct AuthConfig {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    cookie_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    pub store_timeout: Duration,
}

impl AuthConfig {
    /// Validate the secrets and build a configuration with default lifetimes.
    pub fn new(
        access_secret: impl Into<Vec<u8>>,
        refresh_secret: impl Into<Vec<u8>>,
        cookie_secret: impl Into<Vec<u8>>,
    ) -> Result<Self, ConfigError> {
        let access_secret = access_secret.into();
        let refresh_secret = refresh_secret.into();
        let cookie_secret = cookie_secret.into();

        check_length("access", &access_secret)?;
        check_length("refresh", &refresh_secret)?;
        check_length("cookie", &cookie_secret)?;

        if signing_key(&access_secret) == signing_key(&refresh_secret) {
            return Err(ConfigError::SharedTokenSecret);
        }

        Ok(Self {
            access_secret,
            refresh_secret,
            cookie_secret,
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        })
    }

    /// Set the access-token lifetime. Must be at least one second and at
    /// most [`MAX_TOKEN_TTL`].
    pub fn with_access_ttl(mut self, ttl: Duration) -> Result<Self, ConfigError> {
        self.access_ttl = check_ttl("access", ttl)?;
        Ok(self)
    }

    /// Set the refresh-token lifetime. Same bounds as the access lifetime.
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Result<Self, ConfigError> {
        self.refresh_ttl = check_ttl("refresh", ttl)?;
        Ok(self)
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn access_secret(&self) -> &[u8] {
        &self.access_secret
    }

    pub fn refresh_secret(&self) -> &[u8] {
        &self.refresh_secret
    }

    pub fn cookie_secret(&self) -> &[u8] {
        &self.cookie_secret
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// HS256 key for access tokens, derived from the access secret.
    pub fn access_signing_key(&self) -> [u8; 32] {
        signing_key(&self.access_secret)
    }

    /// HS256 key for refresh tokens, derived from the refresh secret.
    pub fn refresh_signing_key(&self) -> [u8; 32] {
        signing_key(&self.refresh_secret)
    }
}

/// HMAC zero-pads short keys and hashes long ones, so distinct secrets such
/// as `s` and `s\0` would sign identically. Hashing first makes every
/// distinct secret a distinct key.
fn signing_key(secret: &[u8]) -> [u8; 32] {
    Sha256::digest(secret).into()
}

// Secrets stay out of debug output.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

fn check_length(name: &'static str, secret: &[u8]) -> Result<(), ConfigError> {
    if secret.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::SecretTooShort {
            name,
            minimum: MIN_SECRET_LENGTH,
        });
    }
    Ok(())
}

fn check_ttl(name: &'static str, ttl: Duration) -> Result<Duration, ConfigError> {
    if ttl.as_secs() == 0 || ttl > MAX_TOKEN_TTL {
        return Err(ConfigError::InvalidTtl {
            name,
            maximum: MAX_TOKEN_TTL.as_secs(),
        });
    }
    Ok(ttl)
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    SecretTooShort { name: &'static str, minimum: usize },
    SharedTokenSecret,
    InvalidTtl { name: &'static str, maximum: u64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::SecretTooShort { name, minimum } => {
                write!(f, "{name} secret is shorter than {minimum} bytes")
            }
            ConfigError::SharedTokenSecret => {
                write!(f, "access and refresh secrets must be different")
            }
            ConfigError::InvalidTtl { name, maximum } => {
                write!(f, "{name} token lifetime must be between 1 and {maximum} seconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
