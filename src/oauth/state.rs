//! Signed anti-CSRF state carried in the `oauth_state` cookie.
//!
//! The cookie holds `nonce.signature` where the signature is
//! HMAC-SHA256(cookie secret, nonce), base64url without padding. The provider
//! only ever sees the bare nonce.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use super::errors::OAuthError;
use crate::config::AuthConfig;

type HmacSha256 = Hmac<Sha256>;

/// Random bytes per nonce.
const NONCE_BYTES: usize = 32;

#[derive(Clone)]
pub struct StateSigner {
    mac: HmacSha256,
}

impl StateSigner {
    pub fn new(config: &AuthConfig) -> Self {
        Self::from_secret(config.cookie_secret())
    }

    fn from_secret(secret: &[u8]) -> Self {
        Self {
            mac: HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length"),
        }
    }

    /// Generate a fresh random nonce.
    pub fn generate_nonce() -> String {
        let mut bytes = [0u8; NONCE_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn signature(&self, nonce: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(nonce.as_bytes());
        mac
    }

    /// Produce the cookie value for a nonce.
    pub fn sign(&self, nonce: &str) -> String {
        let tag = self.signature(nonce).finalize().into_bytes();
        format!("{}.{}", nonce, URL_SAFE_NO_PAD.encode(tag))
    }

    /// Check a signed cookie value against the `state` returned by the provider.
    /// The signature comparison is constant time.
    pub fn verify(&self, query_state: &str, signed_state: &str) -> Result<(), OAuthError> {
        let (nonce, signature) = signed_state
            .split_once('.')
            .ok_or(OAuthError::StateMismatch)?;

        if nonce != query_state {
            return Err(OAuthError::StateMismatch);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| OAuthError::StateMismatch)?;

        self.signature(nonce)
            .verify_slice(&signature)
            .map_err(|_| OAuthError::StateMismatch)
    }
}
