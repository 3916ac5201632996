//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with different secrets so one can
//! never be replayed as the other. Validation checks the declared algorithm
//! before anything else, then the signature, then the `[nbf, exp]` window
//! against the injected [`Clock`].

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::db::Role;

/// Algorithms a token header may declare. Anything else is rejected outright.
const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Random token ID
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject (user ID)
    pub sub: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    pub token: String,
    pub jti: String,
    pub expires_at: i64,
    /// Token lifetime in seconds
    pub duration: u64,
}

/// Result of generating a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    pub token: String,
    pub jti: String,
    pub issued_at: i64,
    pub expires_at: i64,
    /// Token lifetime in seconds
    pub duration: u64,
}

/// Mints and validates access and refresh tokens. Stateless.
#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: u64,
    refresh_ttl: u64,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let access_key = config.access_signing_key();
        let refresh_key = config.refresh_signing_key();
        Self {
            access_encoding: EncodingKey::from_secret(&access_key),
            access_decoding: DecodingKey::from_secret(&access_key),
            refresh_encoding: EncodingKey::from_secret(&refresh_key),
            refresh_decoding: DecodingKey::from_secret(&refresh_key),
            access_ttl: config.access_ttl().as_secs(),
            refresh_ttl: config.refresh_ttl().as_secs(),
            clock,
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Generate an access token carrying the user's identity and role.
    pub fn issue_access_token(
        &self,
        user_id: &str,
        email: &str,
        role: Role,
    ) -> Result<AccessTokenResult, IssueError> {
        let now = self.clock.now();
        let jti = uuid::Uuid::new_v4().to_string();
        let exp = expiry(now, self.access_ttl)?;

        let claims = AccessClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            token_type: TokenType::Access,
            jti: jti.clone(),
            iat: now,
            nbf: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access_encoding)
            .map_err(IssueError::Encode)?;

        Ok(AccessTokenResult {
            token,
            jti,
            expires_at: exp,
            duration: self.access_ttl,
        })
    }

    /// Generate a refresh token. The caller persists it in the refresh store.
    pub fn issue_refresh_token(&self, user_id: &str) -> Result<RefreshTokenResult, IssueError> {
        let now = self.clock.now();
        let jti = uuid::Uuid::new_v4().to_string();
        let exp = expiry(now, self.refresh_ttl)?;

        let claims = RefreshClaims {
            sub: user_id.to_string(),
            token_type: TokenType::Refresh,
            jti: jti.clone(),
            iat: now,
            nbf: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.refresh_encoding)
            .map_err(IssueError::Encode)?;

        Ok(RefreshTokenResult {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
            duration: self.refresh_ttl,
        })
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims: AccessClaims = decode(token, &self.access_decoding)?;
        if claims.token_type != TokenType::Access {
            return Err(AuthError::Malformed);
        }
        self.check_window(claims.nbf, claims.exp)?;
        Ok(claims)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let claims: RefreshClaims = decode(token, &self.refresh_decoding)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::Malformed);
        }
        self.check_window(claims.nbf, claims.exp)?;
        Ok(claims)
    }

    /// `now` must fall inside `[nbf, exp]`.
    fn check_window(&self, nbf: i64, exp: i64) -> Result<(), AuthError> {
        let now = self.clock.now();
        if now < nbf || now > exp {
            return Err(AuthError::Expired);
        }
        Ok(())
    }
}

fn expiry(now: i64, ttl: u64) -> Result<i64, IssueError> {
    i64::try_from(ttl)
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .ok_or(IssueError::ExpiryOutOfRange)
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Read the `alg` field straight from the header segment. A header declaring
/// a non-HMAC algorithm (including `none`) is rejected here, before any
/// signature work is attempted.
fn check_declared_algorithm(token: &str) -> Result<(), AuthError> {
    let segment = token
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::Malformed)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| AuthError::Malformed)?;
    let header: RawHeader = serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)?;

    let allowed = header
        .alg
        .parse::<Algorithm>()
        .is_ok_and(|alg| HMAC_ALGORITHMS.contains(&alg));
    if !allowed {
        return Err(AuthError::AlgorithmMismatch);
    }
    Ok(())
}

fn decode<T: serde::de::DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<T, AuthError> {
    check_declared_algorithm(token)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = HMAC_ALGORITHMS.to_vec();
    // The time window is checked against the injected clock instead.
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.leeway = 0;

    let data = jsonwebtoken::decode::<T>(token, key, &validation).map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            AuthError::AlgorithmMismatch
        }
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => AuthError::Expired,
        _ => AuthError::Malformed,
    })?;

    Ok(data.claims)
}

/// Why a token was rejected. Distinguishable internally for logging; the
/// gate collapses all of these into one outward 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidSignature,
    AlgorithmMismatch,
    /// Outside the `[nbf, exp]` window.
    Expired,
    Malformed,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "missing token"),
            AuthError::InvalidSignature => write!(f, "invalid signature"),
            AuthError::AlgorithmMismatch => write!(f, "unexpected signing algorithm"),
            AuthError::Expired => write!(f, "token outside validity window"),
            AuthError::Malformed => write!(f, "malformed token"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Error minting a token.
#[derive(Debug)]
pub enum IssueError {
    Encode(jsonwebtoken::errors::Error),
    /// `now + ttl` does not fit in a timestamp.
    ExpiryOutOfRange,
}

impl std::fmt::Display for IssueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueError::Encode(e) => write!(f, "Failed to encode token: {}", e),
            IssueError::ExpiryOutOfRange => write!(f, "Token expiry out of range"),
        }
    }
}

impl std::error::Error for IssueError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    const ACCESS: &[u8] = b"access-secret-access-secret-0123";
    const REFRESH: &[u8] = b"refresh-secret-refresh-secret-01";
    const COOKIE: &[u8] = b"cookie-secret-cookie-secret-0123";

    fn issuer_with_clock(clock: Arc<ManualClock>) -> TokenIssuer {
        let config = AuthConfig::new(ACCESS, REFRESH, COOKIE).unwrap();
        TokenIssuer::new(&config, clock)
    }

    fn issuer() -> TokenIssuer {
        issuer_with_clock(Arc::new(ManualClock::starting_now()))
    }

    fn encode_raw(header_json: &str, claims_json: &str, signature: &str) -> String {
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json),
            signature
        )
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let issuer = issuer();

        let result = issuer
            .issue_access_token("user-123", "alice@example.com", Role::Moderator)
            .unwrap();
        assert_eq!(result.duration, 15 * 60);

        let claims = issuer.validate_access_token(&result.token).unwrap();
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.role, Role::Moderator);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.jti, result.jti);
        assert_eq!(claims.iat, claims.nbf);
        assert_eq!(claims.exp, result.expires_at);
    }

    #[test]
    fn test_generate_and_validate_refresh_token() {
        let issuer = issuer();

        let result = issuer.issue_refresh_token("user-123").unwrap();
        assert_eq!(result.duration, 7 * 24 * 60 * 60);

        let claims = issuer.validate_refresh_token(&result.token).unwrap();
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.jti, result.jti);
        assert_eq!(claims.exp, result.expires_at);
    }

    #[test]
    fn test_tokens_not_interchangeable() {
        let issuer = issuer();

        let access = issuer
            .issue_access_token("user-123", "a@b.c", Role::User)
            .unwrap();
        let refresh = issuer.issue_refresh_token("user-123").unwrap();

        assert_eq!(
            issuer.validate_refresh_token(&access.token).unwrap_err(),
            AuthError::InvalidSignature
        );
        assert_eq!(
            issuer.validate_access_token(&refresh.token).unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[test]
    fn test_wrong_secret() {
        let clock = Arc::new(ManualClock::starting_now());
        let issuer1 = issuer_with_clock(clock.clone());
        let other = AuthConfig::new(
            b"another-access-secret-0123456789".to_vec(),
            b"another-refresh-secret-012345678".to_vec(),
            COOKIE,
        )
        .unwrap();
        let issuer2 = TokenIssuer::new(&other, clock);

        let result = issuer1
            .issue_access_token("user-123", "a@b.c", Role::User)
            .unwrap();

        assert_eq!(
            issuer2.validate_access_token(&result.token).unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[test]
    fn test_zero_padded_secret_rejected() {
        let clock = Arc::new(ManualClock::starting_now());
        let base = b"access-secret-with-trailing-zero-byte".to_vec();
        let mut padded = base.clone();
        padded.push(0);

        let signer = TokenIssuer::new(
            &AuthConfig::new(base, REFRESH, COOKIE).unwrap(),
            clock.clone(),
        );
        let verifier = TokenIssuer::new(&AuthConfig::new(padded, REFRESH, COOKIE).unwrap(), clock);

        let token = signer
            .issue_access_token("user-123", "a@b.c", Role::User)
            .unwrap()
            .token;
        assert_eq!(
            verifier.validate_access_token(&token).unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[test]
    fn test_refresh_secret_padded_from_access_secret_is_distinct() {
        let mut padded = ACCESS.to_vec();
        padded.push(0);
        let config = AuthConfig::new(ACCESS, padded, COOKIE).unwrap();
        let issuer = TokenIssuer::new(&config, Arc::new(ManualClock::starting_now()));

        let access = issuer
            .issue_access_token("user-123", "a@b.c", Role::User)
            .unwrap();
        assert_eq!(
            issuer.validate_refresh_token(&access.token).unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[test]
    fn test_expiry_overflow_is_an_error() {
        let clock = Arc::new(ManualClock::new(i64::MAX - 10));
        let issuer = issuer_with_clock(clock);

        assert!(matches!(
            issuer.issue_access_token("user-123", "a@b.c", Role::User),
            Err(IssueError::ExpiryOutOfRange)
        ));
        assert!(matches!(
            issuer.issue_refresh_token("user-123"),
            Err(IssueError::ExpiryOutOfRange)
        ));
        assert_eq!(expiry(0, u64::MAX).unwrap_err().to_string(), "Token expiry out of range");
    }

    #[test]
    fn test_expiry_window_with_fifteen_minute_ttl() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let config = AuthConfig::new(ACCESS, REFRESH, COOKIE)
            .unwrap()
            .with_access_ttl(Duration::from_secs(15 * 60))
            .unwrap();
        let issuer = TokenIssuer::new(&config, clock.clone());

        let token = issuer
            .issue_access_token("user-123", "a@b.c", Role::User)
            .unwrap()
            .token;

        clock.advance(14 * 60);
        assert!(issuer.validate_access_token(&token).is_ok());

        clock.advance(2 * 60);
        assert_eq!(
            issuer.validate_access_token(&token).unwrap_err(),
            AuthError::Expired
        );
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let issuer = issuer_with_clock(clock.clone());

        let result = issuer
            .issue_access_token("user-123", "a@b.c", Role::User)
            .unwrap();

        clock.set(result.expires_at);
        assert!(issuer.validate_access_token(&result.token).is_ok());

        clock.set(result.expires_at + 1);
        assert_eq!(
            issuer.validate_access_token(&result.token).unwrap_err(),
            AuthError::Expired
        );
    }

    #[test]
    fn test_not_yet_valid_token_rejected() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let issuer = issuer_with_clock(clock.clone());

        let token = issuer.issue_refresh_token("user-123").unwrap().token;

        clock.advance(-10);
        assert_eq!(
            issuer.validate_refresh_token(&token).unwrap_err(),
            AuthError::Expired
        );
    }

    #[test]
    fn test_none_algorithm_rejected() {
        let issuer = issuer();
        let now = issuer.now();
        let claims = format!(
            r#"{{"sub":"user-1","email":"a@b.c","role":"owner","typ":"access","jti":"x","iat":{now},"nbf":{now},"exp":{}}}"#,
            now + 60
        );

        let token = encode_raw(r#"{"alg":"none","typ":"JWT"}"#, &claims, "");
        assert_eq!(
            issuer.validate_access_token(&token).unwrap_err(),
            AuthError::AlgorithmMismatch
        );
    }

    #[test]
    fn test_asymmetric_algorithm_rejected_even_with_valid_hmac() {
        let issuer = issuer();

        // Take a genuine token and swap the header for one claiming RS256.
        let genuine = issuer
            .issue_access_token("user-123", "a@b.c", Role::User)
            .unwrap()
            .token;
        let mut parts = genuine.splitn(3, '.');
        let _header = parts.next().unwrap();
        let payload = parts.next().unwrap();
        let signature = parts.next().unwrap();
        let forged = format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
            payload,
            signature
        );

        assert_eq!(
            issuer.validate_access_token(&forged).unwrap_err(),
            AuthError::AlgorithmMismatch
        );
    }

    #[test]
    fn test_other_hmac_algorithms_accepted() {
        let clock = Arc::new(ManualClock::starting_now());
        let issuer = issuer_with_clock(clock.clone());
        let now = clock.now();

        let claims = AccessClaims {
            sub: "user-123".to_string(),
            email: "a@b.c".to_string(),
            role: Role::Owner,
            token_type: TokenType::Access,
            jti: "jti".to_string(),
            iat: now,
            nbf: now,
            exp: now + 60,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(ACCESS),
        )
        .unwrap();

        let decoded = issuer.validate_access_token(&token).unwrap();
        assert_eq!(decoded.role, Role::Owner);
    }

    #[test]
    fn test_invalid_token() {
        let issuer = issuer();

        assert_eq!(
            issuer.validate_access_token("invalid-token").unwrap_err(),
            AuthError::Malformed
        );
        assert_eq!(
            issuer.validate_access_token("").unwrap_err(),
            AuthError::Malformed
        );
        assert_eq!(
            issuer.validate_access_token("a.b.c").unwrap_err(),
            AuthError::Malformed
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let issuer = issuer();
        let token = issuer
            .issue_access_token("user-123", "a@b.c", Role::User)
            .unwrap()
            .token;

        let mut parts: Vec<&str> = token.split('.').collect();
        let now = issuer.now();
        let elevated = URL_SAFE_NO_PAD.encode(format!(
            r#"{{"sub":"user-123","email":"a@b.c","role":"owner","typ":"access","jti":"x","iat":{now},"nbf":{now},"exp":{}}}"#,
            now + 60
        ));
        parts[1] = &elevated;

        assert_eq!(
            issuer.validate_access_token(&parts.join(".")).unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[test]
    fn test_unique_jti_per_token() {
        let issuer = issuer();

        let a = issuer.issue_refresh_token("user-123").unwrap();
        let b = issuer.issue_refresh_token("user-123").unwrap();
        assert_ne!(a.jti, b.jti);
        assert_ne!(a.token, b.token);

        let c = issuer
            .issue_access_token("user-123", "a@b.c", Role::User)
            .unwrap();
        let d = issuer
            .issue_access_token("user-123", "a@b.c", Role::User)
            .unwrap();
        assert_ne!(c.jti, d.jti);
    }
}
