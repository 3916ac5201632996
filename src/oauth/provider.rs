//! Identity provider capability shared by every OAuth integration.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::errors::OAuthError;

/// User agent sent to providers (GitHub rejects requests without one).
const USER_AGENT: &str = concat!("pixauth/", env!("CARGO_PKG_VERSION"));

/// Client registration for one provider.
#[derive(Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl std::fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("redirect_url", &self.redirect_url)
            .finish_non_exhaustive()
    }
}

/// Provider endpoints. Overridable so tests can point at a local server.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
}

/// Profile returned by a provider after a successful code exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderProfile {
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Provider handle, when the provider has one (GitHub login).
    pub login: Option<String>,
    pub avatar_url: Option<String>,
}

/// One external identity provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Route segment and lookup key, e.g. "github".
    fn name(&self) -> &str;

    /// Human-readable name used in responses.
    fn display_name(&self) -> &str;

    /// Consent screen URL carrying the unsigned nonce as `state`.
    fn auth_url(&self, state: &str) -> String;

    /// Exchange an authorization code for the user's profile.
    async fn exchange(&self, code: &str) -> Result<ProviderProfile, OAuthError>;
}

/// Build an authorization URL from a base and query pairs.
pub(super) fn authorization_url(base: &str, params: &[(&str, &str)]) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}")
}

pub(super) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Exchange a code at the token endpoint for a provider access token.
pub(super) async fn request_access_token(
    http: &reqwest::Client,
    provider: &str,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<String, OAuthError> {
    let response = http
        .post(token_url)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(form)
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(provider, error = %e, "Token request failed");
            OAuthError::ExchangeFailed
        })?;

    let status = response.status();
    let body: TokenResponse = response.json().await.map_err(|e| {
        tracing::warn!(provider, %status, error = %e, "Unreadable token response");
        OAuthError::ExchangeFailed
    })?;

    match body.access_token {
        Some(token) if status.is_success() && !token.is_empty() => Ok(token),
        _ => {
            tracing::warn!(
                provider,
                %status,
                provider_error = body.error.as_deref().unwrap_or("none"),
                "Token endpoint refused the code"
            );
            Err(OAuthError::ExchangeFailed)
        }
    }
}

/// Fetch the user profile with the provider access token.
pub(super) async fn fetch_profile<T: DeserializeOwned>(
    http: &reqwest::Client,
    provider: &str,
    profile_url: &str,
    access_token: &str,
) -> Result<T, OAuthError> {
    let response = http
        .get(profile_url)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| {
            tracing::warn!(provider, error = %e, "Profile request failed");
            OAuthError::ProfileFetchFailed
        })?;

    response.json().await.map_err(|e| {
        tracing::warn!(provider, error = %e, "Unreadable profile response");
        OAuthError::ProfileFetchFailed
    })
}

/// Treat empty strings from providers as absent.
pub(super) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
