//! Google OAuth 2.0 integration.

use async_trait::async_trait;
use serde::Deserialize;

use super::errors::OAuthError;
use super::provider::{
    OAuthClientConfig, OAuthProvider, ProviderEndpoints, ProviderProfile, authorization_url,
    fetch_profile, http_client, non_empty, request_access_token,
};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const PROFILE_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const SCOPES: &str = "https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile";

pub struct GoogleProvider {
    client: OAuthClientConfig,
    endpoints: ProviderEndpoints,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct GoogleUser {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleProvider {
    pub fn new(client: OAuthClientConfig) -> Self {
        Self::with_endpoints(client, Self::default_endpoints())
    }

    pub fn with_endpoints(client: OAuthClientConfig, endpoints: ProviderEndpoints) -> Self {
        Self {
            client,
            endpoints,
            http: http_client(),
        }
    }

    pub fn default_endpoints() -> ProviderEndpoints {
        ProviderEndpoints {
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            profile_url: PROFILE_URL.to_string(),
        }
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn display_name(&self) -> &str {
        "Google"
    }

    fn auth_url(&self, state: &str) -> String {
        authorization_url(
            &self.endpoints.authorize_url,
            &[
                ("client_id", self.client.client_id.as_str()),
                ("redirect_uri", self.client.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
                ("access_type", "offline"),
            ],
        )
    }

    async fn exchange(&self, code: &str) -> Result<ProviderProfile, OAuthError> {
        let access_token = request_access_token(
            &self.http,
            self.name(),
            &self.endpoints.token_url,
            &[
                ("client_id", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.client.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ],
        )
        .await?;

        let user: GoogleUser = fetch_profile(
            &self.http,
            self.name(),
            &self.endpoints.profile_url,
            &access_token,
        )
        .await?;

        // Google has no handle; the username comes from the email instead.
        Ok(ProviderProfile {
            external_id: user.id,
            email: non_empty(user.email),
            display_name: non_empty(user.name),
            login: None,
            avatar_url: non_empty(user.picture),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_url_requests_offline_access() {
        let provider = GoogleProvider::new(OAuthClientConfig {
            client_id: "g-client".into(),
            client_secret: "g-secret".into(),
            redirect_url: "http://localhost:8080/auth/google/callback".into(),
        });

        let url = url::Url::parse(&provider.auth_url("nonce-2")).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("state".into(), "nonce-2".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
    }
}
