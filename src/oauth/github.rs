//! GitHub OAuth app integration.

use async_trait::async_trait;
use serde::Deserialize;

use super::errors::OAuthError;
use super::provider::{
    OAuthClientConfig, OAuthProvider, ProviderEndpoints, ProviderProfile, authorization_url,
    fetch_profile, http_client, non_empty, request_access_token,
};

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const PROFILE_URL: &str = "https://api.github.com/user";
const SCOPES: &str = "user:email read:user";

pub struct GithubProvider {
    client: OAuthClientConfig,
    endpoints: ProviderEndpoints,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

impl GithubProvider {
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
impl OAuthProvider for GithubProvider {
    fn name(&self) -> &str {
        "github"
    }

    fn display_name(&self) -> &str {
        "GitHub"
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
            ],
        )
        .await?;

        let user: GithubUser = fetch_profile(
            &self.http,
            self.name(),
            &self.endpoints.profile_url,
            &access_token,
        )
        .await?;

        Ok(ProviderProfile {
            external_id: user.id.to_string(),
            email: non_empty(user.email),
            display_name: non_empty(user.name),
            login: non_empty(Some(user.login)),
            avatar_url: non_empty(user.avatar_url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GithubProvider {
        GithubProvider::new(OAuthClientConfig {
            client_id: "gh-client".into(),
            client_secret: "gh-secret".into(),
            redirect_url: "http://localhost:8080/auth/github/callback".into(),
        })
    }

    #[test]
    fn test_auth_url() {
        let url = url::Url::parse(&provider().auth_url("nonce-1")).unwrap();
        assert_eq!(url.host_str(), Some("github.com"));
        assert_eq!(url.path(), "/login/oauth/authorize");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".into(), "gh-client".into())));
        assert!(pairs.contains(&("state".into(), "nonce-1".into())));
        assert!(pairs.contains(&("scope".into(), "user:email read:user".into())));
        assert!(
            pairs.contains(&(
                "redirect_uri".into(),
                "http://localhost:8080/auth/github/callback".into()
            ))
        );
        assert!(!url.as_str().contains("gh-secret"));
    }
}
