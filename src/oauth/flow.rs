//! Provider-agnostic OAuth login flow.
//!
//! 1. `begin` mints a nonce, signs it for the cookie, and builds the consent URL.
//! 2. `verify_callback` checks the cookie against the returned `state`.
//! 3. `complete` exchanges the code and normalizes the profile.
//! 4. `resolve_account` finds or provisions the local user.
//!
//! Issuing the session afterwards is shared with password login.

use std::collections::HashMap;
use std::sync::Arc;

use super::errors::OAuthError;
use super::provider::{OAuthProvider, ProviderProfile};
use super::state::StateSigner;
use crate::config::AuthConfig;
use crate::db::{LocalUser, NewUser, OAUTH_PASSWORD_SENTINEL, UserStore};

/// Where to send the browser, and what to put in the state cookie.
#[derive(Debug, Clone)]
pub struct OAuthRedirect {
    pub url: String,
    pub signed_state: String,
}

/// A provider profile reduced to what account resolution needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub provider: String,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Clone)]
pub struct OAuthFlow {
    signer: StateSigner,
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
}

impl OAuthFlow {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            signer: StateSigner::new(config),
            providers: HashMap::new(),
        }
    }

    /// Register a provider under its `name()`.
    pub fn with_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn provider(&self, name: &str) -> Result<&Arc<dyn OAuthProvider>, OAuthError> {
        self.providers.get(name).ok_or(OAuthError::UnknownProvider)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn signer(&self) -> &StateSigner {
        &self.signer
    }

    /// Start a login attempt with the named provider.
    pub fn begin(&self, provider: &str) -> Result<OAuthRedirect, OAuthError> {
        let provider = self.provider(provider)?;
        let nonce = StateSigner::generate_nonce();

        Ok(OAuthRedirect {
            url: provider.auth_url(&nonce),
            signed_state: self.signer.sign(&nonce),
        })
    }

    /// Validate the callback inputs and return the authorization code.
    /// Empty values count as absent.
    pub fn verify_callback<'a>(
        &self,
        state_cookie: Option<&str>,
        query_state: Option<&str>,
        code: Option<&'a str>,
    ) -> Result<&'a str, OAuthError> {
        let state_cookie = state_cookie
            .filter(|s| !s.is_empty())
            .ok_or(OAuthError::StateMissing)?;
        let query_state = query_state
            .filter(|s| !s.is_empty())
            .ok_or(OAuthError::StateMissing)?;

        self.signer.verify(query_state, state_cookie)?;

        code.filter(|c| !c.is_empty()).ok_or(OAuthError::CodeMissing)
    }

    /// Exchange the code and normalize the resulting profile.
    pub async fn complete(
        &self,
        provider: &str,
        code: &str,
    ) -> Result<FederatedIdentity, OAuthError> {
        let provider = self.provider(provider)?;
        let profile = provider.exchange(code).await?;
        let email = resolve_email(provider.name(), &profile)?;
        let username = derive_username(&profile, &email);

        Ok(FederatedIdentity {
            provider: provider.name().to_string(),
            full_name: profile.display_name.clone().or(profile.login.clone()),
            avatar_url: profile.avatar_url,
            email,
            username,
        })
    }

    /// Find the local account for this identity by email, or create an
    /// OAuth-only account. The derived username is not checked for
    /// collisions with other accounts first.
    pub async fn resolve_account(
        &self,
        users: &UserStore,
        identity: &FederatedIdentity,
    ) -> Result<LocalUser, OAuthError> {
        if let Some(user) = find_by_email(users, &identity.email).await? {
            return Ok(user);
        }

        let created = users
            .create(NewUser {
                username: &identity.username,
                email: &identity.email,
                password_hash: OAUTH_PASSWORD_SENTINEL,
                full_name: identity.full_name.as_deref(),
                avatar_url: identity.avatar_url.as_deref(),
            })
            .await;

        match created {
            Ok(user) => {
                tracing::info!(
                    provider = %identity.provider,
                    user_id = %user.id,
                    "Provisioned account from OAuth login"
                );
                Ok(user)
            }
            Err(e) => {
                // A concurrent callback for the same email may have won the insert.
                if let Some(user) = find_by_email(users, &identity.email).await? {
                    return Ok(user);
                }
                tracing::error!(
                    provider = %identity.provider,
                    error = %e,
                    "Failed to provision OAuth account"
                );
                Err(OAuthError::AccountProvisioning)
            }
        }
    }
}

async fn find_by_email(users: &UserStore, email: &str) -> Result<Option<LocalUser>, OAuthError> {
    users.get_by_email(email).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to look up user by email");
        OAuthError::AccountProvisioning
    })
}

/// The provider's email, or a deterministic placeholder built from the
/// provider handle (`{login}@{provider}.local`). Not a real mailbox.
pub fn resolve_email(provider: &str, profile: &ProviderProfile) -> Result<String, OAuthError> {
    if let Some(email) = profile.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        return Ok(email.to_string());
    }

    match profile.login.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        Some(login) => Ok(format!("{login}@{provider}.local")),
        None => {
            tracing::warn!(provider, "Provider profile has neither email nor login");
            Err(OAuthError::ProfileFetchFailed)
        }
    }
}

/// The provider handle when there is one, else the email's local part.
pub fn derive_username(profile: &ProviderProfile, email: &str) -> String {
    match profile.login.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        Some(login) => login.to_string(),
        None => email.split('@').next().unwrap_or(email).to_string(),
    }
}
