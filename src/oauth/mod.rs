//! OAuth federation: signed state, providers, and account resolution.

mod errors;
mod flow;
mod github;
mod google;
mod provider;
mod state;

pub use errors::OAuthError;
pub use flow::{FederatedIdentity, OAuthFlow, OAuthRedirect, derive_username, resolve_email};
pub use github::GithubProvider;
pub use google::GoogleProvider;
pub use provider::{OAuthClientConfig, OAuthProvider, ProviderEndpoints, ProviderProfile};
pub use state::StateSigner;

/// Lifetime of the `oauth_state` cookie in seconds.
pub const STATE_COOKIE_MAX_AGE: u64 = 600;
