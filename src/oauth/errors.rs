//! OAuth flow error types.

use axum::http::StatusCode;

/// Why an OAuth login attempt failed. None of these are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthError {
    UnknownProvider,
    StateMissing,
    StateMismatch,
    CodeMissing,
    ExchangeFailed,
    ProfileFetchFailed,
    AccountProvisioning,
}

impl OAuthError {
    /// Client-side causes are 400, upstream and local failures are 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuthError::UnknownProvider => StatusCode::NOT_FOUND,
            OAuthError::StateMissing | OAuthError::StateMismatch | OAuthError::CodeMissing => {
                StatusCode::BAD_REQUEST
            }
            OAuthError::ExchangeFailed
            | OAuthError::ProfileFetchFailed
            | OAuthError::AccountProvisioning => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    pub fn public_message(&self) -> &'static str {
        match self {
            OAuthError::UnknownProvider => "Unknown OAuth provider",
            OAuthError::StateMissing | OAuthError::StateMismatch => {
                "Authentication failed. Please try logging in again."
            }
            OAuthError::CodeMissing => "Missing authorization code",
            OAuthError::ExchangeFailed | OAuthError::ProfileFetchFailed => {
                "Failed to authenticate with provider"
            }
            OAuthError::AccountProvisioning => "Failed to create user",
        }
    }
}

impl std::fmt::Display for OAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OAuthError::UnknownProvider => write!(f, "unknown provider"),
            OAuthError::StateMissing => write!(f, "state missing"),
            OAuthError::StateMismatch => write!(f, "state mismatch"),
            OAuthError::CodeMissing => write!(f, "authorization code missing"),
            OAuthError::ExchangeFailed => write!(f, "code exchange failed"),
            OAuthError::ProfileFetchFailed => write!(f, "profile fetch failed"),
            OAuthError::AccountProvisioning => write!(f, "account provisioning failed"),
        }
    }
}

impl std::error::Error for OAuthError {}
