//! Authentication error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::jwt::AuthError;

/// Gate rejection kind. Token failures are kept for logging but all
/// answer the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    Token(AuthError),
    InsufficientRole,
}

/// API authentication errors (JSON body, never reveals why a token failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
}

impl ApiAuthError {
    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    pub(super) fn forbidden() -> Self {
        Self {
            kind: AuthErrorKind::InsufficientRole,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::Token(_) => StatusCode::UNAUTHORIZED,
            AuthErrorKind::InsufficientRole => StatusCode::FORBIDDEN,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::Token(AuthError::MissingToken) => "Missing authorization token",
            AuthErrorKind::Token(
                AuthError::InvalidSignature
                | AuthError::AlgorithmMismatch
                | AuthError::Expired
                | AuthError::Malformed,
            ) => "Invalid or expired token",
            AuthErrorKind::InsufficientRole => "Insufficient permissions",
        }
    }
}

impl From<AuthError> for ApiAuthError {
    fn from(error: AuthError) -> Self {
        Self {
            kind: AuthErrorKind::Token(error),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}
