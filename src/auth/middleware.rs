//! Route-level gate middleware.
//!
//! Compose per route: `require_auth` (or `optional_auth`) first, then any
//! `require_role::<R>` layers. Layers added later run earlier, so the role
//! layer must be added before the auth layer:
//!
//! ```ignore
//! Router::new()
//!     .route("/moderation", get(handler))
//!     .route_layer(middleware::from_fn(require_role::<ModeratorOrOwner>))
//!     .route_layer(middleware::from_fn_with_state(issuer, require_auth))
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::errors::ApiAuthError;
use super::extractors::{RoleConstraint, authenticate};
use super::types::Identity;
use crate::jwt::TokenIssuer;

/// Reject with 401 unless the request carries a valid access token; on
/// success the [`Identity`] is added to the request extensions.
pub async fn require_auth(
    State(issuer): State<Arc<TokenIssuer>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(request.headers(), &issuer) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => ApiAuthError::from(e).into_response(),
    }
}

/// Attach an [`Identity`] when the token validates; never rejects.
pub async fn optional_auth(
    State(issuer): State<Arc<TokenIssuer>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Ok(identity) = authenticate(request.headers(), &issuer) {
        request.extensions_mut().insert(identity);
    }
    next.run(request).await
}

/// Reject with 403 unless an [`Identity`] is attached and its role is in `R`.
pub async fn require_role<R: RoleConstraint>(request: Request, next: Next) -> Response {
    match request.extensions().get::<Identity>() {
        Some(identity) if R::allows(identity.role) => next.run(request).await,
        _ => ApiAuthError::forbidden().into_response(),
    }
}
