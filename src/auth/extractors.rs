//! Axum extractors for authentication.
//!
//! Every request is validated on its own: the access token is taken from the
//! `access_token` cookie, falling back to `Authorization: Bearer`, and checked
//! by the [`TokenIssuer`]. Nothing is looked up in the database.

use std::marker::PhantomData;
use std::ops::Deref;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

use super::cookie::{ACCESS_COOKIE_NAME, get_bearer_token, get_cookie};
use super::errors::ApiAuthError;
use super::state::HasAuthBackend;
use super::types::Identity;
use crate::db::Role;
use crate::jwt::{AuthError, TokenIssuer};

/// Extract and validate the access token carried by a request.
pub fn authenticate(headers: &HeaderMap, issuer: &TokenIssuer) -> Result<Identity, AuthError> {
    let token = get_cookie(headers, ACCESS_COOKIE_NAME)
        .filter(|t| !t.is_empty())
        .or_else(|| get_bearer_token(headers))
        .ok_or(AuthError::MissingToken)?;

    match issuer.validate_access_token(token) {
        Ok(claims) => Ok(Identity::from(claims)),
        Err(e) => {
            tracing::debug!(reason = %e, "Rejected access token");
            Err(e)
        }
    }
}

/// Set of roles allowed through a gate.
pub trait RoleConstraint: Send + Sync + 'static {
    fn allows(role: Role) -> bool;
}

/// Any authenticated user.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(role: Role) -> bool {
        match role {
            Role::User | Role::Moderator | Role::Owner => true,
        }
    }
}

pub struct OwnerOnly;

impl RoleConstraint for OwnerOnly {
    fn allows(role: Role) -> bool {
        match role {
            Role::Owner => true,
            Role::User | Role::Moderator => false,
        }
    }
}

pub struct ModeratorOnly;

impl RoleConstraint for ModeratorOnly {
    fn allows(role: Role) -> bool {
        match role {
            Role::Moderator => true,
            Role::User | Role::Owner => false,
        }
    }
}

/// Explicit union; owners are not implied moderators elsewhere.
pub struct ModeratorOrOwner;

impl RoleConstraint for ModeratorOrOwner {
    fn allows(role: Role) -> bool {
        match role {
            Role::Moderator | Role::Owner => true,
            Role::User => false,
        }
    }
}

/// Extractor for endpoints that require authentication and a role in `R`.
/// Missing or invalid tokens give 401, a disallowed role gives 403.
pub struct Auth<R: RoleConstraint = AnyRole> {
    pub identity: Identity,
    _role: PhantomData<R>,
}

impl<R: RoleConstraint> Deref for Auth<R> {
    type Target = Identity;

    fn deref(&self) -> &Identity {
        &self.identity
    }
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Identity placed by `require_auth` middleware saves a second validation.
        let identity = match parts.extensions.get::<Identity>() {
            Some(identity) => identity.clone(),
            None => authenticate(&parts.headers, state.issuer())?,
        };

        if !R::allows(identity.role) {
            tracing::debug!(user_id = %identity.user_id, role = identity.role.as_str(), "Role not allowed");
            return Err(ApiAuthError::forbidden());
        }

        Ok(Auth {
            identity,
            _role: PhantomData,
        })
    }
}

/// Optional authentication extractor - never fails.
/// Useful for endpoints whose behavior varies with, but does not require, identity.
pub struct OptionalAuth(pub Option<Identity>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = match parts.extensions.get::<Identity>() {
            Some(identity) => Some(identity.clone()),
            None => authenticate(&parts.headers, state.issuer()).ok(),
        };
        Ok(OptionalAuth(identity))
    }
}
