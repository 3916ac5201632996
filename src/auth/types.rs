//! Authentication identity types.

use serde::Serialize;

use crate::db::Role;
use crate::jwt::AccessClaims;

/// Identity attached to a request once its access token validates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl From<AccessClaims> for Identity {
    fn from(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}
