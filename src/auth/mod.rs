//! Authorization gate: bearer token extraction, validation, and role checks.
//!
//! Access tokens are stateless; the gate never touches the database. Token
//! failures of every kind answer 401 with one message, role failures 403.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod middleware;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, OAUTH_STATE_COOKIE_NAME, REFRESH_COOKIE_NAME, build_cookie, clear_cookie,
    get_bearer_token, get_cookie, is_secure_request,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{
    AnyRole, Auth, ModeratorOnly, ModeratorOrOwner, OptionalAuth, OwnerOnly, RoleConstraint,
    authenticate,
};
pub use ip::{ClientIpHeader, HasHeadersAndExtensions, extract_client_ip};
pub use middleware::{optional_auth, require_auth, require_role};
pub use state::HasAuthBackend;
pub use types::Identity;
