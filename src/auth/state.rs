//! Authentication state traits and macro.

use crate::jwt::TokenIssuer;

/// Trait for state types that can validate access tokens.
pub trait HasAuthBackend {
    fn issuer(&self) -> &TokenIssuer;
}

impl HasAuthBackend for std::sync::Arc<TokenIssuer> {
    fn issuer(&self) -> &TokenIssuer {
        self
    }
}

/// Macro to implement `HasAuthBackend` for state structs with the standard field.
///
/// The struct must have an `issuer: Arc<TokenIssuer>` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub issuer: Arc<TokenIssuer>,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn issuer(&self) -> &$crate::jwt::TokenIssuer {
                &self.issuer
            }
        }
    };
}
