//! Cookie parsing and building for authentication.

use axum::http::{HeaderMap, Uri, header};

/// Cookie name for the access token (short-lived).
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh token (long-lived, database-tracked).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Cookie name for the signed OAuth state (single use).
pub const OAUTH_STATE_COOKIE_NAME: &str = "oauth_state";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn get_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Whether the request arrived over TLS, directly or through a proxy.
pub fn is_secure_request(headers: &HeaderMap, uri: &Uri, force_secure: bool) -> bool {
    if force_secure || uri.scheme_str() == Some("https") {
        return true;
    }
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|proto| proto.trim().to_ascii_lowercase().starts_with("https"))
}

/// Build an HttpOnly, SameSite=Lax cookie.
pub fn build_cookie(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
        name, value, max_age, secure
    )
}

/// Build a cookie that clears `name` in the browser.
pub fn clear_cookie(name: &str, secure: bool) -> String {
    build_cookie(name, "", 0, secure)
}
