//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down brute
//! force and signup spam.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::{ClientIpHeader, extract_client_ip};

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const LOGIN_PER_MINUTE: NonZeroU32 = NonZeroU32::new(5).unwrap();
/// One signup slot every 100 seconds, bursting to 3: three per five minutes.
const REGISTER_PER_HOUR: NonZeroU32 = NonZeroU32::new(36).unwrap();
const REGISTER_BURST: NonZeroU32 = NonZeroU32::new(3).unwrap();
const OAUTH_PER_MINUTE: NonZeroU32 = NonZeroU32::new(10).unwrap();
const PERMISSIVE_PER_SECOND: NonZeroU32 = NonZeroU32::new(1000).unwrap();

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Password login (5 requests per minute)
    pub login: Arc<IpLimiter>,
    /// Account registration (3 requests per 5 minutes)
    pub register: Arc<IpLimiter>,
    /// OAuth redirect and callback (10 requests per minute)
    pub oauth: Arc<IpLimiter>,
    /// Trusted proxy header for the client address, if any.
    pub ip_header: Option<ClientIpHeader>,
}

impl RateLimitConfig {
    /// Create rate limiters with the production limits.
    pub fn new(ip_header: Option<ClientIpHeader>) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(Quota::per_minute(LOGIN_PER_MINUTE))),
            register: Arc::new(RateLimiter::keyed(
                Quota::per_hour(REGISTER_PER_HOUR).allow_burst(REGISTER_BURST),
            )),
            oauth: Arc::new(RateLimiter::keyed(Quota::per_minute(OAUTH_PER_MINUTE))),
            ip_header,
        }
    }

    /// Limits high enough that tests never hit them.
    pub fn permissive(ip_header: Option<ClientIpHeader>) -> Self {
        let quota = Quota::per_second(PERMISSIVE_PER_SECOND);
        Self {
            login: Arc::new(RateLimiter::keyed(quota)),
            register: Arc::new(RateLimiter::keyed(quota)),
            oauth: Arc::new(RateLimiter::keyed(quota)),
            ip_header,
        }
    }
}

async fn check(
    limiter: &IpLimiter,
    ip_header: Option<ClientIpHeader>,
    message: &'static str,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, ip_header) {
        Ok(ip) => ip,
        Err(reason) => {
            tracing::warn!(reason, "Unable to determine client IP");
            return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
        }
    };

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::info!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
            (StatusCode::TOO_MANY_REQUESTS, message).into_response()
        }
    }
}

/// Middleware for rate limiting password login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.login,
        config.ip_header,
        "Too many login attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting account registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.register,
        config.ip_header,
        "Too many signup attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting the OAuth redirect and callback.
pub async fn rate_limit_oauth(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.oauth,
        config.ip_header,
        "Too many requests. Please try again later.",
        request,
        next,
    )
    .await
}
