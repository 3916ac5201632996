//! Session endpoints and the cookie pair shared by every login path.
//!
//! - POST `/refresh` - Exchange the refresh cookie for a new access token
//! - POST `/logout` - Revoke the refresh token and clear both cookies
//! - POST `/logout-all` - Revoke every refresh token of the caller
//! - GET `/profile` - The caller's account

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use serde_json::json;
use tracing::{debug, error, warn};

use super::error::{ApiError, ResultExt};
use super::{AuthState, UserResponse};
use crate::auth::{
    ACCESS_COOKIE_NAME, AnyRole, Auth, REFRESH_COOKIE_NAME, build_cookie, clear_cookie, get_cookie,
};
use crate::db::{LocalUser, StoreError};

/// Mint an access/refresh pair for `user`, persist the refresh token, and
/// return the two `Set-Cookie` values.
pub(super) async fn issue_session(
    state: &AuthState,
    user: &LocalUser,
    secure: bool,
) -> Result<[String; 2], ApiError> {
    let access = state
        .issuer
        .issue_access_token(&user.id, &user.email, user.role)
        .map_err(|e| {
            error!("Failed to generate access token: {}", e);
            ApiError::internal("Failed to generate token")
        })?;

    let refresh = state.issuer.issue_refresh_token(&user.id).map_err(|e| {
        error!("Failed to generate refresh token: {}", e);
        ApiError::internal("Failed to generate token")
    })?;

    state
        .db
        .refresh_tokens()
        .store(&user.id, &refresh.token, refresh.expires_at)
        .await?;

    Ok([
        build_cookie(ACCESS_COOKIE_NAME, &access.token, access.duration, secure),
        build_cookie(REFRESH_COOKIE_NAME, &refresh.token, refresh.duration, secure),
    ])
}

fn clear_session_cookies(secure: bool) -> AppendHeaders<[(axum::http::HeaderName, String); 2]> {
    AppendHeaders([
        (SET_COOKIE, clear_cookie(ACCESS_COOKIE_NAME, secure)),
        (SET_COOKIE, clear_cookie(REFRESH_COOKIE_NAME, secure)),
    ])
}

/// Issue a new access token. The refresh token is not rotated: the same
/// cookie stays valid until it expires or is revoked.
pub(super) async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<impl IntoResponse, ApiError> {
    let token = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing refresh token"))?;

    let claims = state.issuer.validate_refresh_token(token).map_err(|e| {
        debug!(reason = %e, "Rejected refresh token");
        ApiError::unauthorized("Invalid or expired refresh token")
    })?;

    let store = state.db.refresh_tokens();
    let record = match store.get_by_token(token).await {
        Ok(record) => record,
        Err(e) if !e.is_auth_decision() => return Err(e.into()),
        Err(_) => {
            let reason = store.diagnose(token).await;
            return Err(unusable_refresh_token(&claims.sub, reason));
        }
    };

    if record.user_id != claims.sub {
        warn!(user_id = %claims.sub, "Refresh token subject does not match its record");
        return Err(ApiError::unauthorized("Invalid or expired refresh token"));
    }

    let user = state
        .db
        .users()
        .get_by_id(&claims.sub)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    let access = state
        .issuer
        .issue_access_token(&user.id, &user.email, user.role)
        .map_err(|e| {
            error!("Failed to generate access token: {}", e);
            ApiError::internal("Failed to generate token")
        })?;

    let cookie = build_cookie(
        ACCESS_COOKIE_NAME,
        &access.token,
        access.duration,
        state.secure(&headers, &uri),
    );

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(json!({ "message": "Token refreshed successfully" })),
    ))
}

/// The store lookup already rejected the token. `reason` only feeds the log,
/// so a diagnosis that failed to reach the store still answers 401.
fn unusable_refresh_token(user_id: &str, reason: StoreError) -> ApiError {
    debug!(user_id, reason = %reason, "Refresh token not usable");
    StoreError::NotFound.into()
}

/// Revoke the presented refresh token if any, then clear both cookies.
/// Revocation is best-effort; the cookies are cleared either way.
pub(super) async fn logout(
    State(state): State<AuthState>,
    headers: HeaderMap,
    uri: Uri,
) -> impl IntoResponse {
    if let Some(token) = get_cookie(&headers, REFRESH_COOKIE_NAME).filter(|t| !t.is_empty()) {
        if let Err(e) = state.db.refresh_tokens().revoke(token).await {
            warn!(error = %e, "Failed to revoke refresh token on logout");
        }
    }

    (
        StatusCode::OK,
        clear_session_cookies(state.secure(&headers, &uri)),
        Json(json!({ "message": "Logged out successfully" })),
    )
}

/// Revoke every refresh token belonging to the caller.
pub(super) async fn logout_all(
    State(state): State<AuthState>,
    auth: Auth<AnyRole>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state
        .db
        .refresh_tokens()
        .revoke_all_by_user_id(&auth.user_id)
        .await?;

    tracing::info!(user_id = %auth.user_id, revoked, "Logged out from all devices");

    Ok((
        StatusCode::OK,
        clear_session_cookies(state.secure(&headers, &uri)),
        Json(json!({
            "message": "Logged out from all devices",
            "revoked": revoked,
        })),
    ))
}

pub(super) async fn profile(
    State(state): State<AuthState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_id(&auth.user_id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(json!({ "user": UserResponse::from(&user) })))
}
