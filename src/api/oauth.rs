//! OAuth login endpoints.
//!
//! - GET `/{provider}` - Set the signed state cookie and redirect to the provider
//! - GET `/{provider}/callback` - Verify state, exchange the code, and log in

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, Uri, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::error::ApiError;
use super::session::issue_session;
use super::{AuthState, UserResponse};
use crate::auth::{OAUTH_STATE_COOKIE_NAME, build_cookie, clear_cookie, get_cookie};
use crate::oauth::{OAuthError, STATE_COOKIE_MAX_AGE};

pub(super) async fn begin(
    State(state): State<AuthState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ApiError> {
    let redirect = state.flow.begin(&provider).inspect_err(|e| {
        tracing::debug!(provider = %provider, reason = %e, "OAuth login not started");
    })?;

    let cookie = build_cookie(
        OAUTH_STATE_COOKIE_NAME,
        &redirect.signed_state,
        STATE_COOKIE_MAX_AGE,
        state.secure(&headers, &uri),
    );

    Ok(([(SET_COOKIE, cookie)], Redirect::temporary(&redirect.url)).into_response())
}

#[derive(Debug, Deserialize)]
pub(super) struct CallbackQuery {
    state: Option<String>,
    code: Option<String>,
    /// Set by the provider when the user declines consent.
    error: Option<String>,
}

/// The state cookie is single use: every response from here clears it.
pub(super) async fn callback(
    State(state): State<AuthState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let secure = state.secure(&headers, &uri);
    let clear_state = clear_cookie(OAUTH_STATE_COOKIE_NAME, secure);

    match finish_login(&state, &provider, &query, &headers, secure).await {
        Ok(([access, refresh], body)) => (
            StatusCode::OK,
            AppendHeaders([
                (SET_COOKIE, clear_state),
                (SET_COOKIE, access),
                (SET_COOKIE, refresh),
            ]),
            Json(body),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(provider = %provider, reason = %e, "OAuth callback rejected");
            (AppendHeaders([(SET_COOKIE, clear_state)]), ApiError::from(e)).into_response()
        }
    }
}

async fn finish_login(
    state: &AuthState,
    provider: &str,
    query: &CallbackQuery,
    headers: &HeaderMap,
    secure: bool,
) -> Result<([String; 2], Value), CallbackError> {
    let display_name = state.flow.provider(provider)?.display_name();

    if let Some(reason) = query.error.as_deref() {
        tracing::info!(provider, reason, "Provider returned an error");
    }

    let code = state.flow.verify_callback(
        get_cookie(headers, OAUTH_STATE_COOKIE_NAME),
        query.state.as_deref(),
        query.code.as_deref(),
    )?;

    let identity = state.flow.complete(provider, code).await?;
    let user = state
        .flow
        .resolve_account(&state.db.users(), &identity)
        .await?;

    let cookies = issue_session(state, &user, secure).await?;
    tracing::info!(provider, user_id = %user.id, "OAuth login succeeded");

    Ok((
        cookies,
        json!({
            "message": format!("{} authentication successful", display_name),
            "user": UserResponse::from(&user),
        }),
    ))
}

/// Failures of the callback: flow errors before the session exists, API
/// errors while issuing it.
enum CallbackError {
    Flow(OAuthError),
    Session(ApiError),
}

impl From<OAuthError> for CallbackError {
    fn from(e: OAuthError) -> Self {
        Self::Flow(e)
    }
}

impl From<ApiError> for CallbackError {
    fn from(e: ApiError) -> Self {
        Self::Session(e)
    }
}

impl std::fmt::Display for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackError::Flow(e) => write!(f, "{}", e),
            CallbackError::Session(e) => write!(f, "session not issued ({})", e.status_code()),
        }
    }
}

impl From<CallbackError> for ApiError {
    fn from(e: CallbackError) -> Self {
        match e {
            CallbackError::Flow(e) => e.into(),
            CallbackError::Session(e) => e,
        }
    }
}
