//! Login, logout, session and password endpoints.
//!
//! Flow Overview:
//! 1) Login keys the rate limiter on the server-observed client address.
//! 2) A successful login returns the token in the body and an `HttpOnly` cookie.
//! 3) Every other endpoint resolves the caller from bearer token or cookie.

use axum::{
    Json,
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::principal::{
    clear_session_cookie, client_address, extract_session_token, require_principal,
    session_cookie,
};
use crate::admin::AdminSummary;
use crate::api::{
    error::{ApiError, ErrorBody},
    state::AppState,
};
use crate::auth::{PasswordChange, SessionError};
use crate::storage::AdminRole;

#[derive(Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub admin: AdminSummary,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: AdminRole,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; session cookie set.", body = LoginResponse),
        (status = 401, description = "Invalid credentials.", body = ErrorBody),
        (status = 429, description = "Too many attempts; see Retry-After.", body = ErrorBody),
        (status = 503, description = "Credential store unavailable.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let client = client_address(&headers, peer, state.config().trust_proxy_headers());
    let outcome = state
        .authenticator()
        .login(&request.email, &request.password, &client)
        .await?;

    let mut response_headers = HeaderMap::new();
    match session_cookie(state.config(), &outcome.session.token) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }

    let body = LoginResponse {
        token: outcome.session.token.clone(),
        expires_at: outcome.session.expires_at,
        admin: outcome.account.into(),
    };
    Ok((StatusCode::OK, response_headers, Json(body)).into_response())
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared.")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    if let Ok(principal) = require_principal(&headers, &state).await {
        state.authenticator().logout(&principal).await;
    }

    // Always clear the cookie, even for an unknown or expired token.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers)
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active.", body = SessionResponse),
        (status = 204, description = "No active session."),
        (status = 503, description = "Credential store unavailable.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Response, ApiError> {
    // Missing or rejected tokens read as "no session" rather than an error.
    let Some(token) = extract_session_token(&headers) else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    match state.sessions().resolve(&token).await {
        Ok(principal) => {
            let body = SessionResponse {
                id: principal.id,
                email: principal.email,
                name: principal.name,
                role: principal.role,
                expires_at: principal.expires_at,
            };
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        Err(SessionError::Invalid) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(err) => Err(err.into()),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password changed."),
        (status = 400, description = "Mismatch, reuse or weak password.", body = ErrorBody),
        (status = 401, description = "Not signed in or wrong current password.", body = ErrorBody),
        (status = 429, description = "Too many attempts; see Retry-After.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<PasswordChangeRequest>,
) -> Result<StatusCode, ApiError> {
    let principal = require_principal(&headers, &state).await?;
    state
        .authenticator()
        .change_password(
            &principal,
            PasswordChange {
                current: &request.current_password,
                new: &request.new_password,
                confirm: &request.confirm_password,
            },
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
