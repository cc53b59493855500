//! Chat directory moderation: list, block, unblock and delete users.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::principal::{parse_id, require_principal};
use crate::admin::BulkBlockResult;
use crate::api::{
    error::{ApiError, ErrorBody},
    state::AppState,
};
use crate::storage::DirectoryUser;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct BulkBlockRequest {
    pub user_ids: Vec<Uuid>,
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "Directory users, newest first.", body = [DirectoryUser]),
        (status = 401, description = "Not signed in.", body = ErrorBody),
        (status = 429, description = "Rate limited.", body = ErrorBody),
        (status = 503, description = "Directory unavailable.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<DirectoryUser>>, ApiError> {
    let principal = require_principal(&headers, &state).await?;
    Ok(Json(state.admin().list_users(&principal).await?))
}

async fn set_blocked(
    headers: &HeaderMap,
    state: &AppState,
    id: &str,
    blocked: bool,
) -> Result<Json<DirectoryUser>, ApiError> {
    let principal = require_principal(headers, state).await?;
    let user_id = parse_id(id)?;
    Ok(Json(
        state
            .admin()
            .set_user_blocked(&principal, user_id, blocked)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/v1/users/{id}/block",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User blocked.", body = DirectoryUser),
        (status = 400, description = "Invalid user id.", body = ErrorBody),
        (status = 401, description = "Not signed in.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
        (status = 429, description = "Rate limited.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn block_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<DirectoryUser>, ApiError> {
    set_blocked(&headers, &state, &id, true).await
}

#[utoipa::path(
    post,
    path = "/v1/users/{id}/unblock",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User unblocked.", body = DirectoryUser),
        (status = 400, description = "Invalid user id.", body = ErrorBody),
        (status = 401, description = "Not signed in.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
        (status = 429, description = "Rate limited.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn unblock_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<DirectoryUser>, ApiError> {
    set_blocked(&headers, &state, &id, false).await
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted."),
        (status = 400, description = "Invalid user id.", body = ErrorBody),
        (status = 401, description = "Not signed in.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
        (status = 429, description = "Rate limited.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn delete_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    let principal = require_principal(&headers, &state).await?;
    let user_id = parse_id(&id)?;
    state.admin().delete_user(&principal, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/users/block",
    request_body = BulkBlockRequest,
    responses(
        (status = 200, description = "Users blocked; unknown ids listed separately.", body = BulkBlockResult),
        (status = 400, description = "Empty list or more than 100 ids.", body = ErrorBody),
        (status = 401, description = "Not signed in.", body = ErrorBody),
        (status = 429, description = "Rate limited.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn bulk_block(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<BulkBlockRequest>,
) -> Result<Json<BulkBlockResult>, ApiError> {
    let principal = require_principal(&headers, &state).await?;
    Ok(Json(
        state
            .admin()
            .bulk_block(&principal, &request.user_ids)
            .await?,
    ))
}
