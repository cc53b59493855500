//! Dashboard overview counts.

use axum::{Json, extract::Extension, http::HeaderMap};
use std::sync::Arc;

use super::principal::require_principal;
use crate::api::{
    error::{ApiError, ErrorBody},
    state::AppState,
};
use crate::storage::DirectoryStats;

#[utoipa::path(
    get,
    path = "/v1/stats",
    responses(
        (status = 200, description = "Total users, blocked users and pending reports.", body = DirectoryStats),
        (status = 401, description = "Not signed in.", body = ErrorBody),
        (status = 429, description = "Rate limited.", body = ErrorBody),
        (status = 503, description = "Directory unavailable.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn stats(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<DirectoryStats>, ApiError> {
    let principal = require_principal(&headers, &state).await?;
    Ok(Json(state.admin().stats(&principal).await?))
}
