use axum::{
    Json,
    extract::{Extension, Query},
    http::HeaderMap,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use super::principal::require_principal;
use crate::api::{
    error::{ApiError, ErrorBody},
    state::AppState,
};
use crate::audit::AuditEvent;

const DEFAULT_PAGE: usize = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQuery {
    /// Number of events, newest first. Capped at 500.
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/v1/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Recent audit events, newest first.", body = [AuditEvent]),
        (status = 401, description = "Not signed in.", body = ErrorBody),
        (status = 403, description = "Super admin only.", body = ErrorBody),
        (status = 503, description = "Audit store unavailable.", body = ErrorBody),
    ),
    tag = "audit"
)]
pub async fn audit_trail(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    let principal = require_principal(&headers, &state).await?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE);
    Ok(Json(state.admin().audit_trail(&principal, limit).await?))
}
