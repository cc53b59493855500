use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::HeaderMap,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use super::principal::{parse_id, require_principal};
use crate::api::{
    error::{ApiError, ErrorBody},
    state::AppState,
};
use crate::storage::{Report, ReportStatus};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReportFilter {
    /// Only reports in this status.
    pub status: Option<ReportStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ResolveReportRequest {
    pub status: ReportStatus,
}

#[utoipa::path(
    get,
    path = "/v1/reports",
    params(ReportFilter),
    responses(
        (status = 200, description = "Abuse reports, newest first.", body = [Report]),
        (status = 401, description = "Not signed in.", body = ErrorBody),
        (status = 429, description = "Rate limited.", body = ErrorBody),
    ),
    tag = "reports"
)]
pub async fn list_reports(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
    Query(filter): Query<ReportFilter>,
) -> Result<Json<Vec<Report>>, ApiError> {
    let principal = require_principal(&headers, &state).await?;
    Ok(Json(
        state
            .admin()
            .list_reports(&principal, filter.status)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/v1/reports/{id}/resolve",
    params(("id" = String, Path, description = "Report id")),
    request_body = ResolveReportRequest,
    responses(
        (status = 200, description = "Report resolved; approval also blocks the user.", body = Report),
        (status = 400, description = "Invalid id or pending status.", body = ErrorBody),
        (status = 401, description = "Not signed in.", body = ErrorBody),
        (status = 404, description = "Report not found.", body = ErrorBody),
        (status = 429, description = "Rate limited.", body = ErrorBody),
    ),
    tag = "reports"
)]
pub async fn resolve_report(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ResolveReportRequest>,
) -> Result<Json<Report>, ApiError> {
    let principal = require_principal(&headers, &state).await?;
    let report_id = parse_id(&id)?;
    Ok(Json(
        state
            .admin()
            .resolve_report(&principal, report_id, request.status)
            .await?,
    ))
}
