//! Admin account management. Super admins only.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::principal::{parse_id, require_principal};
use crate::admin::{AdminSummary, AdminUpdate, CreatedAdmin};
use crate::api::{
    error::{ApiError, ErrorBody},
    state::AppState,
};
use crate::storage::AdminRole;

#[derive(Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateAdminRequest {
    pub email: String,
    /// Omit to have a strong password generated and returned once.
    #[serde(default)]
    pub password: Option<String>,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: AdminRole,
}

fn default_role() -> AdminRole {
    AdminRole::Admin
}

#[utoipa::path(
    get,
    path = "/v1/admins",
    responses(
        (status = 200, description = "All admin accounts.", body = [AdminSummary]),
        (status = 401, description = "Not signed in.", body = ErrorBody),
        (status = 403, description = "Super admin only.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn list_admins(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<AdminSummary>>, ApiError> {
    let principal = require_principal(&headers, &state).await?;
    Ok(Json(state.admin().list_admins(&principal).await?))
}

#[utoipa::path(
    post,
    path = "/v1/admins",
    request_body = CreateAdminRequest,
    responses(
        (status = 201, description = "Admin created. Carries `generated_password` when none was given.", body = CreatedAdmin),
        (status = 400, description = "Invalid email, name or weak password.", body = ErrorBody),
        (status = 401, description = "Not signed in.", body = ErrorBody),
        (status = 403, description = "Super admin only.", body = ErrorBody),
        (status = 429, description = "Rate limited.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn create_admin(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CreateAdminRequest>,
) -> Result<(StatusCode, Json<CreatedAdmin>), ApiError> {
    let principal = require_principal(&headers, &state).await?;
    let created = state
        .admin()
        .create_admin(
            &principal,
            &request.email,
            request.password.as_deref(),
            &request.name,
            request.role,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update(
    headers: &HeaderMap,
    state: &AppState,
    id: &str,
    update: AdminUpdate,
) -> Result<Json<AdminSummary>, ApiError> {
    let principal = require_principal(headers, state).await?;
    let target = parse_id(id)?;
    Ok(Json(
        state.admin().update_admin(&principal, target, update).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/v1/admins/{id}/activate",
    params(("id" = String, Path, description = "Admin id")),
    responses(
        (status = 200, description = "Admin activated.", body = AdminSummary),
        (status = 400, description = "Invalid id or self-modification.", body = ErrorBody),
        (status = 403, description = "Super admin only.", body = ErrorBody),
        (status = 404, description = "Admin not found.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn activate_admin(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<AdminSummary>, ApiError> {
    update(&headers, &state, &id, AdminUpdate::Activate).await
}

#[utoipa::path(
    post,
    path = "/v1/admins/{id}/deactivate",
    params(("id" = String, Path, description = "Admin id")),
    responses(
        (status = 200, description = "Admin deactivated; live sessions stop working.", body = AdminSummary),
        (status = 400, description = "Invalid id or self-modification.", body = ErrorBody),
        (status = 403, description = "Super admin only.", body = ErrorBody),
        (status = 404, description = "Admin not found.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn deactivate_admin(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<AdminSummary>, ApiError> {
    update(&headers, &state, &id, AdminUpdate::Deactivate).await
}

#[utoipa::path(
    post,
    path = "/v1/admins/{id}/promote",
    params(("id" = String, Path, description = "Admin id")),
    responses(
        (status = 200, description = "Admin promoted to super admin.", body = AdminSummary),
        (status = 400, description = "Invalid id or self-modification.", body = ErrorBody),
        (status = 403, description = "Super admin only.", body = ErrorBody),
        (status = 404, description = "Admin not found.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn promote_admin(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<AdminSummary>, ApiError> {
    update(&headers, &state, &id, AdminUpdate::Promote).await
}

#[utoipa::path(
    post,
    path = "/v1/admins/{id}/demote",
    params(("id" = String, Path, description = "Admin id")),
    responses(
        (status = 200, description = "Super admin demoted to admin.", body = AdminSummary),
        (status = 400, description = "Invalid id or self-modification.", body = ErrorBody),
        (status = 403, description = "Super admin only.", body = ErrorBody),
        (status = 404, description = "Admin not found.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn demote_admin(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<AdminSummary>, ApiError> {
    update(&headers, &state, &id, AdminUpdate::Demote).await
}
