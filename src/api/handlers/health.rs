use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use std::sync::Arc;
use tracing::{Instrument, debug, error, info_span};
use utoipa::ToSchema;

use crate::GIT_COMMIT_HASH;
use crate::api::state::AppState;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    /// `ok`, `error`, or `memory` when running without PostgreSQL.
    database: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Storage is reachable", body = Health),
        (status = 503, description = "Database is unreachable", body = Health)
    ),
    tag = "health"
)]
pub async fn health(method: Method, Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let database = match state.pool() {
        Some(pool) => match ping(pool).await {
            Ok(()) => "ok",
            Err(()) => "error",
        },
        None => "memory",
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .unwrap_or_else(|err| {
            error!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        });

    if database == "error" {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    } else {
        (StatusCode::OK, headers, body)
    }
}

async fn ping(pool: &PgPool) -> Result<(), ()> {
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    let mut conn = pool.acquire().instrument(acquire_span).await.map_err(|err| {
        error!("Failed to acquire database connection: {}", err);
    })?;

    let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
    conn.ping().instrument(ping_span).await.map_err(|err| {
        error!("Failed to ping database: {}", err);
    })
}
