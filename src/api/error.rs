//! HTTP mapping for [`AuthError`].
//!
//! Bodies stay generic: failures never reveal whether an email exists, and
//! lockouts expose only a `Retry-After` header.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::auth::{AuthError, SessionError, ValidationError};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl ApiError {
    pub(crate) fn invalid(reason: &str) -> Self {
        Self(ValidationError::Invalid(reason.to_string()).into())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        let (status, message) = match &self.0 {
            AuthError::Validation(reason) => (StatusCode::BAD_REQUEST, reason.to_string()),
            AuthError::AuthFailure => (StatusCode::UNAUTHORIZED, "authentication failed".into()),
            AuthError::Lockout { .. } => {
                if let Some(seconds) = self.0.retry_after_seconds() {
                    headers.insert(RETRY_AFTER, HeaderValue::from(seconds));
                }
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "too many attempts, try again later".into(),
                )
            }
            AuthError::Dependency(err) => {
                error!("dependency failure: {err}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service temporarily unavailable".into(),
                )
            }
            AuthError::Forbidden => {
                warn!("forbidden request");
                (StatusCode::FORBIDDEN, "forbidden".into())
            }
            AuthError::NotFound => (StatusCode::NOT_FOUND, "not found".into()),
        };

        (status, headers, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DependencyError;
    use std::time::Duration;

    #[test]
    fn status_codes() {
        let cases = [
            (
                AuthError::Validation(ValidationError::InvalidEmail),
                StatusCode::BAD_REQUEST,
            ),
            (AuthError::AuthFailure, StatusCode::UNAUTHORIZED),
            (
                AuthError::Lockout {
                    retry_after: Duration::from_secs(3),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                AuthError::Dependency(DependencyError {
                    operation: "credential lookup".to_string(),
                    attempts: 3,
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (AuthError::Forbidden, StatusCode::FORBIDDEN),
            (AuthError::NotFound, StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[test]
    fn lockout_sets_retry_after_rounded_up() {
        let response = ApiError(AuthError::Lockout {
            retry_after: Duration::from_millis(2_500),
        })
        .into_response();
        assert_eq!(
            response.headers().get(RETRY_AFTER),
            Some(&HeaderValue::from_static("3"))
        );
    }

    #[test]
    fn invalid_session_maps_to_unauthorized() {
        let response = ApiError::from(SessionError::Invalid).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }
}
