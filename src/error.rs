//! HTTP error mapping.
//!
//! Every handler returns `Result<_, ApiError>`. Service and repository errors
//! convert with `?`; internal failures are logged here and answered with a
//! generic 500 so driver details never reach the client.

use axum::Json;
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::rate_limit::RateLimitExceeded;
use crate::repository::{RepoError, ValidationErrors};
use crate::services::auth::AuthError;
use crate::services::roles::RoleError;

pub const INTERNAL_DETAIL: &str = "Internal server error";
pub const NOT_FOUND_DETAIL: &str = "Not found!";
pub const TOO_MANY_REQUESTS_DETAIL: &str = "Too many requests";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    /// 422 listing every rejected field.
    #[error("{0}")]
    Validation(ValidationErrors),
    #[error("Too many requests")]
    TooManyRequests,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) | Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `404 Not found!`
    #[must_use]
    pub fn not_found() -> Self {
        Self::NotFound(NOT_FOUND_DETAIL.to_owned())
    }

    fn internal() -> Self {
        Self::Internal(INTERNAL_DETAIL.to_owned())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation(errors) => json!({ "detail": errors }),
            Self::TooManyRequests => json!({ "detail": TOO_MANY_REQUESTS_DETAIL }),
            Self::BadRequest(detail)
            | Self::Unauthorized(detail)
            | Self::Forbidden(detail)
            | Self::NotFound(detail)
            | Self::Conflict(detail)
            | Self::Unprocessable(detail)
            | Self::Internal(detail) => json!({ "detail": detail }),
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::AlreadyExists => Self::Conflict("Account already exists".to_owned()),
            RepoError::Database(e) => {
                tracing::error!(error = %e, "database error");
                Self::internal()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken | AuthError::InvalidScope => Self::Unauthorized(err.to_string()),
            AuthError::Signing(_) | AuthError::Hashing(_) => {
                tracing::error!(error = %err, "credential operation failed");
                Self::internal()
            }
        }
    }
}

impl From<RoleError> for ApiError {
    fn from(err: RoleError) -> Self {
        match err {
            RoleError::Forbidden => Self::Forbidden(err.to_string()),
            RoleError::Unknown(_) => Self::Unprocessable(err.to_string()),
        }
    }
}

impl From<RateLimitExceeded> for ApiError {
    fn from(_: RateLimitExceeded) -> Self {
        Self::TooManyRequests
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Unprocessable(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        Self::Unprocessable(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Unprocessable(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Unprocessable(rejection.body_text())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
