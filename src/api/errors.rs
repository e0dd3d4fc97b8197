use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::repositories::StoreError;
use crate::services::ai_context::ContextError;
use crate::services::pending_review::ReviewError;
use crate::services::submission_ingest::SubmissionError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    NotFound(String),
    ServiceUnavailable(String),
    /// A domain failure the caller can act on; `code` is machine-readable.
    Domain { status: StatusCode, code: &'static str, detail: String },
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    pub(crate) fn validation(detail: impl Into<String>) -> Self {
        Self::Domain {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            detail: detail.into(),
        }
    }

    fn domain(status: StatusCode, code: &'static str, detail: impl ToString) -> Self {
        Self::Domain { status, code, detail: detail.to_string() }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::internal(err, "Storage operation failed")
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::Validation(detail) => ApiError::validation(detail),
            SubmissionError::DuplicateSubmission => {
                ApiError::domain(StatusCode::CONFLICT, "duplicate_submission", &err)
            }
            SubmissionError::MaxAttemptsReached { .. } => {
                ApiError::domain(StatusCode::FORBIDDEN, "max_attempts_reached", &err)
            }
            SubmissionError::UnitNotFound(_) => {
                ApiError::domain(StatusCode::NOT_FOUND, "unit_not_found", &err)
            }
            SubmissionError::Store(err) => err.into(),
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::NotFound(_) => ApiError::domain(StatusCode::NOT_FOUND, "not_found", &err),
            ReviewError::UnitNotFound(_) => {
                ApiError::domain(StatusCode::NOT_FOUND, "unit_not_found", &err)
            }
            ReviewError::NotUnitReviewer(_) => {
                ApiError::domain(StatusCode::FORBIDDEN, "not_unit_reviewer", &err)
            }
            ReviewError::AlreadyProcessed { .. } => {
                ApiError::domain(StatusCode::CONFLICT, "already_processed", &err)
            }
            ReviewError::InvalidScore(_) => {
                ApiError::domain(StatusCode::BAD_REQUEST, "invalid_score", &err)
            }
            ReviewError::NothingToValidate => {
                ApiError::domain(StatusCode::BAD_REQUEST, "nothing_to_validate", &err)
            }
            ReviewError::Store(err) => err.into(),
        }
    }
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::NoContent(_) => {
                ApiError::domain(StatusCode::BAD_REQUEST, "no_content", &err)
            }
            ContextError::StorageUnavailable => ApiError::ServiceUnavailable(err.to_string()),
            ContextError::Storage(_) | ContextError::Service(_) => {
                tracing::warn!(error = %err, "AI context regeneration failed");
                ApiError::domain(StatusCode::BAD_GATEWAY, "context_unavailable", &err)
            }
            ContextError::Store(err) => err.into(),
        }
    }
}

fn respond(status: StatusCode, detail: String, code: Option<&'static str>) -> Response {
    (status, Json(ErrorResponse { status: status.as_u16(), detail, code })).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let mut response = respond(StatusCode::UNAUTHORIZED, message.to_string(), None);
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Forbidden(message) => {
                respond(StatusCode::FORBIDDEN, message.to_string(), None)
            }
            ApiError::NotFound(message) => respond(StatusCode::NOT_FOUND, message, None),
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                respond(StatusCode::SERVICE_UNAVAILABLE, message, None)
            }
            ApiError::Domain { status, code, detail } => respond(status, detail, Some(code)),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                respond(StatusCode::INTERNAL_SERVER_ERROR, message, None)
            }
        }
    }
}
