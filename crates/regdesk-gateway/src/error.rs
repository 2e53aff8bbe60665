use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use regdesk_security::{FieldError, ValidationErrors};
use serde_json::json;
use tracing::{error, warn};

const INTERNAL_DETAIL: &str = "Internal Server Error";

/// Failure of a request handler, rendered as a JSON body with `detail`.
#[derive(Debug)]
pub enum ApiError {
    /// 422 with per-field detail.
    Validation(ValidationErrors),
    /// 401; the reason is logged, never returned.
    Unauthorized(String),
    /// 500; the cause is logged, never returned.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A body that could not be decoded as a form at all.
    pub fn malformed_body(reason: impl Into<String>) -> Self {
        ApiError::Validation(ValidationErrors {
            errors: vec![FieldError {
                field: "body",
                message: reason.into(),
            }],
        })
    }
}

pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": INTERNAL_DETAIL })),
    )
        .into_response()
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        ApiError::Validation(e)
    }
}

impl From<regdesk_common::Error> for ApiError {
    fn from(e: regdesk_common::Error) -> Self {
        match e {
            regdesk_common::Error::Unauthorized(reason) => ApiError::Unauthorized(reason),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(errors) => {
                (status, Json(json!({ "detail": errors.errors }))).into_response()
            }
            ApiError::Unauthorized(reason) => {
                warn!("rejected request: {reason}");
                (status, Json(json!({ "detail": "invalid or missing api key" }))).into_response()
            }
            ApiError::Internal(cause) => {
                error!("request failed: {cause}");
                internal_error_response()
            }
        }
    }
}
