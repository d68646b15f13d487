//! Response envelopes.
//!
//! Every endpoint answers `{ success, data }` or
//! `{ success: false, message, errors: [{field, message}] }`. Unexpected
//! errors collapse to a generic failure so internals never leak.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tracing::error;

use curbwatch_common::CurbwatchError;
use curbwatch_engine::FieldError;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

pub fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    (
        status,
        Json(Envelope {
            success: true,
            data: Some(data),
            message: None,
            errors: Vec::new(),
        }),
    )
        .into_response()
}

pub fn failure(status: StatusCode, message: &str, errors: Vec<FieldError>) -> Response {
    (
        status,
        Json(Envelope::<()> {
            success: false,
            data: None,
            message: Some(message.to_string()),
            errors,
        }),
    )
        .into_response()
}

/// Map a domain error to its envelope; infrastructure errors become a logged
/// generic failure.
pub fn from_error(err: CurbwatchError) -> Response {
    match &err {
        CurbwatchError::Validation { field, message } => failure(
            StatusCode::BAD_REQUEST,
            "validation failed",
            vec![FieldError {
                field: field.clone(),
                message: message.clone(),
            }],
        ),
        CurbwatchError::ReportNotFound(_) | CurbwatchError::IssueNotFound(_) => {
            failure(StatusCode::NOT_FOUND, &err.to_string(), Vec::new())
        }
        CurbwatchError::ReportNotPending(_) | CurbwatchError::InvalidTransition { .. } => {
            failure(StatusCode::CONFLICT, &err.to_string(), Vec::new())
        }
        CurbwatchError::Conflict(_) => failure(
            StatusCode::CONFLICT,
            "write conflict, please retry",
            Vec::new(),
        ),
        CurbwatchError::Database(_) | CurbwatchError::Config(_) | CurbwatchError::Anyhow(_) => {
            error!(error = %err, "Unexpected error handling request");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error",
                Vec::new(),
            )
        }
    }
}
