//! API error type and its JSON rendering

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::inventory::{CommitError, ImportError, RowError, Violation};
use crate::service::ServiceError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// Batch breaks capacity rules; nothing was written
    Validation(Vec<Violation>),
    /// A bulk commit is already running
    Conflict(String),
    MissingHeaders(Vec<String>),
    RowErrors(Vec<RowError>),
    Unavailable(String),
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Commit(CommitError::Validation(violations)) => {
                ApiError::Validation(violations)
            }
            ServiceError::Commit(e @ CommitError::CommitInProgress) => {
                ApiError::Conflict(e.to_string())
            }
            ServiceError::Import(ImportError::Malformed(reason)) => {
                ApiError::BadRequest(format!("Unreadable CSV: {}", reason))
            }
            ServiceError::Import(ImportError::MissingHeaders(missing)) => {
                ApiError::MissingHeaders(missing)
            }
            ServiceError::Import(ImportError::Rows(rows)) => ApiError::RowErrors(rows),
            ServiceError::Store(StoreError::Unavailable(reason)) => ApiError::Unavailable(reason),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Validation(violations) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": format!("Batch has {} violation(s); nothing was written", violations.len()),
                    "violations": violations,
                }),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ApiError::MissingHeaders(missing) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": format!("Missing required column(s): {}", missing.join(", ")),
                    "missing_headers": missing,
                }),
            ),
            ApiError::RowErrors(rows) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": format!("{} row(s) could not be imported", rows.len()),
                    "row_errors": rows,
                }),
            ),
            ApiError::Unavailable(msg) => {
                error!("Store unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg }))
            }
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
        };

        (status, Json(body)).into_response()
    }
}
