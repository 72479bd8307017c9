//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::SagaError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
///
/// Every error body is `{ "error": <routing name>, "cause": <message> }`.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga step or execution error.
    Saga(SagaError),
    /// Record store error outside a saga step.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, name, cause) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NotFound", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest", msg),
            ApiError::Saga(err) => (saga_status(&err), err.error_name(), err.to_string()),
            ApiError::Store(err) => {
                let (status, name) = store_status(&err);
                (status, name, err.to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(error = name, %cause, "request failed");
        }

        let body = serde_json::json!({ "error": name, "cause": cause });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::BookNotFound(_) | SagaError::UserNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::OutOfStock { .. }
        | SagaError::InsufficientTotal { .. }
        | SagaError::DebitRejected { .. }
        | SagaError::InvalidTaskToken(_)
        | SagaError::ConcurrentUpdate(_)
        | SagaError::AlreadyStarted(_)
        | SagaError::InvalidState { .. } => StatusCode::CONFLICT,
        SagaError::NoCourierAvailable(_) | SagaError::Billing(_) => StatusCode::BAD_GATEWAY,
        SagaError::TaskTimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
        SagaError::StoreUnavailable(store_err) => store_status(store_err).0,
        SagaError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        SagaError::InvalidOrder(_)
        | SagaError::InvalidWorkItem(_)
        | SagaError::Serialization(_) => StatusCode::BAD_REQUEST,
    }
}

fn store_status(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::ConditionFailed { .. } => (StatusCode::CONFLICT, "ConditionFailed"),
        StoreError::InvalidRecord { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "InvalidRecord"),
        StoreError::InvalidConfig(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InvalidConfig"),
        StoreError::Unavailable(_) | StoreError::Database(_) | StoreError::Migration(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "StoreUnavailable")
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
