//! API error types with HTTP response mapping.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ValidationError};
use order_store::StoreError;
use queries::QueryError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The request conflicts with stored state.
    Conflict(String),
    /// No caller identity was presented.
    Unauthorized(String),
    /// The caller may not use this route.
    Forbidden(String),
    /// An uploaded file exceeds the size limit.
    PayloadTooLarge(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Storage error outside the domain service (catalog writes).
    Store(StoreError),
    /// Read-side query error.
    Query(QueryError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Query(QueryError::Store(err)) => store_error_to_response(err),
            ApiError::Internal(msg) => internal(msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn internal(msg: String) -> (StatusCode, String) {
    tracing::error!(error = %msg, "internal server error");
    (StatusCode::INTERNAL_SERVER_ERROR, msg)
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match err {
        DomainError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        DomainError::DuplicateTransactionId(_)
        | DomainError::InvalidTransition { .. }
        | DomainError::EmailNotRetryable(_) => (StatusCode::CONFLICT, err.to_string()),
        DomainError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        DomainError::Store(e) => store_error_to_response(e),
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match err {
        StoreError::DuplicateTransactionId(_) | StoreError::DuplicateCatalogItem(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        StoreError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        StoreError::PaymentQrLimit(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        _ => internal(err.to_string()),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Domain(DomainError::Validation(err))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::Query(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}
