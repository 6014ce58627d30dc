//! HTTP error mapping

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::allocation::AllocationError;
use crate::storage::StoreError;

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    /// Stable machine-readable code
    pub code: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.into(),
            error: message.into(),
        }
    }
}

/// Failure of an HTTP handler
#[derive(Debug)]
pub enum ApiError {
    /// Request could not be parsed (bad id, malformed body)
    BadRequest(String),
    /// Body parsed but a field is missing or malformed
    Validation(String),
    /// Allocation core failure
    Allocation(AllocationError),
    /// Entity store failure
    Store(StoreError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Self::Allocation(err) => allocation_parts(err),
            Self::Store(err) => store_parts(err),
        }
    }
}

fn allocation_parts(err: &AllocationError) -> (StatusCode, &'static str, String) {
    let msg = err.to_string();
    match err {
        AllocationError::Validation(detail) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", detail.clone())
        }
        AllocationError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
        AllocationError::Conflict { .. } => (StatusCode::CONFLICT, "ROOM_CONFLICT", msg),
        AllocationError::InsufficientResources { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_RESOURCES", msg)
        }
        AllocationError::NoAllocationCreated { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "NO_ALLOCATION_CREATED", msg)
        }
        AllocationError::Storage(inner) => store_parts(inner),
    }
}

fn store_parts(err: &StoreError) -> (StatusCode, &'static str, String) {
    let msg = err.to_string();
    match err {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
        StoreError::RoomConflict { .. } => (StatusCode::CONFLICT, "ROOM_CONFLICT", msg),
        StoreError::Duplicate { .. } => (StatusCode::CONFLICT, "DUPLICATE", msg),
        StoreError::ForeignKey(_) => (StatusCode::CONFLICT, "FOREIGN_KEY", msg),
        _ => {
            tracing::error!(error = %err, "Storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                "Internal storage error".to_string(),
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

impl From<AllocationError> for ApiError {
    fn from(err: AllocationError) -> Self {
        Self::Allocation(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Parse a path identifier
pub fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("Invalid id: {raw}")))
}
