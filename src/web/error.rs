//! API error type and its HTTP status mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::DbError;
use crate::validation::ValidationError;

/// Errors surfaced by request handlers.
///
/// NotFound and Validation map to client errors; everything else from the
/// store is a server error and is logged, never silently swallowed.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(DbError),
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => ApiError::NotFound,
            other => ApiError::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, errors) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, vec!["Not found".to_string()]),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, vec!["Invalid or missing API token".to_string()]),
            ApiError::Validation(err) => (StatusCode::BAD_REQUEST, err.errors),
            ApiError::Store(err) => {
                tracing::error!("store failure: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, vec!["Internal server error".to_string()])
            }
        };
        (status, Json(json!({ "errors": errors }))).into_response()
    }
}
