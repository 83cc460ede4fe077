//! Request handlers, one module per resource.

pub mod farmer_data;
pub mod health;
pub mod reference;
pub mod users;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::Path;
use axum::Json;
use serde_json::Value;

use super::error::ApiError;

/// Unwraps a JSON body, reporting malformed input as `400`.
fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Resolves an `{id}` segment. An id that is not an integer names no record.
fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id).map_err(|rejection| {
        tracing::debug!(%rejection, "Unresolvable path id");
        ApiError::NotFound
    })
}
