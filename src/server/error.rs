//! Error type for the HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::FieldErrors;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, unknown or inactive credentials.
    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("Not found.")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// One item of a sync batch failed; the whole batch was rolled back.
    #[error("sync item {index} failed: {errors}")]
    SyncItem { index: usize, errors: FieldErrors },

    #[error("{0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::SyncItem { .. } | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(errors) => json!(errors),
            ApiError::SyncItem { index, errors } => json!({ "item": index, "errors": errors }),
            ApiError::Database(e) => {
                tracing::error!("Store error: {}", e);
                json!({ "detail": "A server error occurred." })
            }
            other => json!({ "detail": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_detail_bodies() {
        let (status, body) = render(ApiError::Forbidden).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body,
            json!({"detail": "You do not have permission to perform this action."})
        );

        let (status, body) = render(ApiError::NotFound).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Not found."}));
    }

    #[tokio::test]
    async fn test_validation_body_is_field_map() {
        let (status, body) = render(FieldErrors::single("name", "This field is required.").into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"name": ["This field is required."]}));
    }

    #[tokio::test]
    async fn test_sync_item_body() {
        let (status, body) = render(ApiError::SyncItem {
            index: 2,
            errors: FieldErrors::single("crop", "This field is required."),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"item": 2, "errors": {"crop": ["This field is required."]}})
        );
    }

    #[tokio::test]
    async fn test_database_error_is_opaque() {
        let (status, body) = render(ApiError::Database(sqlx::Error::RowNotFound)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"detail": "A server error occurred."}));
    }
}
