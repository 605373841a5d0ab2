//! Maps [`CoreError`] onto the HTTP status code each failure kind gets.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dialog_core::CoreError;
use serde_json::json;

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Login => StatusCode::UNAUTHORIZED,
            CoreError::InvalidToken => StatusCode::FORBIDDEN,
            CoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CoreError::Store(_) | CoreError::Grammar { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(error = %self.0, %status, "request failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
