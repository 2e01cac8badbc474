use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;

use advocate_core::error::CoreError;

/// Carries the session a failure occurred in, when one had already been
/// opened, so the error body can name it per the documented error shape.
pub struct ApiError {
    pub error: CoreError,
    pub session_id: Option<String>,
}

impl ApiError {
    pub fn with_session(error: CoreError, session_id: Option<String>) -> Self {
        Self { error, session_id }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self { error: e, session_id: None }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self { error: CoreError::Internal(e), session_id: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            CoreError::ClientInvalid(_) => StatusCode::BAD_REQUEST,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.error.to_string(),
            "session_id": self.session_id,
            "timestamp": Utc::now().to_rfc3339(),
        }));
        (status, body).into_response()
    }
}
