//! HTTP mapping of contract errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use jobscope_core::Error;

/// Wrapper giving contract errors an HTTP representation.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            Error::Transport(_) | Error::Decode(_) => StatusCode::BAD_GATEWAY,
            Error::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            Error::AlreadySubscribed => StatusCode::CONFLICT,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = %status, "Request failed");
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
