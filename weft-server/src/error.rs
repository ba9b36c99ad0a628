//! Error adapter: maps the core's `WeftError` taxonomy to HTTP
//! status codes and a `{error, statusCode}` body, the single place every
//! handler's error surfaces through.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use weft_core::WeftError;

pub struct ApiError(pub WeftError);

impl From<WeftError> for ApiError {
    fn from(e: WeftError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": self.0.to_string(),
            "statusCode": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
