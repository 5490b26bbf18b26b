//! JSON error responses.

use crate::error::OcrError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// An [`OcrError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub OcrError);

/// Body sent with every error status.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: &'static str,
    pub message: String,
}

impl From<OcrError> for ApiError {
    fn from(err: OcrError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            tracing::info!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        let body = ErrorBody {
            status: status.as_u16(),
            error: self.0.category(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_becomes_forbidden() {
        let response = ApiError(OcrError::QuotaExceeded {
            owner: "acme".into(),
            used: 3,
            limit: 3,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn request_timeout_becomes_gateway_timeout() {
        let response = ApiError(OcrError::RequestTimeout { secs: 30 }).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
