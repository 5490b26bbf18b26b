//! Route handlers.
//!
//! | Method | Path | Body | Response |
//! |---|---|---|---|
//! | POST | `/ocr` | multipart `file` and/or `url` | `{"text"}` |
//! | POST | `/extract` | multipart `file` and/or `url` | `{"text","data","message"}` |
//! | GET | `/health` | none | `{"status":"ok"}` |
//!
//! The caller is identified by the `x-owner-id` header for quota purposes.

use crate::error::OcrError;
use crate::pipeline::input::{UploadInput, UploadedFile};
use crate::server::error::ApiError;
use crate::service::{OcrService, StructuredOutput, ANONYMOUS_OWNER};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Header naming the caller for usage accounting.
pub const OWNER_HEADER: &str = "x-owner-id";

// Room for multipart boundaries and the `url` field on top of the PDF itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
struct AppState {
    service: Arc<OcrService>,
    request_timeout: Duration,
}

/// `POST /ocr` response body.
#[derive(Debug, Serialize)]
pub struct OcrResponse {
    pub text: String,
}

/// Build the application router around a shared service.
pub fn router(service: Arc<OcrService>, request_timeout: Duration) -> Router {
    let body_limit = service
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);
    let state = AppState {
        service,
        request_timeout,
    };

    Router::new()
        .route("/ocr", post(ocr))
        .route("/extract", post(extract))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn ocr(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<OcrResponse>, ApiError> {
    let owner = owner_from(&headers);
    let input = read_upload(multipart).await?;
    let document = with_timeout(state.request_timeout, state.service.ocr(input, &owner)).await?;
    Ok(Json(OcrResponse {
        text: document.text,
    }))
}

async fn extract(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<StructuredOutput>, ApiError> {
    let owner = owner_from(&headers);
    let input = read_upload(multipart).await?;
    let output = with_timeout(
        state.request_timeout,
        state.service.extract_structured(input, &owner),
    )
    .await?;
    Ok(Json(output))
}

/// Run `fut` under the request timeout. On expiry the future is dropped,
/// which abandons every in-flight batch and removes the temp file.
async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, OcrError>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ApiError(OcrError::RequestTimeout {
            secs: limit.as_secs(),
        })),
    }
}

fn owner_from(headers: &HeaderMap) -> String {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_OWNER)
        .to_string()
}

/// Collect the `file` and `url` parts. Browsers send an empty `file` part
/// when nothing was picked; that counts as no file.
async fn read_upload(mut multipart: Multipart) -> Result<UploadInput, ApiError> {
    let bad = |e: MultipartError| ApiError(multipart_error(e));

    let mut file = None;
    let mut url = None;
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad)?;
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                file = Some(UploadedFile {
                    filename: if filename.is_empty() {
                        "upload.pdf".to_string()
                    } else {
                        filename
                    },
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("url") => url = Some(field.text().await.map_err(bad)?),
            _ => {}
        }
    }

    UploadInput::from_parts(file, url).map_err(ApiError::from)
}

/// Keep the status axum assigns: a body over the limit is 413, anything
/// else is a malformed request.
fn multipart_error(e: MultipartError) -> OcrError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        OcrError::PayloadTooLarge {
            detail: e.body_text(),
        }
    } else {
        OcrError::invalid_input(format!("malformed multipart body: {}", e.body_text()))
    }
}
