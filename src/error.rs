//! Error types for the pdfscribe library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`OcrError`]: **request-level**, the request cannot produce a document
//!   (bad input, quota, a page failed to render, a batch failed for good).
//!   Every variant maps to an HTTP-style status via [`OcrError::status_code`]
//!   so callers can tell retry-worthy conditions (429/504) from permanent
//!   ones (400/403/413) and internal failures (500/502).
//!
//! * [`ExtractError`]: **call-level**, one extraction call against the
//!   backend failed. Rate limiting and timeouts are transient and are retried
//!   by [`crate::pipeline::retry`]; everything else surfaces immediately.
//!
//! A missing JSON payload is *not* an error; see
//! [`crate::pipeline::json::StructuredRecord`].

use crate::pipeline::retry::IsTransient;
use std::path::PathBuf;
use thiserror::Error;

/// All request-level errors returned by the pdfscribe library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Missing, conflicting or malformed input (no file and no URL, both,
    /// wrong content type, empty payload, not a PDF).
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The upload or download is bigger than the configured cap.
    #[error("Upload too large: {detail}")]
    PayloadTooLarge { detail: String },

    /// The URL was accepted but the download failed or returned a non-PDF.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The URL download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The owner already used up their extraction allowance.
    #[error("Extraction quota exceeded for '{owner}': {used}/{limit} extractions used")]
    QuotaExceeded {
        owner: String,
        used: u64,
        limit: u64,
    },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// No usable libpdfium could be bound.
    #[error("Failed to bind to pdfium library: {0}")]
    PdfiumUnavailable(String),

    /// The document could not be opened at all.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// A single page failed to rasterise; the whole document is abandoned.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Page image bytes were not a recognisable image.
    #[error("Image encoding failed for page {page}: {detail}")]
    EncodeFailed { page: usize, detail: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The backend answered but returned no text for a batch.
    #[error("No text extracted from OCR for batch {batch}")]
    EmptyExtraction { batch: usize },

    /// A transient failure persisted past the retry budget.
    #[error("Batch {batch}: giving up after {attempts} attempts: {last}")]
    RetryExhausted {
        batch: usize,
        attempts: u32,
        #[source]
        last: ExtractError,
    },

    /// The backend failed with a non-transient error.
    #[error("Batch {batch}: OCR processing failed: {source}")]
    Upstream {
        batch: usize,
        #[source]
        source: ExtractError,
    },

    /// The structured-summary call failed with a non-transient error.
    #[error("Structured summary failed: {source}")]
    SummaryFailed {
        #[source]
        source: ExtractError,
    },

    /// The structured-summary call kept failing transiently past the retry
    /// budget.
    #[error("Structured summary: giving up after {attempts} attempts: {last}")]
    SummaryRetryExhausted {
        attempts: u32,
        #[source]
        last: ExtractError,
    },

    /// Every batch succeeded but the assembled document is empty.
    #[error("OCR completed but no text was extracted")]
    NoTextExtracted,

    // ── Config errors ─────────────────────────────────────────────────────
    /// The configured backend could not be initialised (missing API key etc.).
    #[error("Extraction backend '{backend}' is not configured: {hint}")]
    ProviderNotConfigured { backend: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The whole request ran past the server's request timeout.
    #[error("Request timed out after {secs}s")]
    RequestTimeout { secs: u64 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// HTTP-style status code reported to callers for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            OcrError::InvalidInput { .. } | OcrError::DownloadFailed { .. } => 400,
            OcrError::InvalidConfig(_) => 422,
            OcrError::QuotaExceeded { .. } => 403,
            OcrError::PayloadTooLarge { .. } => 413,
            OcrError::DownloadTimeout { .. } | OcrError::RequestTimeout { .. } => 504,
            OcrError::RetryExhausted { last, .. }
            | OcrError::SummaryRetryExhausted { last, .. } => match last {
                ExtractError::Timeout { .. } => 504,
                _ => 429,
            },
            OcrError::Upstream { .. } | OcrError::SummaryFailed { .. } => 502,
            OcrError::PdfiumUnavailable(_)
            | OcrError::CorruptPdf { .. }
            | OcrError::RenderFailed { .. }
            | OcrError::EncodeFailed { .. }
            | OcrError::EmptyExtraction { .. }
            | OcrError::NoTextExtracted
            | OcrError::ProviderNotConfigured { .. }
            | OcrError::Internal(_) => 500,
        }
    }

    /// Short machine-readable category name.
    pub fn category(&self) -> &'static str {
        match self {
            OcrError::InvalidInput { .. } => "invalid_input",
            OcrError::PayloadTooLarge { .. } => "payload_too_large",
            OcrError::DownloadFailed { .. } => "download_failed",
            OcrError::DownloadTimeout { .. } => "download_timeout",
            OcrError::QuotaExceeded { .. } => "quota_exceeded",
            OcrError::PdfiumUnavailable(_) => "pdfium_unavailable",
            OcrError::CorruptPdf { .. } => "corrupt_pdf",
            OcrError::RenderFailed { .. } => "render_failed",
            OcrError::EncodeFailed { .. } => "encode_failed",
            OcrError::EmptyExtraction { .. } => "empty_extraction",
            OcrError::RetryExhausted { .. } => "retry_exhausted",
            OcrError::Upstream { .. } => "upstream_failure",
            OcrError::SummaryFailed { .. } => "summary_failed",
            OcrError::SummaryRetryExhausted { .. } => "summary_retry_exhausted",
            OcrError::NoTextExtracted => "no_text_extracted",
            OcrError::ProviderNotConfigured { .. } => "provider_not_configured",
            OcrError::InvalidConfig(_) => "invalid_config",
            OcrError::RequestTimeout { .. } => "request_timeout",
            OcrError::Internal(_) => "internal",
        }
    }

    /// Shorthand for [`OcrError::InvalidInput`].
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        OcrError::InvalidInput {
            reason: reason.into(),
        }
    }
}

/// A failure of one extraction call against the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// The backend signalled rate limiting (HTTP 429 or equivalent).
    #[error("Rate limit exceeded: {detail}")]
    RateLimited { detail: String },

    /// The call did not complete within the configured timeout.
    #[error("Timeout after {secs}s while communicating with OCR service")]
    Timeout { secs: u64 },

    /// The backend returned a response with no text content.
    #[error("No text extracted from OCR")]
    EmptyResponse,

    /// Any other backend failure (bad request, auth, malformed response).
    #[error("OCR backend error: {detail}")]
    Api { detail: String },
}

impl IsTransient for ExtractError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            ExtractError::RateLimited { .. } | ExtractError::Timeout { .. }
        )
    }
}
