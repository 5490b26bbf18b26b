//! # pdfscribe
//!
//! OCR backend for PDF documents: rasterise every page, send the page images
//! to a vision language model (or Tesseract) in concurrent batches, and
//! reassemble the text in page order. Optionally summarise the text into a
//! JSON record, which is how invoices and bills are turned into structured
//! bookkeeping data.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF (upload or URL)
//!  │
//!  ├─ 1. Input     validate, stage in a temp file (removed on drop)
//!  ├─ 2. Render    rasterise pages in parallel via pdfium (spawn_blocking)
//!  ├─ 3. Encode    image bytes → base64 data URL
//!  ├─ 4. Batch     fixed-size groups of pages, order preserved
//!  ├─ 5. Dispatch  one concurrent extraction call per batch, retried with
//!  │               exponential backoff on rate limits and timeouts
//!  ├─ 6. Assemble  batch texts joined with "\n\n"
//!  └─ 7. JSON      widest {…} span of the summary reply, or "not found"
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfscribe::{OcrConfig, OcrService, UploadInput, UploadedFile};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / ...
//!     let service = OcrService::from_config(OcrConfig::default())?;
//!     let file = UploadedFile::from_path(Path::new("invoice.pdf")).await?;
//!     let output = service
//!         .extract_structured(UploadInput::File(file), "anonymous")
//!         .await?;
//!     println!("{}", output.text);
//!     println!("{:?}", output.data);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP surface (`POST /ocr`, `POST /extract`) |
//! | `cli`    | on      | the `pdfscribe` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable both when using only the library:
//! ```toml
//! pdfscribe = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extractor;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod service;
pub mod usage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Backend, OcrConfig, OcrConfigBuilder};
pub use error::{ExtractError, OcrError};
pub use extractor::{Summarizer, TextExtractor};
pub use pipeline::batch::Batch;
pub use pipeline::encode::EncodedPage;
pub use pipeline::input::{UploadInput, UploadedFile};
pub use pipeline::json::{extract_json, StructuredRecord};
pub use pipeline::render::{PageImage, PageSource, PdfiumPageSource};
pub use pipeline::retry::{retry_with_backoff, IsTransient, RetryError, RetryPolicy};
pub use progress::{DispatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use service::{DocumentText, OcrService, StructuredOutput};
pub use usage::{InMemoryUsageStore, QuotaGate, UsageRecord, UsageStore};
