//! The OCR service: one explicitly constructed instance per process.
//!
//! [`OcrService`] owns every collaborator a request needs (page source,
//! extraction backend, optional summariser, usage store) and is shared by
//! reference with request handlers. Nothing here is global.
//!
//! ## Request flow
//!
//! ```text
//! quota ─▶ load/validate ─▶ TempPdf ─▶ rasterize ─▶ encode ─▶ batch
//!       ─▶ dispatch ─▶ assemble ─▶ (record usage) ─▶ DocumentText
//! ```
//!
//! Quota and validation failures are returned before a temp file exists.
//! The temp file is owned by a local [`TempPdf`], so it is removed on every
//! exit path, including cancellation of the request future.

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::extractor::{build_extractor, build_summarizer, Summarizer, TextExtractor};
use crate::pipeline::assemble::assemble;
use crate::pipeline::batch::create_batches;
use crate::pipeline::dispatch::{dispatch_batches, DispatchSettings};
use crate::pipeline::encode::encode_pages;
use crate::pipeline::input::{self, TempPdf, UploadInput};
use crate::pipeline::json::{extract_json, StructuredRecord};
use crate::pipeline::render::{rasterize, PageSource, PdfiumPageSource};
use crate::pipeline::retry::{retry_with_backoff, RetryError};
use crate::usage::{InMemoryUsageStore, QuotaGate, UsageRecord, UsageStore};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Owner used when a request does not name one.
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Full text of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentText {
    pub text: String,
    pub filename: String,
    pub page_count: usize,
    pub batch_count: usize,
}

/// Document text plus whatever JSON could be pulled out of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredOutput {
    pub text: String,
    /// Parsed record, or `null` when none was found.
    pub data: Option<Value>,
    /// `"No JSON found in the text."` when `data` is `null`.
    pub message: Option<String>,
}

impl StructuredOutput {
    fn new(text: String, record: StructuredRecord) -> Self {
        let message = record.message().map(str::to_string);
        Self {
            text,
            data: record.into_value(),
            message,
        }
    }
}

/// Runs the OCR pipeline for one request at a time; share it behind an `Arc`.
pub struct OcrService {
    config: OcrConfig,
    pages: Arc<dyn PageSource>,
    extractor: Arc<dyn TextExtractor>,
    summarizer: Option<Arc<dyn Summarizer>>,
    usage: Arc<dyn UsageStore>,
    quota: QuotaGate,
}

impl std::fmt::Debug for OcrService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrService")
            .field("config", &self.config)
            .field("extractor", &self.extractor.name())
            .field("summarizer", &self.summarizer.is_some())
            .finish()
    }
}

impl OcrService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        config: OcrConfig,
        pages: Arc<dyn PageSource>,
        extractor: Arc<dyn TextExtractor>,
        usage: Arc<dyn UsageStore>,
    ) -> Self {
        Self {
            config,
            pages,
            extractor,
            summarizer: None,
            usage,
            quota: QuotaGate::new(),
        }
    }

    /// Use `summarizer` for structured extraction.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Production wiring: pdfium pages, the configured backend, an LLM
    /// summariser when a provider can be resolved, and in-memory usage.
    pub fn from_config(config: OcrConfig) -> Result<Self, OcrError> {
        let pages = Arc::new(PdfiumPageSource::new(
            config.pdfium_library.clone(),
            config.max_rendered_pixels,
        ));
        let extractor = build_extractor(&config)?;
        let summarizer = match build_summarizer(&config) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Structured extraction falls back to raw text: {}", e);
                None
            }
        };
        info!(
            "OCR service ready: backend={}, batch_size={}, render_workers={}",
            extractor.name(),
            config.batch_size,
            config.render_workers
        );

        let mut service = Self::new(config, pages, extractor, Arc::new(InMemoryUsageStore::new()));
        service.summarizer = summarizer;
        Ok(service)
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    pub fn usage_store(&self) -> &Arc<dyn UsageStore> {
        &self.usage
    }

    /// OCR the whole document and return its text in page order.
    pub async fn ocr(&self, input: UploadInput, owner: &str) -> Result<DocumentText, OcrError> {
        let start = Instant::now();

        // Held until usage is recorded so in-flight requests count.
        let _slot = self
            .quota
            .reserve(
                self.usage.as_ref(),
                owner,
                self.config.max_extractions_per_owner,
            )
            .await?;

        let payload = input::load(
            input,
            self.config.download_timeout_secs,
            self.config.max_upload_bytes,
        )
        .await?;

        let temp = TempPdf::write(&payload.bytes).await?;
        let images = rasterize(
            Arc::clone(&self.pages),
            temp.path(),
            self.config.zoom,
            self.config.render_workers,
        )
        .await?;
        let page_count = images.len();

        let encoded = encode_pages(&images)?;
        drop(images);

        let batches = create_batches(encoded, self.config.batch_size());
        let settings = DispatchSettings::from_config(&self.config);
        let texts = dispatch_batches(
            self.extractor.as_ref(),
            &batches,
            &settings,
            self.config.progress_callback.as_ref(),
        )
        .await?;
        drop(temp);

        let text = assemble(&texts)?;

        self.usage
            .record(UsageRecord {
                filename: payload.filename.clone(),
                page_count,
                owner: owner.to_string(),
            })
            .await?;

        info!(
            "OCR of '{}' done: {} pages, {} batches, {} chars in {:?}",
            payload.filename,
            page_count,
            batches.len(),
            text.len(),
            start.elapsed()
        );

        Ok(DocumentText {
            text,
            filename: payload.filename,
            page_count,
            batch_count: batches.len(),
        })
    }

    /// OCR the document, then extract a JSON record from it.
    ///
    /// With a summariser the record comes from its reply; without one the
    /// document text itself is scanned.
    pub async fn extract_structured(
        &self,
        input: UploadInput,
        owner: &str,
    ) -> Result<StructuredOutput, OcrError> {
        let document = self.ocr(input, owner).await?;
        let record = self.structure(&document.text).await?;
        if !record.is_found() {
            info!("No structured record in '{}'", document.filename);
        }
        Ok(StructuredOutput::new(document.text, record))
    }

    /// Turn document text into a [`StructuredRecord`].
    pub async fn structure(&self, text: &str) -> Result<StructuredRecord, OcrError> {
        let Some(summarizer) = &self.summarizer else {
            debug!("No summariser configured, scanning document text");
            return Ok(extract_json(text));
        };

        let policy = self.config.retry_policy();
        let summarizer = Arc::clone(summarizer);
        let text: Arc<str> = Arc::from(text);
        let reply = retry_with_backoff(&policy, "summary", move || {
            let summarizer = Arc::clone(&summarizer);
            let text = Arc::clone(&text);
            async move { summarizer.summarize(&text).await }
        })
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { attempts, last } => {
                OcrError::SummaryRetryExhausted { attempts, last }
            }
            RetryError::Permanent(source) => OcrError::SummaryFailed { source },
        })?;
        debug!("Summary reply: {} chars", reply.len());
        Ok(extract_json(&reply))
    }
}
