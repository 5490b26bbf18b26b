//! Configuration types for the OCR pipeline.
//!
//! All pipeline behaviour is controlled through [`OcrConfig`], built via its
//! [`OcrConfigBuilder`]. The config is constructed once at process start and
//! shared by reference with every request, so it must stay cheap to clone.

use crate::error::OcrError;
use crate::pipeline::retry::RetryPolicy;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the OCR pipeline.
///
/// Built via [`OcrConfig::builder()`] or using [`OcrConfig::default()`].
///
/// # Example
/// ```rust
/// use pdfscribe::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .batch_size(2)
///     .render_workers(8)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Scale factor applied when rasterising each page. Range: 0.5–8.0. Default: 2.0.
    ///
    /// A zoom of 2 renders a US-letter page at roughly 1224 × 1584 px, which
    /// keeps small print on invoices legible to the model.
    pub zoom: f32,

    /// Maximum rendered bitmap edge in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Number of pages rasterised in parallel. Default: 4.
    pub render_workers: usize,

    /// Explicit path to libpdfium. If None, the system library is used.
    pub pdfium_library: Option<PathBuf>,

    /// Pages per extraction request. Default: 1.
    ///
    /// Larger batches mean fewer requests but bigger payloads, and a higher
    /// chance of exceeding the backend's token or payload limits.
    pub batch_size: usize,

    /// Maximum in-flight extraction calls. Default: None (one per batch).
    pub dispatch_concurrency: Option<usize>,

    /// Total attempts per batch, including the first. Default: 10.
    pub max_retries: u32,

    /// Backoff base delay in milliseconds. Default: 1000.
    pub base_delay_ms: u64,

    /// Backoff delay cap in milliseconds. Default: 120000.
    pub max_delay_ms: u64,

    /// Per extraction call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Which extraction backend to use. Default: [`Backend::Vision`].
    pub backend: Backend,

    /// Vision model identifier. Default: "gpt-4o".
    pub model: String,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for extraction calls. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per extraction call. Default: 4000.
    pub max_tokens: usize,

    /// Custom OCR system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Custom OCR user instruction. If None, uses the built-in default.
    pub user_prompt: Option<String>,

    /// Model used for structured summaries. Default: "gpt-4o-mini".
    pub summary_model: String,

    /// Length hint (characters) given to the summary prompt. Default: 500.
    pub summary_char_limit: usize,

    /// Tesseract executable for [`Backend::Tesseract`]. Default: "tesseract".
    pub tesseract_command: String,

    /// Tesseract language pack. Default: "eng".
    pub tesseract_lang: String,

    /// Download timeout for URL inputs in seconds. Default: 15.
    pub download_timeout_secs: u64,

    /// Maximum accepted PDF size in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Maximum successful extractions per owner. Default: None (unlimited).
    pub max_extractions_per_owner: Option<u64>,

    /// Optional per-batch progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            zoom: 2.0,
            max_rendered_pixels: 4000,
            render_workers: 4,
            pdfium_library: None,
            batch_size: 1,
            dispatch_concurrency: None,
            max_retries: 10,
            base_delay_ms: 1000,
            max_delay_ms: 120_000,
            api_timeout_secs: 60,
            backend: Backend::default(),
            model: "gpt-4o".to_string(),
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4000,
            system_prompt: None,
            user_prompt: None,
            summary_model: "gpt-4o-mini".to_string(),
            summary_char_limit: 500,
            tesseract_command: "tesseract".to_string(),
            tesseract_lang: "eng".to_string(),
            download_timeout_secs: 15,
            max_upload_bytes: 50 * 1024 * 1024,
            max_extractions_per_owner: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("zoom", &self.zoom)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("render_workers", &self.render_workers)
            .field("pdfium_library", &self.pdfium_library)
            .field("batch_size", &self.batch_size)
            .field("dispatch_concurrency", &self.dispatch_concurrency)
            .field("max_retries", &self.max_retries)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("summary_model", &self.summary_model)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("max_extractions_per_owner", &self.max_extractions_per_owner)
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Retry policy derived from the backoff fields.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    /// Batch size as a non-zero count.
    pub fn batch_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.batch_size).unwrap_or(NonZeroUsize::MIN)
    }

    /// Per-call timeout as a `Duration`.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`OcrConfig`].
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl fmt::Debug for OcrConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl OcrConfigBuilder {
    pub fn zoom(mut self, zoom: f32) -> Self {
        self.config.zoom = zoom;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn render_workers(mut self, n: usize) -> Self {
        self.config.render_workers = n;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    pub fn dispatch_concurrency(mut self, n: usize) -> Self {
        self.config.dispatch_concurrency = Some(n);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.config.base_delay_ms = ms;
        self
    }

    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.config.max_delay_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn user_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.user_prompt = Some(prompt.into());
        self
    }

    pub fn summary_model(mut self, model: impl Into<String>) -> Self {
        self.config.summary_model = model.into();
        self
    }

    pub fn summary_char_limit(mut self, n: usize) -> Self {
        self.config.summary_char_limit = n;
        self
    }

    pub fn tesseract_command(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_command = cmd.into();
        self
    }

    pub fn tesseract_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.tesseract_lang = lang.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn max_extractions_per_owner(mut self, n: u64) -> Self {
        self.config.max_extractions_per_owner = Some(n);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if !(0.5..=8.0).contains(&c.zoom) {
            return Err(OcrError::InvalidConfig(format!(
                "zoom must be 0.5–8.0, got {}",
                c.zoom
            )));
        }
        if c.render_workers == 0 {
            return Err(OcrError::InvalidConfig(
                "render_workers must be ≥ 1".into(),
            ));
        }
        if c.batch_size == 0 {
            return Err(OcrError::InvalidConfig("batch_size must be ≥ 1".into()));
        }
        if c.dispatch_concurrency == Some(0) {
            return Err(OcrError::InvalidConfig(
                "dispatch_concurrency must be ≥ 1 when set".into(),
            ));
        }
        if c.max_retries == 0 {
            return Err(OcrError::InvalidConfig("max_retries must be ≥ 1".into()));
        }
        if c.max_delay_ms < c.base_delay_ms {
            return Err(OcrError::InvalidConfig(format!(
                "max_delay_ms ({}) must not be below base_delay_ms ({})",
                c.max_delay_ms, c.base_delay_ms
            )));
        }
        if c.max_upload_bytes == 0 {
            return Err(OcrError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Text-extraction backend.
///
/// Both backends implement [`crate::extractor::TextExtractor`]; the service
/// never branches on the backend after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Vision language model via edgequake-llm. (default)
    #[default]
    Vision,
    /// Local Tesseract OCR engine invoked as an external process.
    Tesseract,
}

impl std::str::FromStr for Backend {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vision" | "llm" | "openai" => Ok(Backend::Vision),
            "tesseract" => Ok(Backend::Tesseract),
            other => Err(OcrError::InvalidConfig(format!(
                "unknown backend '{other}' (expected 'vision' or 'tesseract')"
            ))),
        }
    }
}
