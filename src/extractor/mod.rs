//! Text-extraction backends.
//!
//! Every backend implements [`TextExtractor`]: it turns one [`Batch`] of page
//! images into text. The service picks a backend once, at construction, from
//! [`OcrConfig::backend`], and never branches on the backend afterwards.
//!
//! | Backend | Module | Transport |
//! |---|---|---|
//! | [`Backend::Vision`] | [`vision`] | edgequake-llm chat completion with image parts |
//! | [`Backend::Tesseract`] | [`tesseract`] | `tesseract` child process, one page at a time |
//!
//! Retry, timeouts and empty-response checks live in the dispatcher, not
//! here; a backend reports each failure once as an [`ExtractError`].

pub mod tesseract;
pub mod vision;

use crate::config::{Backend, OcrConfig};
use crate::error::{ExtractError, OcrError};
use crate::pipeline::batch::Batch;
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, LlmError, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

pub use tesseract::TesseractExtractor;
pub use vision::{VisionExtractor, VisionSummarizer};

/// Extracts text from one batch of page images.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Extract the text of every page in `batch`, in page order.
    async fn extract_batch(&self, batch: &Batch) -> Result<String, ExtractError>;
}

/// Condenses document text into a short JSON reply.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, ExtractError>;
}

/// Build the extractor selected by `config.backend`.
pub fn build_extractor(config: &OcrConfig) -> Result<Arc<dyn TextExtractor>, OcrError> {
    match config.backend {
        Backend::Vision => {
            let provider = resolve_provider(config, &config.model)?;
            Ok(Arc::new(VisionExtractor::new(provider, config)))
        }
        Backend::Tesseract => Ok(Arc::new(TesseractExtractor::new(
            &config.tesseract_command,
            &config.tesseract_lang,
        ))),
    }
}

/// Build the summariser used for structured extraction.
///
/// Summaries always go through a language model, whichever OCR backend is
/// selected.
pub fn build_summarizer(config: &OcrConfig) -> Result<Arc<dyn Summarizer>, OcrError> {
    let provider = resolve_provider(config, &config.summary_model)?;
    Ok(Arc::new(VisionSummarizer::new(provider, config)))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, OcrError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        OcrError::ProviderNotConfigured {
            backend: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider for `model`, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is. Its own model
///    wins over `model`.
/// 2. **Named provider** (`config.provider_name`) with `model`.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`. The
///    provider is taken from the environment; `model` still applies so the
///    summary model stays distinct from the OCR model.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. Full auto-detection via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &OcrConfig, model: &str) -> Result<Arc<dyn LLMProvider>, OcrError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            debug!("Using provider '{}' from EDGEQUAKE_LLM_PROVIDER", prov);
            return create_provider(&prov, model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| OcrError::ProviderNotConfigured {
            backend: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Map a provider error onto the retry taxonomy.
///
/// Only rate limiting and timeouts are transient. Variants that carry a free
/// text message from the wire fall back to [`classify_provider_error`].
pub(crate) fn classify_llm_error(err: &LlmError, timeout_secs: u64) -> ExtractError {
    match err {
        LlmError::RateLimited(_) => ExtractError::RateLimited {
            detail: err.to_string(),
        },
        LlmError::Timeout => ExtractError::Timeout { secs: timeout_secs },
        LlmError::ApiError(_)
        | LlmError::ProviderError(_)
        | LlmError::NetworkError(_)
        | LlmError::Unknown(_) => classify_provider_error(&err.to_string(), timeout_secs),
        _ => ExtractError::Api {
            detail: err.to_string(),
        },
    }
}

static RATE_LIMIT_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:429|rate[ _-]?limit(?:ed)?|ratelimit|too many requests)\b").unwrap()
});
static TIMEOUT_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:timed out|timeout)\b").unwrap());

/// Classify an untyped provider message. `429` only counts as a standalone
/// number, so token counts such as `142946` are not mistaken for it.
pub(crate) fn classify_provider_error(message: &str, timeout_secs: u64) -> ExtractError {
    if RATE_LIMIT_TEXT.is_match(message) {
        ExtractError::RateLimited {
            detail: message.to_string(),
        }
    } else if TIMEOUT_TEXT.is_match(message) {
        ExtractError::Timeout { secs: timeout_secs }
    } else {
        ExtractError::Api {
            detail: message.to_string(),
        }
    }
}
