//! Vision-LLM backend: send page images to a multimodal chat model.
//!
//! ## Message Layout
//!
//! Each extraction request contains, in order:
//! 1. **System message**: the transcription rules (or the configured override)
//! 2. **User message**: the bookkeeping instruction (or the configured override)
//! 3. **User message**: the page label(s) with every page of the batch
//!    attached as a base64 image, in page order
//!
//! `detail: "high"` asks GPT-4-class models to tile the full image; with the
//! single low-detail tile fine print and small tables are lost.

use crate::config::OcrConfig;
use crate::error::ExtractError;
use crate::extractor::{classify_llm_error, Summarizer, TextExtractor};
use crate::pipeline::batch::Batch;
use crate::prompts::{batch_label, page_label, summary_prompt, DEFAULT_SYSTEM_PROMPT, DEFAULT_USER_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// [`TextExtractor`] backed by an edgequake-llm provider.
pub struct VisionExtractor {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    user_prompt: String,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl VisionExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &OcrConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            user_prompt: config
                .user_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.api_timeout_secs,
        }
    }

    fn build_messages(&self, batch: &Batch) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(&self.user_prompt),
            ChatMessage::user_with_images(request_label(batch), image_parts(batch)),
        ]
    }
}

/// `Page N:` for a single page; the multi-page instruction otherwise.
///
/// A multi-page batch carries one text part naming every page, followed by
/// all images. `ChatMessage::user_with_images` takes a single text and an
/// image list, so there is no label directly before each image. Images are
/// attached in the same order the label lists them, and the model is asked to
/// write the page numbers into its reply. `batch_size = 1` avoids the
/// question entirely.
pub(crate) fn request_label(batch: &Batch) -> String {
    match batch.pages.as_slice() {
        [only] => page_label(only.page_number),
        _ => batch_label(&batch.page_numbers()),
    }
}

/// One high-detail image attachment per page.
pub(crate) fn image_parts(batch: &Batch) -> Vec<ImageData> {
    batch
        .pages
        .iter()
        .map(|page| {
            ImageData::new(page.base64_payload().to_string(), page.media_type().to_string())
                .with_detail("high")
        })
        .collect()
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl TextExtractor for VisionExtractor {
    fn name(&self) -> &str {
        "vision"
    }

    async fn extract_batch(&self, batch: &Batch) -> Result<String, ExtractError> {
        let start = Instant::now();
        let messages = self.build_messages(batch);
        let options = build_options(self.temperature, self.max_tokens);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_llm_error(&e, self.timeout_secs))?;

        debug!(
            "Batch {}: {} input tokens, {} output tokens, {:?}",
            batch.index,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(ExtractError::EmptyResponse);
        }
        Ok(response.content)
    }
}

/// [`Summarizer`] that asks a (usually smaller) chat model for a JSON summary.
pub struct VisionSummarizer {
    provider: Arc<dyn LLMProvider>,
    char_limit: usize,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl VisionSummarizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &OcrConfig) -> Self {
        Self {
            provider,
            char_limit: config.summary_char_limit,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.api_timeout_secs,
        }
    }
}

#[async_trait]
impl Summarizer for VisionSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, ExtractError> {
        let messages = vec![
            ChatMessage::system(summary_prompt(self.char_limit)),
            ChatMessage::user(text),
        ];
        let options = build_options(self.temperature, self.max_tokens);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_llm_error(&e, self.timeout_secs))?;

        if response.content.trim().is_empty() {
            return Err(ExtractError::EmptyResponse);
        }
        Ok(response.content)
    }
}
