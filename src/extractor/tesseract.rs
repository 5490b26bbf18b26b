//! Local OCR via the `tesseract` command-line engine.
//!
//! Each page image is piped to `tesseract stdin stdout -l <lang>` and the
//! recognised text is read back from stdout. Pages of a batch are processed
//! one after another and joined with a blank line.

use crate::error::ExtractError;
use crate::extractor::TextExtractor;
use crate::pipeline::batch::Batch;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// [`TextExtractor`] that shells out to Tesseract.
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    command: String,
    lang: String,
}

impl TesseractExtractor {
    pub fn new(command: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            lang: lang.into(),
        }
    }

    async fn recognise(&self, page_number: usize, image: &[u8]) -> Result<String, ExtractError> {
        let api = |detail: String| ExtractError::Api {
            detail: format!("tesseract, page {}: {}", page_number, detail),
        };

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.lang])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| api(format!("failed to start '{}': {}", self.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(image)
                .await
                .map_err(|e| api(format!("failed to write image: {}", e)))?;
            // Dropping stdin closes the pipe so tesseract sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| api(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(api(format!("exited with {}: {}", output.status, stderr.trim())));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("tesseract page {}: {} chars", page_number, text.len());
        Ok(text)
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn extract_batch(&self, batch: &Batch) -> Result<String, ExtractError> {
        let mut texts = Vec::with_capacity(batch.pages.len());
        for page in &batch.pages {
            let image = STANDARD
                .decode(page.base64_payload())
                .map_err(|e| ExtractError::Api {
                    detail: format!("page {}: invalid base64 image: {}", page.page_number, e),
                })?;
            let text = self.recognise(page.page_number, &image).await?;
            if !text.is_empty() {
                texts.push(text);
            }
        }

        if texts.is_empty() {
            return Err(ExtractError::EmptyResponse);
        }
        Ok(texts.join("\n\n"))
    }
}
