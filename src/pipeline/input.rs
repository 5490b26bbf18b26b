//! Input resolution: validate an upload or URL and stage the PDF on disk.
//!
//! ## Why a temp file?
//!
//! pdfium opens documents by path, so every request writes its PDF to a
//! [`TempPdf`]. The file is removed when the `TempPdf` is dropped, which
//! happens on every exit path: success, validation failure, processing
//! failure, or the request future being cancelled.
//!
//! Validation runs entirely in memory first. Nothing touches the disk until
//! the payload is known to be a PDF, so rejected requests never create a file.

use crate::error::OcrError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// The only media type accepted for uploads and downloads.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const PDF_MAGIC: &[u8] = b"%PDF";

/// A file part received from a client.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    /// Declared content type, if the client sent one.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

impl UploadedFile {
    /// Read a local file. The content type is inferred from a `.pdf` extension.
    pub async fn from_path(path: &Path) -> Result<Self, OcrError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            OcrError::invalid_input(format!("cannot read '{}': {}", path.display(), e))
        })?;
        let is_pdf_ext = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        Ok(Self {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.pdf".to_string()),
            content_type: is_pdf_ext.then(|| PDF_CONTENT_TYPE.to_string()),
            bytes,
        })
    }
}

/// Exactly one source for the PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadInput {
    File(UploadedFile),
    Url(String),
}

impl UploadInput {
    /// Accept exactly one of `file` or `url`.
    ///
    /// A blank URL counts as absent.
    pub fn from_parts(file: Option<UploadedFile>, url: Option<String>) -> Result<Self, OcrError> {
        let url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        match (file, url) {
            (Some(_), Some(_)) => Err(OcrError::invalid_input(
                "provide either a file or a URL, not both",
            )),
            (None, None) => Err(OcrError::invalid_input("no file or URL provided")),
            (Some(file), None) => Ok(UploadInput::File(file)),
            (None, Some(url)) => {
                if !is_url(&url) {
                    return Err(OcrError::invalid_input(format!(
                        "URL must start with http:// or https://, got '{}'",
                        url
                    )));
                }
                Ok(UploadInput::Url(url))
            }
        }
    }
}

/// A validated PDF held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct PdfPayload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PdfPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfPayload")
            .field("filename", &self.filename)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn is_pdf_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE))
}

fn check_payload(bytes: &[u8], max_bytes: usize) -> Result<(), OcrError> {
    if bytes.is_empty() {
        return Err(OcrError::invalid_input("the PDF is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(OcrError::PayloadTooLarge {
            detail: format!(
                "the PDF is {} bytes, above the {} byte limit",
                bytes.len(),
                max_bytes
            ),
        });
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(OcrError::invalid_input(
            "the payload is not a PDF (missing %PDF header)",
        ));
    }
    Ok(())
}

/// Validate the input and bring its bytes into memory.
pub async fn load(
    input: UploadInput,
    download_timeout_secs: u64,
    max_bytes: usize,
) -> Result<PdfPayload, OcrError> {
    match input {
        UploadInput::File(file) => {
            match file.content_type.as_deref() {
                Some(ct) if is_pdf_content_type(ct) => {}
                Some(ct) => {
                    return Err(OcrError::invalid_input(format!(
                        "only PDF uploads are accepted, got content type '{}'",
                        ct
                    )))
                }
                None => {
                    return Err(OcrError::invalid_input(
                        "only PDF uploads are accepted, no content type given",
                    ))
                }
            }
            check_payload(&file.bytes, max_bytes)?;
            debug!("Accepted upload '{}' ({} bytes)", file.filename, file.bytes.len());
            Ok(PdfPayload {
                filename: file.filename,
                bytes: file.bytes,
            })
        }
        UploadInput::Url(url) => download(&url, download_timeout_secs, max_bytes).await,
    }
}

async fn download(url: &str, timeout_secs: u64, max_bytes: usize) -> Result<PdfPayload, OcrError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| OcrError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(classify)?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !is_pdf_content_type(&content_type) {
        return Err(failed(format!(
            "expected content type '{}', got '{}'",
            PDF_CONTENT_TYPE, content_type
        )));
    }

    if let Some(len) = response.content_length() {
        if len as usize > max_bytes {
            return Err(OcrError::PayloadTooLarge {
                detail: format!("the PDF is {} bytes, above the {} byte limit", len, max_bytes),
            });
        }
    }

    let bytes = response.bytes().await.map_err(classify)?;
    check_payload(&bytes, max_bytes)?;

    info!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(PdfPayload {
        filename: filename_from_url(url),
        bytes: bytes.to_vec(),
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

/// A PDF staged on disk for the lifetime of one request.
#[derive(Debug)]
pub struct TempPdf {
    file: NamedTempFile,
}

impl TempPdf {
    /// Write `bytes` to a fresh `.pdf` temp file.
    pub async fn write(bytes: &[u8]) -> Result<Self, OcrError> {
        let file = tempfile::Builder::new()
            .prefix("pdfscribe-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| OcrError::Internal(format!("Failed to create temp file: {}", e)))?;
        tokio::fs::write(file.path(), bytes)
            .await
            .map_err(|e| OcrError::Internal(format!("Failed to write temp file: {}", e)))?;
        debug!("Staged {} bytes at {}", bytes.len(), file.path().display());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }
}

impl Drop for TempPdf {
    fn drop(&mut self) {
        // NamedTempFile removes the file right after this.
        debug!("Removing temp PDF {}", self.file.path().display());
    }
}
