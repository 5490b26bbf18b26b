//! Integration tests for the full OCR flow with fake collaborators.
//!
//! No pdfium library and no network are needed: pages come from an
//! in-memory [`PageSource`] and text from a scripted [`TextExtractor`].

use async_trait::async_trait;
use pdfscribe::pipeline::render::encode_png;
use pdfscribe::{
    Batch, ExtractError, InMemoryUsageStore, OcrConfig, OcrError, OcrService, PageSource,
    Summarizer, TextExtractor, UploadInput, UploadedFile, UsageStore,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Renders `pages` tiny PNGs. Earlier pages take longer, so completion order
/// is the reverse of page order.
struct FakePages {
    pages: usize,
    seen_paths: Mutex<Vec<PathBuf>>,
    count_calls: AtomicUsize,
}

impl FakePages {
    fn new(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            seen_paths: Mutex::new(Vec::new()),
            count_calls: AtomicUsize::new(0),
        })
    }
}

impl PageSource for FakePages {
    fn page_count(&self, pdf: &Path) -> Result<usize, OcrError> {
        assert!(pdf.exists(), "temp PDF must exist while rendering");
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_paths.lock().unwrap().push(pdf.to_path_buf());
        Ok(self.pages)
    }

    fn render_page(&self, _pdf: &Path, index: usize, _zoom: f32) -> Result<Vec<u8>, OcrError> {
        std::thread::sleep(Duration::from_millis(5 * (self.pages - index) as u64));
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
        encode_png(&img).map_err(|e| OcrError::RenderFailed {
            page: index + 1,
            detail: e.to_string(),
        })
    }
}

/// Answers "page N" for every page in a batch, after rate limiting the
/// batches listed in `rate_limits` the given number of times. With
/// `latency_for` set, batch `i` of `n` answers after `(n + 1 - i) * 15` ms,
/// so the last batch finishes first.
struct ScriptedExtractor {
    rate_limits: Mutex<HashMap<usize, u32>>,
    calls: Mutex<HashMap<usize, u32>>,
    latency_for: Option<usize>,
    finished: Mutex<Vec<usize>>,
}

impl ScriptedExtractor {
    fn new() -> Arc<Self> {
        Self::with_rate_limits(&[])
    }

    fn with_rate_limits(limits: &[(usize, u32)]) -> Arc<Self> {
        Arc::new(Self {
            rate_limits: Mutex::new(limits.iter().copied().collect()),
            calls: Mutex::new(HashMap::new()),
            latency_for: None,
            finished: Mutex::new(Vec::new()),
        })
    }

    fn last_batch_first(total: usize) -> Arc<Self> {
        Arc::new(Self {
            rate_limits: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            latency_for: Some(total),
            finished: Mutex::new(Vec::new()),
        })
    }

    fn calls_for(&self, batch: usize) -> u32 {
        self.calls.lock().unwrap().get(&batch).copied().unwrap_or(0)
    }
}

#[async_trait]
impl TextExtractor for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract_batch(&self, batch: &Batch) -> Result<String, ExtractError> {
        *self.calls.lock().unwrap().entry(batch.index).or_default() += 1;
        {
            let mut limits = self.rate_limits.lock().unwrap();
            if let Some(left) = limits.get_mut(&batch.index) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ExtractError::RateLimited {
                        detail: "429 Too Many Requests".into(),
                    });
                }
            }
        }
        if let Some(total) = self.latency_for {
            let steps = (total + 1).saturating_sub(batch.index) as u64;
            tokio::time::sleep(Duration::from_millis(15 * steps)).await;
        }
        self.finished.lock().unwrap().push(batch.index);
        Ok(batch
            .page_numbers()
            .iter()
            .map(|n| format!("page {n}"))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

struct FixedSummarizer(&'static str);

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, _text: &str) -> Result<String, ExtractError> {
        Ok(self.0.to_string())
    }
}

/// Always fails with `error`, counting calls.
struct FailingSummarizer {
    error: ExtractError,
    calls: AtomicUsize,
}

impl FailingSummarizer {
    fn new(error: ExtractError) -> Arc<Self> {
        Arc::new(Self {
            error,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _text: &str) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn pdf_upload(name: &str) -> UploadInput {
    UploadInput::File(UploadedFile {
        filename: name.to_string(),
        content_type: Some("application/pdf".to_string()),
        bytes: b"%PDF-1.4\n%fake body\n%%EOF\n".to_vec(),
    })
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("pdfscribe=debug"))
        .with_test_writer()
        .try_init();
}

fn fast_config() -> pdfscribe::OcrConfigBuilder {
    init_logging();
    OcrConfig::builder()
        .base_delay_ms(5)
        .max_delay_ms(20)
        .api_timeout_secs(5)
}

fn service(
    config: OcrConfig,
    pages: Arc<FakePages>,
    extractor: Arc<ScriptedExtractor>,
    usage: Arc<InMemoryUsageStore>,
) -> OcrService {
    OcrService::new(config, pages, extractor, usage)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_pages_come_back_in_order() {
    let pages = FakePages::new(3);
    let usage = Arc::new(InMemoryUsageStore::new());
    let svc = service(
        fast_config().build().unwrap(),
        pages,
        ScriptedExtractor::new(),
        usage,
    );

    let doc = svc.ocr(pdf_upload("invoice.pdf"), "acme").await.unwrap();
    assert_eq!(doc.text, "page 1\n\npage 2\n\npage 3");
    assert_eq!(doc.page_count, 3);
    assert_eq!(doc.batch_count, 3);
    assert_eq!(doc.filename, "invoice.pdf");
}

#[tokio::test]
async fn text_follows_page_order_when_last_batch_finishes_first() {
    let extractor = ScriptedExtractor::last_batch_first(3);
    let svc = service(
        fast_config().build().unwrap(),
        FakePages::new(3),
        extractor.clone(),
        Arc::new(InMemoryUsageStore::new()),
    );

    let doc = svc.ocr(pdf_upload("invoice.pdf"), "acme").await.unwrap();
    assert_eq!(*extractor.finished.lock().unwrap(), vec![3, 2, 1]);
    assert_eq!(doc.text, "page 1\n\npage 2\n\npage 3");
}

#[test]
fn service_futures_are_send() {
    fn assert_send<T: Send>(_: &T) {}

    let svc = service(
        fast_config().build().unwrap(),
        FakePages::new(1),
        ScriptedExtractor::new(),
        Arc::new(InMemoryUsageStore::new()),
    )
    .with_summarizer(Arc::new(FixedSummarizer("{}")));

    let ocr = svc.ocr(pdf_upload("a.pdf"), "acme");
    assert_send(&ocr);
    let structured = svc.extract_structured(pdf_upload("a.pdf"), "acme");
    assert_send(&structured);
    let summary = svc.structure("text");
    assert_send(&summary);
}

#[tokio::test]
async fn batches_group_consecutive_pages() {
    let svc = service(
        fast_config().batch_size(2).build().unwrap(),
        FakePages::new(5),
        ScriptedExtractor::new(),
        Arc::new(InMemoryUsageStore::new()),
    );

    let doc = svc.ocr(pdf_upload("scan.pdf"), "acme").await.unwrap();
    assert_eq!(doc.batch_count, 3);
    assert_eq!(
        doc.text,
        "page 1\npage 2\n\npage 3\npage 4\n\npage 5"
    );
}

#[tokio::test]
async fn missing_input_is_rejected_before_rendering() {
    let err = UploadInput::from_parts(None, None).unwrap_err();
    assert!(matches!(err, OcrError::InvalidInput { .. }));
    assert_eq!(err.status_code(), 400);

    let pages = FakePages::new(2);
    let svc = service(
        fast_config().build().unwrap(),
        pages.clone(),
        ScriptedExtractor::new(),
        Arc::new(InMemoryUsageStore::new()),
    );
    let not_a_pdf = UploadInput::File(UploadedFile {
        filename: "notes.txt".into(),
        content_type: Some("text/plain".into()),
        bytes: b"hello".to_vec(),
    });
    let err = svc.ocr(not_a_pdf, "acme").await.unwrap_err();
    assert!(matches!(err, OcrError::InvalidInput { .. }));
    assert_eq!(pages.count_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rate_limited_batch_succeeds_on_third_attempt() {
    let extractor = ScriptedExtractor::with_rate_limits(&[(2, 2)]);
    let svc = service(
        fast_config().build().unwrap(),
        FakePages::new(3),
        extractor.clone(),
        Arc::new(InMemoryUsageStore::new()),
    );

    let doc = svc.ocr(pdf_upload("invoice.pdf"), "acme").await.unwrap();
    assert_eq!(doc.text, "page 1\n\npage 2\n\npage 3");
    assert_eq!(extractor.calls_for(1), 1);
    assert_eq!(extractor.calls_for(2), 3);
    assert_eq!(extractor.calls_for(3), 1);
}

#[tokio::test]
async fn exhausted_retries_fail_the_request_with_429() {
    let extractor = ScriptedExtractor::with_rate_limits(&[(1, 100)]);
    let usage = Arc::new(InMemoryUsageStore::new());
    let svc = service(
        fast_config().max_retries(3).build().unwrap(),
        FakePages::new(2),
        extractor.clone(),
        usage.clone(),
    );

    let err = svc.ocr(pdf_upload("invoice.pdf"), "acme").await.unwrap_err();
    assert!(
        matches!(err, OcrError::RetryExhausted { batch: 1, attempts: 3, .. }),
        "got: {err:?}"
    );
    assert_eq!(err.status_code(), 429);
    assert_eq!(extractor.calls_for(1), 3);
    assert!(usage.records().is_empty(), "failed runs are not billed");
}

#[tokio::test]
async fn temp_file_is_gone_after_success_and_failure() {
    let pages = FakePages::new(2);
    let svc = service(
        fast_config().max_retries(1).build().unwrap(),
        pages.clone(),
        ScriptedExtractor::with_rate_limits(&[(2, 1)]),
        Arc::new(InMemoryUsageStore::new()),
    );

    // First run: batch 2 is rate limited once with a single attempt allowed.
    assert!(svc.ocr(pdf_upload("a.pdf"), "acme").await.is_err());
    // Second run: the limit is used up, so it succeeds.
    svc.ocr(pdf_upload("b.pdf"), "acme").await.unwrap();

    let seen = pages.seen_paths.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    for path in seen {
        assert!(!path.exists(), "{} was left behind", path.display());
    }
}

#[tokio::test]
async fn successful_runs_are_recorded_and_quota_enforced() {
    let pages = FakePages::new(2);
    let usage = Arc::new(InMemoryUsageStore::new());
    let svc = service(
        fast_config().max_extractions_per_owner(1).build().unwrap(),
        pages.clone(),
        ScriptedExtractor::new(),
        usage.clone(),
    );

    svc.ocr(pdf_upload("first.pdf"), "acme").await.unwrap();
    let records = usage.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].filename, "first.pdf");
    assert_eq!(records[0].page_count, 2);
    assert_eq!(records[0].owner, "acme");

    let err = svc.ocr(pdf_upload("second.pdf"), "acme").await.unwrap_err();
    assert!(matches!(err, OcrError::QuotaExceeded { used: 1, limit: 1, .. }));
    assert_eq!(err.status_code(), 403);
    assert_eq!(pages.count_calls.load(Ordering::SeqCst), 1);

    // Other owners keep their own budget.
    svc.ocr(pdf_upload("third.pdf"), "globex").await.unwrap();
    assert_eq!(usage.count("globex").await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_requests_cannot_overrun_the_quota() {
    let pages = FakePages::new(2);
    let usage = Arc::new(InMemoryUsageStore::new());
    let svc = service(
        fast_config().max_extractions_per_owner(1).build().unwrap(),
        pages.clone(),
        ScriptedExtractor::last_batch_first(2),
        usage.clone(),
    );

    let (a, b) = tokio::join!(
        svc.ocr(pdf_upload("a.pdf"), "acme"),
        svc.ocr(pdf_upload("b.pdf"), "acme"),
    );
    let results = [a, b];
    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(OcrError::QuotaExceeded { used: 1, limit: 1, .. }))));
    assert_eq!(usage.count("acme").await.unwrap(), 1);
    assert_eq!(pages.count_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_request_releases_its_quota_slot() {
    let usage = Arc::new(InMemoryUsageStore::new());
    let svc = service(
        fast_config()
            .max_extractions_per_owner(1)
            .max_retries(1)
            .build()
            .unwrap(),
        FakePages::new(1),
        ScriptedExtractor::with_rate_limits(&[(1, 1)]),
        usage.clone(),
    );

    let err = svc.ocr(pdf_upload("a.pdf"), "acme").await.unwrap_err();
    assert!(matches!(err, OcrError::RetryExhausted { .. }), "{err:?}");
    assert_eq!(usage.count("acme").await.unwrap(), 0);

    svc.ocr(pdf_upload("a.pdf"), "acme").await.unwrap();
    assert_eq!(usage.count("acme").await.unwrap(), 1);
}

#[tokio::test]
async fn structured_output_uses_the_summary_reply() {
    let svc = service(
        fast_config().build().unwrap(),
        FakePages::new(1),
        ScriptedExtractor::new(),
        Arc::new(InMemoryUsageStore::new()),
    )
    .with_summarizer(Arc::new(FixedSummarizer(
        "Here you go: {\"vendor\": \"ACME\", \"total\": 42.5} thanks",
    )));

    let out = svc
        .extract_structured(pdf_upload("bill.pdf"), "acme")
        .await
        .unwrap();
    assert_eq!(out.text, "page 1");
    let data = out.data.expect("record");
    assert_eq!(data["vendor"], "ACME");
    assert_eq!(data["total"], 42.5);
    assert!(out.message.is_none());
}

#[tokio::test]
async fn structured_output_reports_missing_json() {
    let svc = service(
        fast_config().build().unwrap(),
        FakePages::new(1),
        ScriptedExtractor::new(),
        Arc::new(InMemoryUsageStore::new()),
    )
    .with_summarizer(Arc::new(FixedSummarizer("I could not find an invoice.")));

    let out = svc
        .extract_structured(pdf_upload("bill.pdf"), "acme")
        .await
        .unwrap();
    assert!(out.data.is_none());
    assert_eq!(out.message.as_deref(), Some("No JSON found in the text."));

    let body = serde_json::to_value(&out).unwrap();
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn throttled_summary_reports_exhausted_budget() {
    let summarizer = FailingSummarizer::new(ExtractError::RateLimited {
        detail: "429 Too Many Requests".into(),
    });
    let svc = service(
        fast_config().max_retries(3).build().unwrap(),
        FakePages::new(1),
        ScriptedExtractor::new(),
        Arc::new(InMemoryUsageStore::new()),
    )
    .with_summarizer(summarizer.clone());

    let err = svc
        .extract_structured(pdf_upload("bill.pdf"), "acme")
        .await
        .unwrap_err();
    assert!(
        matches!(err, OcrError::SummaryRetryExhausted { attempts: 3, .. }),
        "got: {err:?}"
    );
    assert_eq!(err.status_code(), 429);
    assert_eq!(err.category(), "summary_retry_exhausted");
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rejected_summary_fails_once_without_retry() {
    let summarizer = FailingSummarizer::new(ExtractError::Api {
        detail: "model not found".into(),
    });
    let svc = service(
        fast_config().max_retries(3).build().unwrap(),
        FakePages::new(1),
        ScriptedExtractor::new(),
        Arc::new(InMemoryUsageStore::new()),
    )
    .with_summarizer(summarizer.clone());

    let err = svc
        .extract_structured(pdf_upload("bill.pdf"), "acme")
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::SummaryFailed { .. }), "got: {err:?}");
    assert_eq!(err.status_code(), 502);
    assert_eq!(err.category(), "summary_failed");
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
}
