//! Concurrent batch dispatch.
//!
//! One extraction call is issued per batch, each wrapped in its own timeout
//! and [`retry_with_backoff`] loop. Calls are collected in completion order
//! with `buffer_unordered`, tagged with their slot, and sorted back into
//! batch order before returning.
//!
//! The first batch to fail for good, in completion order, fails the whole
//! dispatch. The stream is dropped at that point, which drops every sibling
//! call still in flight (including ones sleeping in backoff). Dropping the
//! future returned by [`dispatch_batches`] abandons all calls the same way.

use crate::config::OcrConfig;
use crate::error::{ExtractError, OcrError};
use crate::extractor::TextExtractor;
use crate::pipeline::batch::Batch;
use crate::pipeline::retry::{retry_with_backoff, RetryError, RetryPolicy};
use crate::progress::{DispatchProgressCallback, NoopProgressCallback, ProgressCallback};
use futures::future::{BoxFuture, FutureExt, TryFutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Knobs for [`dispatch_batches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub retry: RetryPolicy,
    /// Limit on a single extraction call, retried as a timeout.
    pub call_timeout: Duration,
    /// Maximum calls in flight; `None` runs every batch at once.
    pub concurrency: Option<usize>,
}

impl DispatchSettings {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            retry: config.retry_policy(),
            call_timeout: config.api_timeout(),
            concurrency: config.dispatch_concurrency,
        }
    }
}

/// Extract the text of every batch, returned in batch order.
pub async fn dispatch_batches(
    extractor: &dyn TextExtractor,
    batches: &[Batch],
    settings: &DispatchSettings,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<String>, OcrError> {
    let noop = NoopProgressCallback;
    let cb: &dyn DispatchProgressCallback = match progress {
        Some(p) => p.as_ref(),
        None => &noop,
    };

    let total = batches.len();
    let total_pages: usize = batches.iter().map(|b| b.pages.len()).sum();
    let limit = settings.concurrency.unwrap_or(total).max(1);
    info!(
        "Dispatching {} batches ({} pages) to '{}', concurrency {}",
        total,
        total_pages,
        extractor.name(),
        limit
    );
    cb.on_dispatch_start(total, total_pages);

    let successes = AtomicUsize::new(0);
    let calls: Vec<BoxFuture<'_, Result<(usize, String), OcrError>>> = batches
        .iter()
        .enumerate()
        .map(|(slot, batch)| {
            dispatch_one(extractor, batch, total, settings, cb, &successes)
                .map_ok(move |text| (slot, text))
                .boxed()
        })
        .collect();

    let result: Result<Vec<String>, OcrError> = stream::iter(calls)
        .buffer_unordered(limit)
        .try_collect::<Vec<_>>()
        .await
        .map(|mut done| {
            done.sort_by_key(|(slot, _)| *slot);
            done.into_iter().map(|(_, text)| text).collect()
        });

    let succeeded = successes.load(Ordering::SeqCst);
    cb.on_dispatch_complete(total, succeeded);
    match &result {
        Ok(_) => info!("All {} batches extracted", total),
        Err(e) => warn!("Dispatch abandoned after {}/{} batches: {}", succeeded, total, e),
    }
    result
}

async fn dispatch_one(
    extractor: &dyn TextExtractor,
    batch: &Batch,
    total: usize,
    settings: &DispatchSettings,
    cb: &dyn DispatchProgressCallback,
    successes: &AtomicUsize,
) -> Result<String, OcrError> {
    cb.on_batch_start(batch.index, total);

    let label = format!("batch {}/{}", batch.index, total);
    let call_timeout = settings.call_timeout;
    let outcome = retry_with_backoff(&settings.retry, &label, move || async move {
        let text = tokio::time::timeout(call_timeout, extractor.extract_batch(batch))
            .await
            .map_err(|_| ExtractError::Timeout {
                secs: call_timeout.as_secs(),
            })??;
        if text.trim().is_empty() {
            return Err(ExtractError::EmptyResponse);
        }
        Ok(text)
    })
    .await;

    match outcome {
        Ok(text) => {
            successes.fetch_add(1, Ordering::SeqCst);
            cb.on_batch_complete(batch.index, total, text.len());
            Ok(text)
        }
        Err(e) => {
            let err = match e {
                RetryError::Exhausted { attempts, last } => OcrError::RetryExhausted {
                    batch: batch.index,
                    attempts,
                    last,
                },
                RetryError::Permanent(ExtractError::EmptyResponse) => {
                    OcrError::EmptyExtraction { batch: batch.index }
                }
                RetryError::Permanent(source) => OcrError::Upstream {
                    batch: batch.index,
                    source,
                },
            };
            cb.on_batch_error(batch.index, total, &err.to_string());
            Err(err)
        }
    }
}
