//! Progress-callback trait for per-batch dispatch events.
//!
//! Inject an [`Arc<dyn DispatchProgressCallback>`] via
//! [`crate::config::OcrConfigBuilder::progress_callback`] to receive events
//! as the dispatcher sends each batch to the extraction backend.
//!
//! # Example
//!
//! ```rust
//! use pdfscribe::{DispatchProgressCallback, OcrConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl DispatchProgressCallback for CountingCallback {
//!     fn on_batch_complete(&self, batch: usize, total_batches: usize, text_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Batch {}/{} done ({} chars)", batch, total_batches, text_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = OcrConfig::builder()
//!     .progress_callback(counter as Arc<dyn DispatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the dispatcher as it processes each batch.
///
/// Batches are dispatched concurrently, so every method except
/// `on_dispatch_start` may be called from several tasks at once.
/// Implementations must guard shared mutable state with `Mutex` or atomics.
pub trait DispatchProgressCallback: Send + Sync {
    /// Called once before any batch is sent.
    fn on_dispatch_start(&self, total_batches: usize, total_pages: usize) {
        let _ = (total_batches, total_pages);
    }

    /// Called just before the first attempt for a batch (1-indexed).
    fn on_batch_start(&self, batch: usize, total_batches: usize) {
        let _ = (batch, total_batches);
    }

    /// Called when a batch's text has been extracted.
    fn on_batch_complete(&self, batch: usize, total_batches: usize, text_len: usize) {
        let _ = (batch, total_batches, text_len);
    }

    /// Called when a batch fails for good (after retries, or permanently).
    fn on_batch_error(&self, batch: usize, total_batches: usize, error: &str) {
        let _ = (batch, total_batches, error);
    }

    /// Called once after every batch has either completed or the dispatch
    /// was abandoned because a sibling failed.
    fn on_dispatch_complete(&self, total_batches: usize, success_count: usize) {
        let _ = (total_batches, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl DispatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::OcrConfig`].
pub type ProgressCallback = Arc<dyn DispatchProgressCallback>;
