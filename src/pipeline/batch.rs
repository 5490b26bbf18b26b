//! Partition encoded pages into extraction requests.

use crate::pipeline::encode::EncodedPage;
use std::num::NonZeroUsize;

/// Pages sent together in one extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based position of this batch in the document.
    pub index: usize,
    pub pages: Vec<EncodedPage>,
}

impl Batch {
    /// Page numbers carried by this batch, in attachment order.
    pub fn page_numbers(&self) -> Vec<usize> {
        self.pages.iter().map(|p| p.page_number).collect()
    }
}

/// Split `pages` into consecutive batches of at most `batch_size` pages.
///
/// Concatenating the batches gives back `pages` unchanged. Only the last batch
/// may be short, and an empty input yields no batches at all.
pub fn create_batches(pages: Vec<EncodedPage>, batch_size: NonZeroUsize) -> Vec<Batch> {
    let size = batch_size.get();
    let mut batches = Vec::with_capacity(pages.len().div_ceil(size));
    let mut iter = pages.into_iter().peekable();

    while iter.peek().is_some() {
        let chunk: Vec<EncodedPage> = iter.by_ref().take(size).collect();
        batches.push(Batch {
            index: batches.len() + 1,
            pages: chunk,
        });
    }
    batches
}
