//! Join per-batch texts into one document.

use crate::error::OcrError;

/// Separator placed between consecutive batch texts.
pub const BATCH_SEPARATOR: &str = "\n\n";

/// Concatenate `texts` in order with [`BATCH_SEPARATOR`].
///
/// An empty result (no batches, or only empty strings with nothing between
/// them) is reported as [`OcrError::NoTextExtracted`].
pub fn assemble(texts: &[String]) -> Result<String, OcrError> {
    let joined = texts.join(BATCH_SEPARATOR);
    if joined.is_empty() {
        return Err(OcrError::NoTextExtracted);
    }
    Ok(joined)
}
