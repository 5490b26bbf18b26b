//! Pipeline stages for PDF OCR.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ batch ──▶ dispatch ──▶ assemble ──▶ json
//! (upload/URL) (pdfium) (data URL) (chunks) (retry ×N)   ("\n\n")   (summary)
//! ```
//!
//! 1. [`input`]: validate the upload or URL and stage the PDF in a temp file
//! 2. [`render`]: rasterise every page in parallel on the blocking pool and
//!    sort the results back into page order
//! 3. [`encode`]: wrap each page image in a base64 data URL
//! 4. [`batch`]: group pages into fixed-size extraction requests
//! 5. [`dispatch`]: send all batches concurrently, each through [`retry`]
//! 6. [`assemble`]: join batch texts in order
//! 7. [`json`]: pull a JSON object out of a model reply

pub mod assemble;
pub mod batch;
pub mod dispatch;
pub mod encode;
pub mod input;
pub mod json;
pub mod render;
pub mod retry;
