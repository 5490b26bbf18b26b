//! PDF rasterisation: render every page of a document to PNG bytes.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is CPU-bound
//! and not safe to call from async contexts. Each page is rendered inside
//! `tokio::task::spawn_blocking`, on the runtime's dedicated blocking pool, so
//! Tokio worker threads never stall while a page is being drawn.
//!
//! ## Why one handle per page?
//!
//! The page count is read by opening the document and dropping it right away.
//! Each render task then opens its own handle and loads exactly one page, so
//! no document handle is ever shared between workers.
//!
//! Rendering goes through the [`PageSource`] trait so the fan-in logic in
//! [`rasterize`] can be exercised without a pdfium library on the machine.

use crate::error::OcrError;
use futures::stream::{self, StreamExt, TryStreamExt};
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One rasterised page. `page_number` is 1-based.
#[derive(Clone, PartialEq, Eq)]
pub struct PageImage {
    pub page_number: usize,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("page_number", &self.page_number)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// Something that can count and render the pages of a PDF on disk.
///
/// Both methods block and are always called from `spawn_blocking`.
pub trait PageSource: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, pdf: &Path) -> Result<usize, OcrError>;

    /// Render the page at zero-based `index`, scaled by `zoom`, as lossless
    /// image bytes.
    fn render_page(&self, pdf: &Path, index: usize, zoom: f32) -> Result<Vec<u8>, OcrError>;
}

/// [`PageSource`] backed by libpdfium.
#[derive(Debug, Clone)]
pub struct PdfiumPageSource {
    library: Option<PathBuf>,
    max_rendered_pixels: u32,
}

impl PdfiumPageSource {
    /// Use the library at `library`, or the system libpdfium when `None`.
    pub fn new(library: Option<PathBuf>, max_rendered_pixels: u32) -> Self {
        Self {
            library,
            max_rendered_pixels,
        }
    }

    /// Bind once and drop the handle, so a missing library is reported at
    /// startup instead of on the first request.
    pub fn ensure_available(&self) -> Result<(), OcrError> {
        self.bind().map(drop)
    }

    fn bind(&self) -> Result<Pdfium, OcrError> {
        match &self.library {
            Some(path) => pdfium_auto::bind_pdfium_from_path(path)
                .map_err(|e| OcrError::PdfiumUnavailable(e.to_string())),
            None => Pdfium::bind_to_system_library()
                .map(Pdfium::new)
                .map_err(|e| OcrError::PdfiumUnavailable(format!("{:?}", e))),
        }
    }
}

impl PageSource for PdfiumPageSource {
    fn page_count(&self, pdf: &Path) -> Result<usize, OcrError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| OcrError::CorruptPdf {
                path: pdf.to_path_buf(),
                detail: format!("{:?}", e),
            })?;
        let count = document.pages().len() as usize;
        Ok(count)
    }

    fn render_page(&self, pdf: &Path, index: usize, zoom: f32) -> Result<Vec<u8>, OcrError> {
        let page_number = index + 1;
        let render_failed = |detail: String| OcrError::RenderFailed {
            page: page_number,
            detail,
        };

        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| render_failed(format!("{:?}", e)))?;
        let page = document
            .pages()
            .get(index as u16)
            .map_err(|e| render_failed(format!("{:?}", e)))?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(zoom)
            .set_maximum_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| render_failed(format!("{:?}", e)))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_number,
            image.width(),
            image.height()
        );

        encode_png(&image).map_err(|e| render_failed(e.to_string()))
    }
}

/// Serialise an image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Rasterise every page of `pdf`, at most `workers` pages at a time.
///
/// Pages finish in whatever order the workers complete them; the result is
/// sorted by page number before it is returned. The first page that fails
/// aborts the whole document.
pub async fn rasterize(
    source: Arc<dyn PageSource>,
    pdf: &Path,
    zoom: f32,
    workers: usize,
) -> Result<Vec<PageImage>, OcrError> {
    let path = pdf.to_path_buf();

    let page_count = {
        let source = Arc::clone(&source);
        let path = path.clone();
        tokio::task::spawn_blocking(move || source.page_count(&path))
            .await
            .map_err(|e| OcrError::Internal(format!("Page count task panicked: {}", e)))??
    };
    info!(
        "Rasterising {} pages (zoom={}, workers={})",
        page_count, zoom, workers
    );

    let mut pages: Vec<PageImage> = stream::iter(0..page_count)
        .map(|index| {
            let source = Arc::clone(&source);
            let path = path.clone();
            async move {
                let page_number = index + 1;
                let bytes = tokio::task::spawn_blocking(move || {
                    source.render_page(&path, index, zoom)
                })
                .await
                .map_err(|e| OcrError::RenderFailed {
                    page: page_number,
                    detail: format!("render task panicked: {}", e),
                })?
                .map_err(|e| match e {
                    e @ (OcrError::RenderFailed { .. } | OcrError::PdfiumUnavailable(_)) => e,
                    other => OcrError::RenderFailed {
                        page: page_number,
                        detail: other.to_string(),
                    },
                })?;
                Ok::<_, OcrError>(PageImage { page_number, bytes })
            }
        })
        .buffer_unordered(workers.max(1))
        .try_collect()
        .await?;

    pages.sort_by_key(|p| p.page_number);
    debug!("Rasterised {} pages", pages.len());
    Ok(pages)
}
