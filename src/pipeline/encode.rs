//! Image encoding: page bytes → base64 data URL.
//!
//! Vision APIs accept images as base64 data URLs embedded in the JSON request
//! body. The media type is sniffed from the bytes themselves rather than
//! assumed, so a page source that emits JPEG is labelled correctly.

use crate::error::OcrError;
use crate::pipeline::render::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use tracing::debug;

/// A page ready to be attached to an extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPage {
    /// 1-based number of the page this image came from.
    pub page_number: usize,
    /// `data:<media-type>;base64,<payload>`
    pub data_url: String,
}

impl EncodedPage {
    /// Media type declared in the data URL, e.g. `image/png`.
    pub fn media_type(&self) -> &str {
        self.split().0
    }

    /// Base64 payload without the `data:...;base64,` prefix.
    pub fn base64_payload(&self) -> &str {
        self.split().1
    }

    fn split(&self) -> (&str, &str) {
        let rest = self.data_url.strip_prefix("data:").unwrap_or(&self.data_url);
        match rest.split_once(";base64,") {
            Some((mime, payload)) => (mime, payload),
            None => ("", rest),
        }
    }
}

/// Encode one page. Fails only if the bytes are not a recognisable image.
pub fn encode_page(page: &PageImage) -> Result<EncodedPage, OcrError> {
    let format = image::guess_format(&page.bytes).map_err(|e| OcrError::EncodeFailed {
        page: page.page_number,
        detail: e.to_string(),
    })?;
    let media_type = media_type_for(format).ok_or_else(|| OcrError::EncodeFailed {
        page: page.page_number,
        detail: format!("unsupported image format {:?}", format),
    })?;

    let b64 = STANDARD.encode(&page.bytes);
    debug!(
        "Encoded page {} → {} bytes base64 ({})",
        page.page_number,
        b64.len(),
        media_type
    );

    Ok(EncodedPage {
        page_number: page.page_number,
        data_url: format!("data:{};base64,{}", media_type, b64),
    })
}

/// Encode every page, keeping input order.
pub fn encode_pages(pages: &[PageImage]) -> Result<Vec<EncodedPage>, OcrError> {
    pages.iter().map(encode_page).collect()
}

fn media_type_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::encode_png;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png_page(n: usize) -> PageImage {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        PageImage {
            page_number: n,
            bytes: encode_png(&img).unwrap(),
        }
    }

    #[test]
    fn png_becomes_data_url() {
        let page = png_page(4);
        let encoded = encode_page(&page).expect("encode should succeed");
        assert_eq!(encoded.page_number, 4);
        assert!(encoded.data_url.starts_with("data:image/png;base64,"));
        assert_eq!(encoded.media_type(), "image/png");
        let decoded = STANDARD.decode(encoded.base64_payload()).expect("valid base64");
        assert_eq!(decoded, page.bytes);
    }

    #[test]
    fn garbage_bytes_fail_with_page_number() {
        let page = PageImage {
            page_number: 9,
            bytes: b"definitely not an image".to_vec(),
        };
        match encode_page(&page).unwrap_err() {
            OcrError::EncodeFailed { page, .. } => assert_eq!(page, 9),
            other => panic!("expected EncodeFailed, got {other:?}"),
        }
    }

    #[test]
    fn encode_pages_keeps_order() {
        let pages = vec![png_page(1), png_page(2), png_page(3)];
        let encoded = encode_pages(&pages).unwrap();
        let numbers: Vec<usize> = encoded.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }
}
