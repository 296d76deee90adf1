//! Page rasterization for vision models
//!
//! The annotation service looks at pictures of the leading pages, so each
//! page is rendered with pdfium and encoded as JPEG.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Mutex;

use base64::Engine;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use tracing::debug;

use crate::error::AnnotationError;

/// PDF points per inch
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Resolution pages are rendered at
pub const DEFAULT_DPI: u32 = 100;

/// One rendered page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageImage {
    /// 1-based page number
    pub page_number: u32,
    pub width_pts: f32,
    pub height_pts: f32,
    pub jpeg: Vec<u8>,
}

impl PageImage {
    pub fn size(&self) -> usize {
        self.jpeg.len()
    }

    pub fn to_data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.jpeg);
        format!("data:image/jpeg;base64,{}", encoded)
    }
}

/// Turns the first pages of a PDF into images
pub trait PageRenderer: Send + Sync {
    /// Render at most `pages` leading pages, in page order.
    ///
    /// A document that cannot be loaded is an [`AnnotationError::Excerpt`];
    /// a page that cannot be rasterized is an [`AnnotationError::Render`].
    fn render_leading(&self, pdf: &[u8], pages: usize) -> Result<Vec<PageImage>, AnnotationError>;
}

/// Encode a rendered page as baseline RGB JPEG
pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, AnnotationError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut bytes = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .map_err(|e| AnnotationError::Render(format!("JPEG encoding failed: {}", e)))?;
    Ok(bytes)
}

/// Renders through a pdfium shared library.
///
/// pdfium is not thread-safe, so renders are serialized. The library is
/// bound per call and released afterwards.
#[derive(Debug)]
pub struct PdfiumRenderer {
    dpi: u32,
    library_dir: Option<PathBuf>,
    lock: Mutex<()>,
}

impl PdfiumRenderer {
    /// Check that pdfium can be bound, from `library_dir` when given,
    /// otherwise from the system library path
    pub fn new(dpi: u32, library_dir: Option<PathBuf>) -> Result<Self, AnnotationError> {
        let renderer = Self {
            dpi: dpi.max(1),
            library_dir,
            lock: Mutex::new(()),
        };
        renderer.bind()?;
        Ok(renderer)
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    fn bind(&self) -> Result<Pdfium, AnnotationError> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| AnnotationError::Render(format!("pdfium library unavailable: {}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_leading(&self, pdf: &[u8], pages: usize) -> Result<Vec<PageImage>, AnnotationError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AnnotationError::Render("renderer lock poisoned".into()))?;

        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| AnnotationError::Excerpt(format!("pdfium cannot load document: {}", e)))?;

        let mut images = Vec::new();
        for (i, page) in document.pages().iter().take(pages).enumerate() {
            let page_number = (i + 1) as u32;
            let width = page.width().value;
            let height = page.height().value;

            let config = PdfRenderConfig::new()
                .set_target_width((width * self.dpi as f32 / PDF_POINTS_PER_INCH) as i32)
                .set_target_height((height * self.dpi as f32 / PDF_POINTS_PER_INCH) as i32);

            let bitmap = page.render_with_config(&config).map_err(|e| {
                AnnotationError::Render(format!("page {} failed to render: {}", page_number, e))
            })?;
            let jpeg = encode_jpeg(&bitmap.as_image())?;
            debug!("Rendered page {} ({} bytes)", page_number, jpeg.len());

            images.push(PageImage {
                page_number,
                width_pts: width,
                height_pts: height,
                jpeg,
            });
        }

        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use pdfstat_core::fixtures::PdfBuilder;

    #[test]
    fn test_encode_jpeg_drops_alpha() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 128])));
        let jpeg = encode_jpeg(&image).unwrap();
        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn test_data_url_is_jpeg() {
        let page = PageImage {
            page_number: 1,
            jpeg: vec![0xFF, 0xD8, 0xFF],
            ..PageImage::default()
        };
        assert_eq!(page.to_data_url(), "data:image/jpeg;base64,/9j/");
        assert_eq!(page.size(), 3);
    }

    #[test]
    #[ignore] // Needs a pdfium shared library on the system path
    fn test_pdfium_renders_leading_pages() {
        let pdf = PdfBuilder::new()
            .text_page("One", 30.0)
            .text_page("Two", 30.0)
            .text_page("Three", 30.0)
            .text_page("Four", 30.0)
            .build();
        let renderer = PdfiumRenderer::new(DEFAULT_DPI, None).unwrap();
        let pages = renderer.render_leading(&pdf, 3).unwrap();

        assert_eq!(pages.len(), 3);
        assert_eq!(
            pages.iter().map(|p| p.page_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(pages.iter().all(|p| p.jpeg.starts_with(&[0xFF, 0xD8])));
        assert_eq!(pages[0].width_pts.round(), 612.0);
    }

    #[test]
    fn test_missing_library_dir_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PdfiumRenderer::new(DEFAULT_DPI, Some(dir.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, AnnotationError::Render(_)));
        assert!(!err.is_retryable());
    }
}
