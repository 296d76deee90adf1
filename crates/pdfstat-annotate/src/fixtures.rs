//! Rendering stand-in for tests that have no pdfium library at hand

use std::path::Path;

use image::{DynamicImage, RgbImage};
use pdfstat_core::DocumentValidator;

use crate::error::AnnotationError;
use crate::render::{encode_jpeg, PageImage, PageRenderer};

/// Opens the document with lopdf and emits one small blank JPEG per
/// leading page
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl PageRenderer for PlaceholderRenderer {
    fn render_leading(&self, pdf: &[u8], pages: usize) -> Result<Vec<PageImage>, AnnotationError> {
        let doc = DocumentValidator::open_bytes(Path::new("excerpt.pdf"), pdf)
            .map_err(|e| AnnotationError::Excerpt(e.to_string()))?;
        let blank = encode_jpeg(&DynamicImage::ImageRgb8(RgbImage::new(8, 10)))?;

        Ok((1..=doc.page_count.min(pages))
            .map(|n| PageImage {
                page_number: n as u32,
                width_pts: 612.0,
                height_pts: 792.0,
                jpeg: blank.clone(),
            })
            .collect())
    }
}
