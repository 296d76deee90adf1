//! Leading-page excerpts
//!
//! The annotation service only looks at the first few pages of a document,
//! rendered to images.

use std::fs;
use std::path::Path;

use pdfstat_core::DocumentId;

use crate::error::AnnotationError;
use crate::render::{PageImage, PageRenderer};

/// Pages sent per document
pub const DEFAULT_EXCERPT_PAGES: usize = 3;

/// The part of one document shown to the annotation service
#[derive(Debug, Clone)]
pub struct DocumentExcerpt {
    pub id: DocumentId,
    pub file_name: String,
    pub pages: Vec<PageImage>,
}

impl DocumentExcerpt {
    pub fn from_bytes(
        id: DocumentId,
        file_name: impl Into<String>,
        bytes: &[u8],
        pages: usize,
        renderer: &dyn PageRenderer,
    ) -> Result<Self, AnnotationError> {
        if pages == 0 {
            return Err(AnnotationError::Excerpt("page limit must be >= 1".into()));
        }

        let images = renderer.render_leading(bytes, pages)?;
        if images.is_empty() {
            return Err(AnnotationError::Excerpt("document has no pages".into()));
        }

        Ok(Self {
            id,
            file_name: file_name.into(),
            pages: images,
        })
    }

    pub fn from_file(
        id: DocumentId,
        path: &Path,
        pages: usize,
        renderer: &dyn PageRenderer,
    ) -> Result<Self, AnnotationError> {
        let bytes = fs::read(path)
            .map_err(|e| AnnotationError::Excerpt(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf");
        Self::from_bytes(id, file_name, &bytes, pages, renderer)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// One `data:image/jpeg` URL per page, in page order
    pub fn image_urls(&self) -> Vec<String> {
        self.pages.iter().map(PageImage::to_data_url).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::PlaceholderRenderer;
    use pdfstat_core::fixtures::PdfBuilder;

    fn deck(pages: usize) -> Vec<u8> {
        let mut builder = PdfBuilder::new();
        for i in 0..pages {
            builder = builder.text_page(&format!("Slide {}", i + 1), 20.0);
        }
        builder.build()
    }

    #[test]
    fn test_keeps_leading_pages() {
        let excerpt =
            DocumentExcerpt::from_bytes(DocumentId(0), "a.pdf", &deck(5), 3, &PlaceholderRenderer)
                .unwrap();
        assert_eq!(excerpt.page_count(), 3);
        assert_eq!(
            excerpt.pages.iter().map(|p| p.page_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_short_document_is_kept_whole() {
        let excerpt =
            DocumentExcerpt::from_bytes(DocumentId(0), "a.pdf", &deck(2), 3, &PlaceholderRenderer)
                .unwrap();
        assert_eq!(excerpt.page_count(), 2);
    }

    #[test]
    fn test_rejects_garbage_empty_and_zero_limit() {
        let renderer = PlaceholderRenderer;
        assert!(matches!(
            DocumentExcerpt::from_bytes(DocumentId(0), "x.pdf", b"nope", 3, &renderer),
            Err(AnnotationError::Excerpt(_))
        ));
        assert!(matches!(
            DocumentExcerpt::from_bytes(DocumentId(0), "x.pdf", &deck(0), 3, &renderer),
            Err(AnnotationError::Excerpt(_))
        ));
        assert!(DocumentExcerpt::from_bytes(DocumentId(0), "x.pdf", &deck(1), 0, &renderer).is_err());
    }

    #[test]
    fn test_image_urls() {
        let excerpt =
            DocumentExcerpt::from_bytes(DocumentId(4), "a.pdf", &deck(2), 3, &PlaceholderRenderer)
                .unwrap();
        let urls = excerpt.image_urls();
        assert_eq!(urls.len(), 2);
        // base64 of the JPEG SOI marker
        assert!(urls.iter().all(|u| u.starts_with("data:image/jpeg;base64,/9j/")));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slides.pdf");
        fs::write(&path, deck(4)).unwrap();
        let excerpt = DocumentExcerpt::from_file(DocumentId(0), &path, 3, &PlaceholderRenderer).unwrap();
        assert_eq!(excerpt.page_count(), 3);
        assert_eq!(excerpt.file_name, "slides.pdf");

        let missing = DocumentExcerpt::from_file(
            DocumentId(1),
            &dir.path().join("gone.pdf"),
            3,
            &PlaceholderRenderer,
        );
        assert!(matches!(missing, Err(AnnotationError::Excerpt(_))));
    }
}
