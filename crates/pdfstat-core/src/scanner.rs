//! Page scanning
//!
//! [`PageScanner`] turns a validated document into a lazy sequence of
//! [`PageRecord`]s in page order. Scanning only reads the document, so
//! calling [`PageScanner::pages`] again yields the same records.

use std::collections::BTreeSet;

use crate::content::{interpret_page, PageContent, Rgb};
use crate::error::PdfStatError;
use crate::validator::ValidatedDocument;

/// Spans strictly larger than this (in points) count as titles
pub const TITLE_SIZE_THRESHOLD: f64 = 18.0;

/// What one page contributes to the document's features
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRecord {
    /// 0-based page index
    pub index: usize,
    pub text: String,
    pub image_count: usize,
    pub fonts: BTreeSet<String>,
    /// Sizes of every text span, blank ones included
    pub span_sizes: Vec<f64>,
    /// Colors of painted drawings, in drawing order
    pub colors: Vec<Rgb>,
}

impl PageRecord {
    pub fn from_content(index: usize, content: &PageContent) -> Self {
        let fonts = content
            .spans
            .iter()
            .filter_map(|s| s.font.clone())
            .collect();
        let span_sizes = content.spans.iter().map(|s| s.size).collect();
        let colors = content.paths.iter().flat_map(|p| p.colors()).collect();

        Self {
            index,
            text: content.text(),
            image_count: content.image_count,
            fonts,
            span_sizes,
            colors,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// No text left after trimming whitespace
    pub fn is_empty(&self) -> bool {
        !self.has_text()
    }

    /// Textless page that still shows at least one image
    pub fn is_image_only(&self) -> bool {
        self.is_empty() && self.image_count > 0
    }

    pub fn title_span_count(&self) -> usize {
        self.span_sizes
            .iter()
            .filter(|&&size| size > TITLE_SIZE_THRESHOLD)
            .count()
    }
}

pub struct PageScanner<'a> {
    doc: &'a ValidatedDocument,
}

impl<'a> PageScanner<'a> {
    pub fn new(doc: &'a ValidatedDocument) -> Self {
        Self { doc }
    }

    /// One result per page. An `Err` covers only that page.
    pub fn pages(&self) -> impl Iterator<Item = Result<PageRecord, PdfStatError>> + 'a {
        let document = &self.doc.document;
        document
            .get_pages()
            .into_values()
            .enumerate()
            .map(move |(index, page_id)| {
                interpret_page(document, page_id, index)
                    .map(|content| PageRecord::from_content(index, &content))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{PageSpec, PdfBuilder};
    use crate::validator::DocumentValidator;
    use std::path::Path;

    fn open(bytes: &[u8]) -> ValidatedDocument {
        DocumentValidator::open_bytes(Path::new("scan.pdf"), bytes).unwrap()
    }

    #[test]
    fn test_flags_empty_and_image_only_pages() {
        let doc = open(
            &PdfBuilder::new()
                .text_page("Alpha Beta Gamma", 24.0)
                .image_page()
                .empty_page()
                .page(PageSpec::new().raw("BT /F1 12 Tf (   ) Tj ET"))
                .build(),
        );
        let pages: Vec<PageRecord> = PageScanner::new(&doc)
            .pages()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(pages.len(), 4);
        assert_eq!(
            pages.iter().map(|p| p.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert!(!pages[0].is_empty());
        assert!(pages[1].is_empty() && pages[1].is_image_only());
        assert!(pages[2].is_empty() && !pages[2].is_image_only());
        // Whitespace-only text still counts as empty
        assert!(pages[3].is_empty());
    }

    #[test]
    fn test_image_only_implies_empty() {
        let doc = open(
            &PdfBuilder::new()
                .page(PageSpec::new().image(0.0, 0.0).text("Helvetica", 12.0, 10.0, 10.0, "caption"))
                .image_page()
                .build(),
        );
        for page in PageScanner::new(&doc).pages() {
            let page = page.unwrap();
            if page.is_image_only() {
                assert!(page.is_empty());
            }
        }
    }

    #[test]
    fn test_rescanning_is_idempotent() {
        let doc = open(
            &PdfBuilder::new()
                .text_page("First", 30.0)
                .page(PageSpec::new().stroke_rect((0.0, 1.0, 0.0), 0.0, 0.0, 5.0, 5.0))
                .build(),
        );
        let scanner = PageScanner::new(&doc);
        let first: Vec<_> = scanner.pages().map(Result::unwrap).collect();
        let second: Vec<_> = scanner.pages().map(Result::unwrap).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_title_spans_and_fonts() {
        let doc = open(
            &PdfBuilder::new()
                .page(
                    PageSpec::new()
                        .text("Arial-Bold", 24.0, 72.0, 700.0, "Heading")
                        .text("Arial", 18.0, 72.0, 650.0, "Exactly eighteen")
                        .text("Arial", 11.0, 72.0, 600.0, "Body"),
                )
                .build(),
        );
        let page = PageScanner::new(&doc).pages().next().unwrap().unwrap();
        assert_eq!(page.title_span_count(), 1);
        assert_eq!(
            page.fonts.iter().cloned().collect::<Vec<_>>(),
            vec!["Arial".to_string(), "Arial-Bold".to_string()]
        );
    }

    #[test]
    fn test_blank_title_sized_spans_still_count() {
        let doc = open(
            &PdfBuilder::new()
                .page(
                    PageSpec::new()
                        .text("Arial", 32.0, 72.0, 700.0, "   ")
                        .text("Arial", 11.0, 72.0, 600.0, "  "),
                )
                .build(),
        );
        let page = PageScanner::new(&doc).pages().next().unwrap().unwrap();
        assert!(page.is_empty());
        assert_eq!(page.span_sizes.len(), 2);
        assert_eq!(page.title_span_count(), 1);
    }

    #[test]
    fn test_undecodable_page_is_isolated() {
        let doc = open(
            &PdfBuilder::new()
                .text_page("Fine", 12.0)
                .page(PageSpec::new().raw("BT (unterminated"))
                .text_page("Also fine", 12.0)
                .build(),
        );
        let results: Vec<_> = PageScanner::new(&doc).pages().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[2].is_ok());
    }
}
