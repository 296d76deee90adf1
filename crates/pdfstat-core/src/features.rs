//! Per-document feature extraction
//!
//! Extraction is a fold over the page scan: every page yields a
//! [`PageMetrics`] value and the document's metrics are their sum. Tables
//! come from a separate pass (see [`crate::tables`]).

use std::borrow::Borrow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::Rgb;
use crate::error::PdfStatError;
use crate::identity::DocumentId;
use crate::keywords::KeywordExtractor;
use crate::palette::ColorTally;
use crate::scanner::{PageRecord, PageScanner};
use crate::tables::count_tables;
use crate::validator::ValidatedDocument;

/// Placeholder written for design/style labels that were never returned
pub const SENTINEL: &str = "not defined";

/// US Letter in points, the area every page is normalized against
pub const STANDARD_PAGE_AREA: f64 = 792.0 * 612.0;

pub const DEFAULT_LANGUAGE: &str = "English";

/// Design and style labels returned by the annotation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub design: String,
    pub style: String,
}

impl Annotation {
    pub fn new(design: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            design: design.into(),
            style: style.into(),
        }
    }
}

/// One row of the dataset
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub id: DocumentId,
    /// Raw font names as found in the document
    pub fonts: BTreeSet<String>,
    pub images_count: usize,
    pub tables_count: usize,
    /// `None` until an annotation is merged in
    pub annotation: Option<Annotation>,
    pub language: String,
    pub slides_count: usize,
    pub text_density: f64,
    pub keywords: Vec<String>,
    pub color_palette: Vec<String>,
    pub title_density: f64,
}

impl FeatureRecord {
    /// A record with every field at its empty value
    pub fn empty(id: DocumentId, language: impl Into<String>) -> Self {
        Self {
            id,
            fonts: BTreeSet::new(),
            images_count: 0,
            tables_count: 0,
            annotation: None,
            language: language.into(),
            slides_count: 0,
            text_density: 0.0,
            keywords: Vec::new(),
            color_palette: Vec::new(),
            title_density: 0.0,
        }
    }

    pub fn design(&self) -> &str {
        self.annotation
            .as_ref()
            .map(|a| a.design.as_str())
            .unwrap_or(SENTINEL)
    }

    pub fn style(&self) -> &str {
        self.annotation
            .as_ref()
            .map(|a| a.style.as_str())
            .unwrap_or(SENTINEL)
    }

    pub fn is_annotated(&self) -> bool {
        self.annotation.is_some()
    }
}

/// Partial metrics contributed by a run of pages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetrics {
    pub pages: usize,
    pub images: usize,
    pub title_spans: usize,
    pub fonts: BTreeSet<String>,
    pub text: String,
    pub colors: Vec<Rgb>,
}

impl PageMetrics {
    pub fn from_page(page: &PageRecord) -> Self {
        Self {
            pages: 1,
            images: page.image_count,
            title_spans: page.title_span_count(),
            fonts: page.fonts.clone(),
            text: page.text.clone(),
            colors: page.colors.clone(),
        }
    }

    /// A page that could not be read still counts as a page
    pub fn blank_page() -> Self {
        Self {
            pages: 1,
            ..Self::default()
        }
    }

    pub fn combine(mut self, other: PageMetrics) -> Self {
        self.pages += other.pages;
        self.images += other.images;
        self.title_spans += other.title_spans;
        self.fonts.extend(other.fonts);
        self.text.push_str(&other.text);
        self.colors.extend(other.colors);
        self
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn text_density(&self) -> f64 {
        if self.pages == 0 {
            return 0.0;
        }
        self.char_count() as f64 / (self.pages as f64 * STANDARD_PAGE_AREA)
    }

    pub fn title_density(&self) -> f64 {
        if self.pages == 0 {
            return 0.0;
        }
        self.title_spans as f64 / self.pages as f64 * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    language: String,
    keywords: KeywordExtractor,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

impl FeatureExtractor {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            keywords: KeywordExtractor::default(),
        }
    }

    /// Fold scanned pages into metrics. Unreadable pages contribute
    /// nothing but their page count.
    pub fn fold_pages<I>(&self, doc: &ValidatedDocument, pages: I) -> PageMetrics
    where
        I: IntoIterator,
        I::Item: Borrow<Result<PageRecord, PdfStatError>>,
    {
        pages
            .into_iter()
            .map(|page| page_contribution(doc, page.borrow()))
            .fold(PageMetrics::default(), PageMetrics::combine)
    }

    pub fn extract(&self, doc: &ValidatedDocument, id: DocumentId) -> FeatureRecord {
        self.extract_pages(doc, id, PageScanner::new(doc).pages())
    }

    /// Like [`FeatureExtractor::extract`] for pages the caller already
    /// scanned
    pub fn extract_pages<I>(&self, doc: &ValidatedDocument, id: DocumentId, pages: I) -> FeatureRecord
    where
        I: IntoIterator,
        I::Item: Borrow<Result<PageRecord, PdfStatError>>,
    {
        let metrics = self.fold_pages(doc, pages);

        if metrics.pages == 0 {
            debug!("{}: no pages", doc.path.display());
            return FeatureRecord::empty(id, self.language.clone());
        }

        let mut tally = ColorTally::new();
        tally.extend(metrics.colors.iter().copied());

        let record = FeatureRecord {
            id,
            images_count: metrics.images,
            tables_count: count_tables(doc),
            annotation: None,
            language: self.language.clone(),
            slides_count: metrics.pages,
            text_density: metrics.text_density(),
            keywords: self.keywords.extract(&metrics.text),
            color_palette: tally.palette(),
            title_density: metrics.title_density(),
            fonts: metrics.fonts,
        };

        debug!(
            "{}: {} pages, {} images, {} tables, {} fonts",
            doc.path.display(),
            record.slides_count,
            record.images_count,
            record.tables_count,
            record.fonts.len()
        );
        record
    }
}

fn page_contribution(
    doc: &ValidatedDocument,
    page: &Result<PageRecord, PdfStatError>,
) -> PageMetrics {
    match page {
        Ok(record) => PageMetrics::from_page(record),
        Err(e) => {
            warn!("{}: {}", doc.path.display(), e);
            PageMetrics::blank_page()
        }
    }
}
