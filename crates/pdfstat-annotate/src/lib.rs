//! Design/style annotation of documents
//!
//! A decoupled enrichment stage: it renders the leading pages of every
//! document to images, asks an [`AnnotationProvider`] for design and style
//! labels and produces an identifier-keyed [`pdfstat_core::AnnotationMap`]
//! that the core crate merges into the dataset.

pub mod enrich;
pub mod error;
pub mod excerpt;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod openai;
pub mod provider;
pub mod render;

pub use enrich::{jobs_for, EnrichOptions, Enricher, EnrichmentFailure, EnrichmentOutcome};
pub use error::AnnotationError;
pub use excerpt::{DocumentExcerpt, DEFAULT_EXCERPT_PAGES};
pub use openai::OpenAiProvider;
pub use provider::{parse_annotation, AnnotationProvider, StaticProvider, ANNOTATION_PROMPT};
pub use render::{PageImage, PageRenderer, PdfiumRenderer, DEFAULT_DPI};
