//! PDF feature extraction and annotation merging
//!
//! This crate turns a directory of PDFs into a per-document feature
//! dataset using lopdf:
//! - `batch::run_batch`: validate, scan and extract every document, with a cleaning report on the side
//! - `merge::merge_annotations`: fold externally produced design/style labels into the dataset
//! - `summary::DatasetSummary`: distributions for presentation

pub mod batch;
pub mod content;
pub mod dataset;
pub mod error;
pub mod features;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod identity;
pub mod keywords;
pub mod merge;
pub mod palette;
pub mod report;
pub mod scanner;
pub mod summary;
pub mod tables;
pub mod validator;

pub use batch::{run_batch, BatchOptions, BatchOutcome, DocumentFailure};
pub use dataset::{Dataset, DatasetRow};
pub use error::PdfStatError;
pub use features::{Annotation, FeatureExtractor, FeatureRecord, SENTINEL};
pub use identity::{DocumentId, IdentityMap};
pub use merge::{apply_annotations, merge_annotations, AnnotationMap};
pub use report::{CleaningReport, CleaningReportBuilder, ReportEntry};
pub use scanner::{PageRecord, PageScanner};
pub use summary::DatasetSummary;
pub use validator::{DocumentValidator, ValidatedDocument};
