use std::path::PathBuf;

use thiserror::Error;

use crate::identity::DocumentId;

#[derive(Error, Debug)]
pub enum PdfStatError {
    #[error("Failed to open {path}: {reason}")]
    DocumentOpen { path: PathBuf, reason: String },

    #[error("Page {page} could not be interpreted: {reason}")]
    PageExtraction { page: usize, reason: String },

    #[error("Malformed annotation for {key}: {reason}")]
    AnnotationFormat { key: String, reason: String },

    #[error("Identifier {0} already exists in the dataset")]
    IdentityCollision(DocumentId),

    #[error("Malformed annotation mapping: {0}")]
    MalformedMapping(String),

    #[error("Cannot enumerate input directory {path}: {source}")]
    Enumerate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Processing {path} timed out after {timeout_ms}ms")]
    Timeout { path: PathBuf, timeout_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PdfStatError {
    /// Per-document failures are isolated; everything else ends the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PdfStatError::Enumerate { .. } | PdfStatError::MalformedMapping(_)
        )
    }
}

impl From<serde_json::Error> for PdfStatError {
    fn from(err: serde_json::Error) -> Self {
        PdfStatError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for PdfStatError {
    fn from(err: csv::Error) -> Self {
        PdfStatError::Serialization(err.to_string())
    }
}
