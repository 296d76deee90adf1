//! Document validation
//!
//! Opens a file with lopdf and decides whether it is usable at all. A
//! failure is scoped to the one document: the caller records it in the
//! cleaning report and moves on.

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::Document;
use tracing::{debug, warn};

use crate::error::PdfStatError;

/// How far into the file the `%PDF` marker may appear
const HEADER_SEARCH_WINDOW: usize = 1024;

/// A document that opened successfully
#[derive(Debug, Clone)]
pub struct ValidatedDocument {
    pub path: PathBuf,
    pub document: Document,
    pub page_count: usize,
}

pub struct DocumentValidator;

impl DocumentValidator {
    /// Read and parse a file
    pub fn open(path: &Path) -> Result<ValidatedDocument, PdfStatError> {
        let data = fs::read(path).map_err(|e| PdfStatError::DocumentOpen {
            path: path.to_path_buf(),
            reason: format!("unreadable: {}", e),
        })?;
        Self::open_bytes(path, &data)
    }

    /// Parse already-loaded bytes, attributing failures to `path`
    pub fn open_bytes(path: &Path, data: &[u8]) -> Result<ValidatedDocument, PdfStatError> {
        let fail = |reason: String| {
            warn!("{}: Error - {}", path.display(), reason);
            PdfStatError::DocumentOpen {
                path: path.to_path_buf(),
                reason,
            }
        };

        let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
        if !window.windows(4).any(|w| w == b"%PDF") {
            return Err(fail("missing %PDF header".to_string()));
        }

        let document = Document::load_mem(data).map_err(|e| fail(format!("parse error: {}", e)))?;

        if document.is_encrypted() {
            warn!("{} is encrypted; text may not be recoverable", path.display());
        }

        let page_count = document.get_pages().len();
        debug!("{}: OK ({} pages)", path.display(), page_count);

        Ok(ValidatedDocument {
            path: path.to_path_buf(),
            document,
            page_count,
        })
    }
}
