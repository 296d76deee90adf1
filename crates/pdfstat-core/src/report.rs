//! Cleaning report
//!
//! Diagnostic side channel of a batch: which files could not be opened and
//! which pages carry no text. Page numbers are 1-based here, as a reader
//! would count them.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PdfStatError;
use crate::scanner::PageRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub file: String,
    pub empty_pages: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_only_pages: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unreadable_pages: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportEntry {
    fn has_findings(&self) -> bool {
        !self.empty_pages.is_empty() || !self.unreadable_pages.is_empty() || self.error.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CleaningReport {
    pub entries: Vec<ReportEntry>,
}

impl CleaningReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, file: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.file == file)
    }

    pub fn save(&self, path: &Path) -> Result<(), PdfStatError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Cleaning report written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PdfStatError> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

#[derive(Debug, Default)]
pub struct CleaningReportBuilder {
    entries: Vec<ReportEntry>,
}

impl CleaningReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the scan of an opened document. `pages` holds one result per
    /// page in order; an `Err` marks that page unreadable.
    pub fn record_pages<I, E>(&mut self, file: &str, pages: I)
    where
        I: IntoIterator<Item = Result<PageRecord, E>>,
    {
        let mut entry = ReportEntry {
            file: file.to_string(),
            ..ReportEntry::default()
        };

        for (index, page) in pages.into_iter().enumerate() {
            let number = index + 1;
            match page {
                Ok(page) => {
                    if page.is_empty() {
                        entry.empty_pages.push(number);
                    }
                    if page.is_image_only() {
                        entry.image_only_pages.push(number);
                    }
                }
                Err(_) => entry.unreadable_pages.push(number),
            }
        }

        if entry.has_findings() {
            self.entries.push(entry);
        }
    }

    /// Record a document that could not be opened at all
    pub fn record_failure(&mut self, file: &str, error: &PdfStatError) {
        self.entries.push(ReportEntry {
            file: file.to_string(),
            error: Some(error.to_string()),
            ..ReportEntry::default()
        });
    }

    pub fn finish(self) -> CleaningReport {
        CleaningReport {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn page(index: usize, text: &str, images: usize) -> PageRecord {
        PageRecord {
            index,
            text: text.to_string(),
            image_count: images,
            ..PageRecord::default()
        }
    }

    #[test]
    fn test_empty_and_image_only_pages_are_one_based() {
        let mut builder = CleaningReportBuilder::new();
        builder.record_pages::<_, PdfStatError>(
            "deck.pdf",
            vec![
                Ok(page(0, "Title", 0)),
                Ok(page(1, "", 1)),
                Ok(page(2, "  \n", 0)),
            ],
        );
        let report = builder.finish();

        assert_eq!(
            report.entries,
            vec![ReportEntry {
                file: "deck.pdf".to_string(),
                empty_pages: vec![2, 3],
                image_only_pages: vec![2],
                unreadable_pages: vec![],
                error: None,
            }]
        );
    }

    #[test]
    fn test_clean_documents_are_omitted() {
        let mut builder = CleaningReportBuilder::new();
        builder.record_pages::<_, PdfStatError>("clean.pdf", vec![Ok(page(0, "text", 0))]);
        assert!(builder.finish().is_empty());
    }

    #[test]
    fn test_failures_and_unreadable_pages() {
        let mut builder = CleaningReportBuilder::new();
        builder.record_failure(
            "broken.pdf",
            &PdfStatError::DocumentOpen {
                path: PathBuf::from("broken.pdf"),
                reason: "missing %PDF header".to_string(),
            },
        );
        builder.record_pages(
            "partial.pdf",
            vec![
                Ok(page(0, "ok", 0)),
                Err(PdfStatError::PageExtraction {
                    page: 1,
                    reason: "bad".to_string(),
                }),
            ],
        );
        let report = builder.finish();

        assert_eq!(report.len(), 2);
        assert!(report
            .entry("broken.pdf")
            .and_then(|e| e.error.as_deref())
            .unwrap()
            .contains("missing %PDF header"));
        assert_eq!(report.entry("partial.pdf").unwrap().unreadable_pages, vec![2]);
    }

    #[test]
    fn test_serialized_shape() {
        let report = CleaningReport {
            entries: vec![ReportEntry {
                file: "a.pdf".to_string(),
                empty_pages: vec![4],
                ..ReportEntry::default()
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json, serde_json::json!([{"file": "a.pdf", "empty_pages": [4]}]));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaning_report.json");
        let report = CleaningReport {
            entries: vec![ReportEntry {
                file: "x.pdf".to_string(),
                empty_pages: vec![1],
                image_only_pages: vec![1],
                ..ReportEntry::default()
            }],
        };
        report.save(&path).unwrap();
        assert_eq!(CleaningReport::load(&path).unwrap(), report);
    }
}
