//! Batch extraction over a directory
//!
//! Each document is opened, scanned and folded on the blocking pool under
//! its own timeout. Results are reduced in one place, in identifier order,
//! into the dataset and the cleaning report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::dataset::Dataset;
use crate::error::PdfStatError;
use crate::features::{FeatureExtractor, FeatureRecord, DEFAULT_LANGUAGE};
use crate::identity::{DocumentId, IdentityMap};
use crate::report::{CleaningReport, CleaningReportBuilder};
use crate::scanner::{PageRecord, PageScanner};
use crate::validator::DocumentValidator;

pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Budget for opening and extracting one document
    pub timeout: Duration,
    /// Documents processed at once; 1 keeps the batch sequential
    pub concurrency: usize,
    pub language: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            concurrency: 1,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

/// A document left out of the dataset
#[derive(Debug)]
pub struct DocumentFailure {
    pub id: DocumentId,
    pub file: String,
    pub error: PdfStatError,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub dataset: Dataset,
    pub report: CleaningReport,
    pub failures: Vec<DocumentFailure>,
}

struct Extracted {
    record: FeatureRecord,
    pages: Vec<Result<PageRecord, PdfStatError>>,
}

fn process_document(
    path: &Path,
    id: DocumentId,
    extractor: &FeatureExtractor,
) -> Result<Extracted, PdfStatError> {
    let doc = DocumentValidator::open(path)?;
    let pages: Vec<_> = PageScanner::new(&doc).pages().collect();
    let record = extractor.extract_pages(&doc, id, &pages);
    Ok(Extracted { record, pages })
}

async fn process_with_timeout(
    path: PathBuf,
    id: DocumentId,
    extractor: Arc<FeatureExtractor>,
    timeout: Duration,
) -> Result<Extracted, PdfStatError> {
    let task_path = path.clone();
    let result = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || process_document(&task_path, id, &extractor)),
    )
    .await;

    match result {
        Ok(Ok(extracted)) => extracted,
        Ok(Err(join_error)) => Err(PdfStatError::DocumentOpen {
            path,
            reason: format!("extraction task panicked: {}", join_error),
        }),
        Err(_timeout) => Err(PdfStatError::Timeout {
            path,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Extract every document of `identities` found under `dir`.
///
/// Per-document failures never abort the batch; they end up in the
/// cleaning report and in [`BatchOutcome::failures`].
pub async fn run_batch(dir: &Path, identities: &IdentityMap, options: &BatchOptions) -> BatchOutcome {
    let extractor = Arc::new(FeatureExtractor::new(options.language.clone()));
    let timeout = options.timeout;
    info!(
        "Extracting {} documents from {} ({} at a time)",
        identities.len(),
        dir.display(),
        options.concurrency.max(1)
    );

    let jobs: Vec<(DocumentId, String, PathBuf)> = identities
        .entries()
        .iter()
        .filter_map(|entry| {
            identities
                .path_of(dir, entry.id)
                .map(|path| (entry.id, entry.original.clone(), path))
        })
        .collect();

    let results: Vec<_> = stream::iter(jobs)
        .map(|(id, file, path)| {
            let extractor = Arc::clone(&extractor);
            async move {
                let result = process_with_timeout(path, id, extractor, timeout).await;
                (id, file, result)
            }
        })
        .buffered(options.concurrency.max(1))
        .collect()
        .await;

    let mut dataset = Dataset::new();
    let mut report = CleaningReportBuilder::new();
    let mut failures = Vec::new();

    for (id, file, result) in results {
        match result {
            Ok(Extracted { record, pages }) => {
                report.record_pages(&file, pages);
                if let Err(error) = dataset.insert(record) {
                    failures.push(DocumentFailure { id, file, error });
                }
            }
            Err(error) => {
                warn!("Skipping {} (id {}): {}", file, id, error);
                report.record_failure(&file, &error);
                failures.push(DocumentFailure { id, file, error });
            }
        }
    }

    info!(
        "Extracted {} documents, {} failed",
        dataset.len(),
        failures.len()
    );

    BatchOutcome {
        dataset,
        report: report.finish(),
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::PdfBuilder;
    use std::fs;

    fn write_fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("deck.pdf"),
            PdfBuilder::new()
                .text_page("Alpha Beta Gamma", 24.0)
                .image_page()
                .build(),
        )
        .unwrap();
        fs::write(dir.path().join("broken.pdf"), b"this is not a pdf").unwrap();
        fs::write(
            dir.path().join("memo.pdf"),
            PdfBuilder::new().text_page("Budget memo", 11.0).build(),
        )
        .unwrap();
        fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let dir = write_fixture_dir();
        let identities = IdentityMap::scan(dir.path()).unwrap();
        assert_eq!(identities.len(), 3);

        let outcome = run_batch(dir.path(), &identities, &BatchOptions::default()).await;

        assert_eq!(outcome.dataset.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].file, "broken.pdf");
        assert!(!outcome.failures[0].error.is_fatal());

        let broken = outcome.report.entry("broken.pdf").unwrap();
        assert!(broken.error.is_some());
        let deck = outcome.report.entry("deck.pdf").unwrap();
        assert_eq!(deck.empty_pages, vec![2]);
        assert_eq!(deck.image_only_pages, vec![2]);
        assert!(outcome.report.entry("memo.pdf").is_none());
    }

    #[tokio::test]
    async fn test_dataset_follows_identifier_order() {
        let dir = write_fixture_dir();
        let identities = IdentityMap::scan(dir.path()).unwrap();
        let options = BatchOptions {
            concurrency: 4,
            ..BatchOptions::default()
        };
        let outcome = run_batch(dir.path(), &identities, &options).await;

        let ids: Vec<DocumentId> = outcome.dataset.records().iter().map(|r| r.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        let deck_id = identities.id_of("deck.pdf").unwrap();
        let deck = outcome.dataset.get(deck_id).unwrap();
        assert_eq!(deck.title_density, 50.0);
        assert!(deck.images_count >= 1);
    }

    #[tokio::test]
    async fn test_renamed_files_are_found() {
        let dir = write_fixture_dir();
        let mut identities = IdentityMap::scan(dir.path()).unwrap();
        identities.rename_on_disk(dir.path()).unwrap();

        let outcome = run_batch(dir.path(), &identities, &BatchOptions::default()).await;
        assert_eq!(outcome.dataset.len(), 2);
        // Report keeps original names
        assert!(outcome.report.entry("deck.pdf").is_some());
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let identities = IdentityMap::scan(dir.path()).unwrap();
        let outcome = run_batch(dir.path(), &identities, &BatchOptions::default()).await;
        assert!(outcome.dataset.is_empty());
        assert!(outcome.report.is_empty());
    }
}
