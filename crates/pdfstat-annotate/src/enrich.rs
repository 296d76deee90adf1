//! Bounded annotation fan-out
//!
//! Every document is annotated at most once per run. Calls run with a
//! cap on requests in flight, each under its own timeout, and retryable
//! failures are retried with exponential backoff. Whatever still fails is
//! reported per document; the run itself never fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use pdfstat_core::{Annotation, AnnotationMap, DocumentId, IdentityMap};
use tracing::{debug, info, warn};

use crate::error::AnnotationError;
use crate::excerpt::{DocumentExcerpt, DEFAULT_EXCERPT_PAGES};
use crate::provider::AnnotationProvider;
use crate::render::PageRenderer;

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub pages: usize,
    /// Budget for one provider call
    pub timeout: Duration,
    pub max_in_flight: usize,
    pub max_attempts: u32,
    /// Delay before the first retry, doubled after each one
    pub backoff: Duration,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            pages: DEFAULT_EXCERPT_PAGES,
            timeout: Duration::from_secs(120),
            max_in_flight: 4,
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug)]
pub struct EnrichmentFailure {
    pub id: DocumentId,
    pub path: PathBuf,
    pub error: AnnotationError,
}

#[derive(Debug, Default)]
pub struct EnrichmentOutcome {
    pub annotations: AnnotationMap,
    pub failures: Vec<EnrichmentFailure>,
}

/// One `(id, current path)` job per document of the identity map
pub fn jobs_for(dir: &Path, identities: &IdentityMap) -> Vec<(DocumentId, PathBuf)> {
    identities
        .entries()
        .iter()
        .filter_map(|entry| identities.path_of(dir, entry.id).map(|p| (entry.id, p)))
        .collect()
}

pub struct Enricher {
    provider: Arc<dyn AnnotationProvider>,
    renderer: Arc<dyn PageRenderer>,
    options: EnrichOptions,
}

impl Enricher {
    pub fn new(
        provider: Arc<dyn AnnotationProvider>,
        renderer: Arc<dyn PageRenderer>,
        options: EnrichOptions,
    ) -> Self {
        Self {
            provider,
            renderer,
            options,
        }
    }

    pub async fn run(&self, jobs: Vec<(DocumentId, PathBuf)>) -> EnrichmentOutcome {
        info!(
            "Annotating {} documents with {} ({} in flight)",
            jobs.len(),
            self.provider.name(),
            self.options.max_in_flight.max(1)
        );

        let results: Vec<_> = stream::iter(jobs)
            .map(|(id, path)| async move {
                let result = self.annotate_document(id, path.clone()).await;
                (id, path, result)
            })
            .buffer_unordered(self.options.max_in_flight.max(1))
            .collect()
            .await;

        let mut outcome = EnrichmentOutcome::default();
        for (id, path, result) in results {
            match result {
                Ok(annotation) => {
                    outcome.annotations.insert(id, annotation);
                }
                Err(error) => {
                    warn!("Annotation failed for {} ({}): {}", id, path.display(), error);
                    outcome.failures.push(EnrichmentFailure { id, path, error });
                }
            }
        }
        outcome.failures.sort_by_key(|f| f.id);

        info!(
            "Annotated {} documents, {} failed",
            outcome.annotations.len(),
            outcome.failures.len()
        );
        outcome
    }

    async fn annotate_document(
        &self,
        id: DocumentId,
        path: PathBuf,
    ) -> Result<Annotation, AnnotationError> {
        let pages = self.options.pages;
        let renderer = Arc::clone(&self.renderer);
        let excerpt = tokio::task::spawn_blocking(move || {
            DocumentExcerpt::from_file(id, &path, pages, renderer.as_ref())
        })
        .await
        .map_err(|e| AnnotationError::Excerpt(format!("excerpt task panicked: {}", e)))??;
        self.annotate_with_retry(&excerpt).await
    }

    async fn annotate_with_retry(
        &self,
        excerpt: &DocumentExcerpt,
    ) -> Result<Annotation, AnnotationError> {
        let timeout_ms = self.options.timeout.as_millis() as u64;
        let mut attempt = 1;
        loop {
            let result =
                match tokio::time::timeout(self.options.timeout, self.provider.annotate(excerpt))
                    .await
                {
                    Ok(result) => result,
                    Err(_timeout) => Err(AnnotationError::Timeout(timeout_ms)),
                };

            match result {
                Ok(annotation) => {
                    debug!("{}: annotated on attempt {}", excerpt.id, attempt);
                    return Ok(annotation);
                }
                Err(e) if e.is_retryable() && attempt < self.options.max_attempts => {
                    let delay = self.options.backoff * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        "{}: attempt {} failed ({}), retrying in {:?}",
                        excerpt.id, attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
