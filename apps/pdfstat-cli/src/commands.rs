//! Subcommand implementations

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use pdfstat_annotate::{
    jobs_for, AnnotationProvider, Enricher, OpenAiProvider, PageRenderer, PdfiumRenderer,
};
use pdfstat_core::{
    apply_annotations, run_batch, AnnotationMap, Dataset, DatasetSummary, IdentityMap,
};
use tracing::{info, warn};

use crate::config::Config;

fn write_dataset(config: &Config, dataset: &Dataset) -> Result<()> {
    dataset
        .write_csv(&config.output.dataset_csv_path())
        .context("Failed to write dataset CSV")?;
    dataset
        .write_json(&config.output.dataset_json_path())
        .context("Failed to write dataset JSON")?;
    Ok(())
}

fn load_identities(config: &Config) -> Result<IdentityMap> {
    let path = config.output.identities_path();
    IdentityMap::load(&path).with_context(|| {
        format!(
            "Failed to load identifiers from {} (run `pdfstat extract` first)",
            path.display()
        )
    })
}

fn load_dataset(config: &Config) -> Result<Dataset> {
    let path = config.output.dataset_json_path();
    Dataset::load_json(&path)
        .with_context(|| format!("Failed to load dataset from {}", path.display()))
}

/// Assign identifiers, extract features, write dataset and cleaning report
pub async fn extract(config: &Config) -> Result<Dataset> {
    let input = &config.input.dir;
    let mut identities = IdentityMap::scan(input)?;

    fs::create_dir_all(&config.output.dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output.dir.display()
        )
    })?;

    let identities_path = config.output.identities_path();
    identities.save(&identities_path)?;
    if config.input.rename_on_disk {
        identities
            .rename_on_disk(input)
            .context("Failed to rename inputs; originals were restored")?;
        identities.save(&identities_path)?;
    }

    let outcome = run_batch(input, &identities, &config.batch_options()).await;
    for failure in &outcome.failures {
        warn!("{} (id {}): {}", failure.file, failure.id, failure.error);
    }

    outcome.report.save(&config.output.report_path())?;
    write_dataset(config, &outcome.dataset)?;

    info!(
        "Extraction complete: {} rows, {} report entries",
        outcome.dataset.len(),
        outcome.report.len()
    );
    Ok(outcome.dataset)
}

/// Annotate every extracted document and write the annotation map
pub async fn annotate(
    config: &Config,
    provider: Arc<dyn AnnotationProvider>,
    renderer: Arc<dyn PageRenderer>,
) -> Result<AnnotationMap> {
    let identities = load_identities(config)?;
    let dataset = load_dataset(config)?;

    // Only documents that made it into the dataset are worth a call
    let jobs: Vec<_> = jobs_for(&config.input.dir, &identities)
        .into_iter()
        .filter(|(id, _)| dataset.get(*id).is_some())
        .collect();

    let outcome = Enricher::new(provider, renderer, config.enrich_options())
        .run(jobs)
        .await;
    for failure in &outcome.failures {
        warn!(
            "No annotation for {} ({}): {}",
            failure.id,
            failure.path.display(),
            failure.error
        );
    }

    outcome
        .annotations
        .save(&config.output.annotations_path())
        .context("Failed to write annotations")?;
    Ok(outcome.annotations)
}

pub fn openai_provider(config: &Config) -> Result<Arc<dyn AnnotationProvider>> {
    let provider = OpenAiProvider::from_env(&config.annotation.api_key_env)?
        .with_base_url(&config.annotation.base_url)
        .with_model(&config.annotation.model);
    Ok(Arc::new(provider))
}

pub fn pdfium_renderer(config: &Config) -> Result<Arc<dyn PageRenderer>> {
    let renderer = PdfiumRenderer::new(
        config.annotation.dpi,
        config.annotation.pdfium_library.clone(),
    )?;
    Ok(Arc::new(renderer))
}

/// Merge an annotation file into the dataset and rewrite it
pub fn merge(config: &Config, annotations: &Path) -> Result<Dataset> {
    let identities = load_identities(config)?;
    let mut dataset = load_dataset(config)?;

    let (map, rejected) = AnnotationMap::load(annotations, &identities)
        .with_context(|| format!("Cannot merge {}", annotations.display()))?;
    if !rejected.is_empty() {
        warn!("{} annotation entries were rejected", rejected.len());
    }

    let matched = apply_annotations(&mut dataset, &map);
    info!(
        "Merged annotations into {} of {} rows",
        matched,
        dataset.len()
    );

    write_dataset(config, &dataset)?;
    Ok(dataset)
}

/// Extract, annotate when a provider is available, then merge
pub async fn run(config: &Config, skip_annotation: bool) -> Result<Dataset> {
    let dataset = extract(config).await?;

    if skip_annotation {
        info!("Annotation skipped");
        return Ok(dataset);
    }

    let (provider, renderer) = match (openai_provider(config), pdfium_renderer(config)) {
        (Ok(provider), Ok(renderer)) => (provider, renderer),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Annotation skipped: {:#}", e);
            return Ok(dataset);
        }
    };
    annotate(config, provider, renderer).await?;
    merge(config, &config.output.annotations_path())
}

/// Print and save distributions of the current dataset
pub fn summary(config: &Config) -> Result<DatasetSummary> {
    let dataset = load_dataset(config)?;
    if dataset.is_empty() {
        bail!("Dataset {} is empty", config.output.dataset_json_path().display());
    }

    let summary = DatasetSummary::from_dataset(&dataset);
    let json = serde_json::to_string_pretty(&summary)?;
    fs::write(config.output.summary_path(), &json)?;
    println!("{}", json);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfstat_annotate::fixtures::PlaceholderRenderer;
    use pdfstat_annotate::StaticProvider;
    use pdfstat_core::fixtures::PdfBuilder;
    use pdfstat_core::{Annotation, SENTINEL};
    use pretty_assertions::assert_eq;

    fn setup() -> (tempfile::TempDir, Config) {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("raw");
        fs::create_dir(&input).unwrap();
        fs::write(
            input.join("deck.pdf"),
            PdfBuilder::new()
                .text_page("Alpha Beta Gamma", 24.0)
                .image_page()
                .build(),
        )
        .unwrap();
        fs::write(input.join("corrupt.pdf"), b"garbage").unwrap();

        let mut config = Config::default();
        config.input.dir = input;
        config.output.dir = root.path().join("out");
        config.annotation.backoff_ms = 1;
        (root, config)
    }

    #[tokio::test]
    async fn test_extract_writes_artifacts() {
        let (_root, config) = setup();
        let dataset = extract(&config).await.unwrap();

        assert_eq!(dataset.len(), 1);
        assert!(config.output.dataset_csv_path().exists());
        assert!(config.output.report_path().exists());
        let identities = IdentityMap::load(&config.output.identities_path()).unwrap();
        assert_eq!(identities.len(), 2);
        assert_eq!(load_dataset(&config).unwrap(), dataset);
    }

    #[tokio::test]
    async fn test_extract_with_rename() {
        let (_root, mut config) = setup();
        config.input.rename_on_disk = true;
        extract(&config).await.unwrap();

        let identities = IdentityMap::load(&config.output.identities_path()).unwrap();
        assert!(identities.renamed);
        assert!(config.input.dir.join("0.pdf").exists());
        assert!(config.input.dir.join("1.pdf").exists());
        assert!(!config.input.dir.join("deck.pdf").exists());
    }

    #[tokio::test]
    async fn test_extract_failed_rename_keeps_originals() {
        let (_root, mut config) = setup();
        config.input.rename_on_disk = true;
        // directories are not inputs, but they block the canonical names
        fs::create_dir(config.input.dir.join("0.pdf")).unwrap();
        fs::create_dir(config.input.dir.join("1.pdf")).unwrap();

        assert!(extract(&config).await.is_err());

        let identities = IdentityMap::load(&config.output.identities_path()).unwrap();
        assert!(!identities.renamed);
        assert_eq!(identities.len(), 2);
        let mut names: Vec<String> = fs::read_dir(&config.input.dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["0.pdf", "1.pdf", "corrupt.pdf", "deck.pdf"]);
    }

    #[tokio::test]
    async fn test_extract_missing_input_is_fatal() {
        let (_root, mut config) = setup();
        config.input.dir = config.input.dir.join("nope");
        assert!(extract(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_annotate_then_merge() {
        let (_root, config) = setup();
        extract(&config).await.unwrap();
        let identities = load_identities(&config).unwrap();
        let deck = identities.id_of("deck.pdf").unwrap();
        let corrupt = identities.id_of("corrupt.pdf").unwrap();

        let provider = StaticProvider::new(
            [
                (deck, Annotation::new("minimal", "formal")),
                (corrupt, Annotation::new("x", "y")),
            ]
            .into_iter()
            .collect(),
        );
        let annotations = annotate(&config, Arc::new(provider), Arc::new(PlaceholderRenderer))
            .await
            .unwrap();
        // The corrupt document never reached the dataset, so it is not sent
        assert_eq!(annotations.len(), 1);

        let merged = merge(&config, &config.output.annotations_path()).unwrap();
        let row = merged.get(deck).unwrap();
        assert_eq!((row.design(), row.style()), ("minimal", "formal"));
    }

    #[tokio::test]
    async fn test_merge_list_form_by_filename() {
        let (root, config) = setup();
        extract(&config).await.unwrap();
        let path = root.path().join("analysis.json");
        fs::write(
            &path,
            r#"[{"filename": "deck.pdf", "analysis": {"design": "clean", "style": "bold"}}]"#,
        )
        .unwrap();

        let merged = merge(&config, &path).unwrap();
        assert_eq!(merged.records()[0].design(), "clean");
    }

    #[tokio::test]
    async fn test_malformed_mapping_aborts_merge() {
        let (root, config) = setup();
        extract(&config).await.unwrap();
        let path = root.path().join("bad.json");
        fs::write(&path, "42").unwrap();

        assert!(merge(&config, &path).is_err());
        // Dataset on disk is untouched
        let dataset = load_dataset(&config).unwrap();
        assert_eq!(dataset.records()[0].design(), SENTINEL);
    }

    #[tokio::test]
    async fn test_run_without_annotation_and_summary() {
        let (_root, config) = setup();
        let dataset = run(&config, true).await.unwrap();
        assert_eq!(dataset.len(), 1);

        let summary = summary(&config).unwrap();
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.annotation_completeness, 0.0);
        assert!(config.output.summary_path().exists());
    }
}
