//! Configuration loaded from `pdfstat.toml`
//!
//! Every section is optional; missing keys take their defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use pdfstat_annotate::openai::{DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL};
use pdfstat_annotate::{EnrichOptions, DEFAULT_DPI, DEFAULT_EXCERPT_PAGES};
use pdfstat_core::batch::DEFAULT_TIMEOUT_MS;
use pdfstat_core::features::DEFAULT_LANGUAGE;
use pdfstat_core::BatchOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub annotation: AnnotationConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            timeout: Duration::from_millis(self.extraction.timeout_ms),
            concurrency: self.extraction.concurrency.max(1),
            language: self.extraction.language.clone(),
        }
    }

    pub fn enrich_options(&self) -> EnrichOptions {
        EnrichOptions {
            pages: self.annotation.pages.max(1),
            timeout: Duration::from_millis(self.annotation.timeout_ms),
            max_in_flight: self.annotation.max_in_flight.max(1),
            max_attempts: self.annotation.max_attempts.max(1),
            backoff: Duration::from_millis(self.annotation.backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Directory holding the PDFs
    #[serde(default = "default_input_dir")]
    pub dir: PathBuf,
    /// Rename inputs to `<id>.pdf` after assigning identifiers
    #[serde(default)]
    pub rename_on_disk: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: default_input_dir(),
            rename_on_disk: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_dataset_csv")]
    pub dataset_csv: String,
    #[serde(default = "default_dataset_json")]
    pub dataset_json: String,
    #[serde(default = "default_report")]
    pub report: String,
    #[serde(default = "default_identities")]
    pub identities: String,
    #[serde(default = "default_annotations")]
    pub annotations: String,
    #[serde(default = "default_summary")]
    pub summary: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            dataset_csv: default_dataset_csv(),
            dataset_json: default_dataset_json(),
            report: default_report(),
            identities: default_identities(),
            annotations: default_annotations(),
            summary: default_summary(),
        }
    }
}

impl OutputConfig {
    pub fn dataset_csv_path(&self) -> PathBuf {
        self.dir.join(&self.dataset_csv)
    }

    pub fn dataset_json_path(&self) -> PathBuf {
        self.dir.join(&self.dataset_json)
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(&self.report)
    }

    pub fn identities_path(&self) -> PathBuf {
        self.dir.join(&self.identities)
    }

    pub fn annotations_path(&self) -> PathBuf {
        self.dir.join(&self.annotations)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(&self.summary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Per-document budget in milliseconds
    #[serde(default = "default_extraction_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_extraction_timeout_ms(),
            concurrency: default_concurrency(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Leading pages sent per document
    #[serde(default = "default_pages")]
    pub pages: usize,
    /// Resolution the pages are rendered at
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Directory holding the pdfium shared library; the system path when unset
    #[serde(default)]
    pub pdfium_library: Option<PathBuf>,
    #[serde(default = "default_annotation_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            pages: default_pages(),
            dpi: default_dpi(),
            pdfium_library: None,
            timeout_ms: default_annotation_timeout_ms(),
            max_in_flight: default_max_in_flight(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

fn default_dataset_csv() -> String {
    "dataset.csv".to_string()
}

fn default_dataset_json() -> String {
    "dataset.json".to_string()
}

fn default_report() -> String {
    "cleaning_report.json".to_string()
}

fn default_identities() -> String {
    "identifiers.json".to_string()
}

fn default_annotations() -> String {
    "annotations.json".to_string()
}

fn default_summary() -> String {
    "summary.json".to_string()
}

fn default_extraction_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_concurrency() -> usize {
    1
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_pages() -> usize {
    DEFAULT_EXCERPT_PAGES
}

fn default_dpi() -> u32 {
    DEFAULT_DPI
}

fn default_annotation_timeout_ms() -> u64 {
    120_000
}

fn default_max_in_flight() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.input.dir, PathBuf::from("data/raw"));
        assert_eq!(config.annotation.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.annotation.pages, 3);
        assert_eq!(config.annotation.dpi, 100);
        assert_eq!(config.annotation.pdfium_library, None);
        assert_eq!(config.extraction.concurrency, 1);
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
            [input]
            dir = "/srv/decks"
            rename_on_disk = true

            [extraction]
            concurrency = 8

            [annotation]
            base_url = "https://api.vsegpt.ru/v1"
            api_key_env = "OPENAI_KEY"
            pdfium_library = "/opt/pdfium/lib"
        "#;
        let config = Config::from_str(toml).unwrap();
        assert!(config.input.rename_on_disk);
        assert_eq!(config.extraction.concurrency, 8);
        assert_eq!(config.extraction.language, "English");
        assert_eq!(config.annotation.api_key_env, "OPENAI_KEY");
        assert_eq!(config.annotation.model, "gpt-4o-mini");
        assert_eq!(
            config.annotation.pdfium_library,
            Some(PathBuf::from("/opt/pdfium/lib"))
        );
        assert_eq!(
            config.output.dataset_csv_path(),
            PathBuf::from("data/processed/dataset.csv")
        );
    }

    #[test]
    fn test_options_are_clamped() {
        let config = Config::from_str(
            r#"
            [extraction]
            concurrency = 0
            timeout_ms = 250

            [annotation]
            max_in_flight = 0
            max_attempts = 0
        "#,
        )
        .unwrap();
        let batch = config.batch_options();
        assert_eq!(batch.concurrency, 1);
        assert_eq!(batch.timeout, Duration::from_millis(250));
        let enrich = config.enrich_options();
        assert_eq!(enrich.max_in_flight, 1);
        assert_eq!(enrich.max_attempts, 1);
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        assert!(Config::from_str("[input\ndir = 3").is_err());
        assert!(Config::from_str("[extraction]\nconcurrency = \"many\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pdfstat.toml");
        fs::write(&path, "[output]\ndir = \"out\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.output.report_path(), PathBuf::from("out/cleaning_report.json"));
        assert!(Config::from_file(dir.path().join("missing.toml")).is_err());
    }
}
