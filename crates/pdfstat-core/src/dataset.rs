//! Dataset aggregation and its on-disk forms
//!
//! The serialized schema is fixed: downstream loaders read these columns
//! by name. Absent annotations are written as the sentinel label together
//! with `annotated = false`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::PdfStatError;
use crate::features::{Annotation, FeatureRecord};
use crate::identity::DocumentId;

/// Column order of the tabular output
pub const COLUMNS: [&str; 13] = [
    "id",
    "fonts",
    "images_count",
    "tables_count",
    "design",
    "style",
    "annotated",
    "language",
    "slides_count",
    "text_density",
    "keywords",
    "color_palette",
    "title_density",
];

const LIST_SEPARATOR: &str = ", ";

/// Ordered feature records with unique identifiers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<FeatureRecord>,
    ids: HashSet<DocumentId>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. A second record for the same identifier is
    /// rejected and the dataset is left unchanged.
    pub fn insert(&mut self, record: FeatureRecord) -> Result<(), PdfStatError> {
        if !self.ids.insert(record.id) {
            error!(
                "Identity collision: document {} already in dataset, dropping new record",
                record.id
            );
            return Err(PdfStatError::IdentityCollision(record.id));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn get(&self, id: DocumentId) -> Option<&FeatureRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Identifiers are not reachable through this, so uniqueness holds
    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut FeatureRecord> {
        self.records.iter_mut()
    }

    pub fn rows(&self) -> Vec<DatasetRow> {
        self.records.iter().map(DatasetRow::from).collect()
    }

    pub fn from_rows(rows: Vec<DatasetRow>) -> Result<Self, PdfStatError> {
        let mut dataset = Dataset::new();
        for row in rows {
            dataset.insert(FeatureRecord::from(row))?;
        }
        Ok(dataset)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), PdfStatError> {
        fs::write(path, serde_json::to_string_pretty(&self.rows())?)?;
        info!("Wrote {} rows to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self, PdfStatError> {
        let rows: Vec<DatasetRow> = serde_json::from_str(&fs::read_to_string(path)?)?;
        Self::from_rows(rows)
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), PdfStatError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        writer.write_record(COLUMNS)?;
        for row in self.rows() {
            writer.serialize(CsvRow::from(&row))?;
        }
        writer.flush()?;
        info!("Wrote {} rows to {}", self.len(), path.display());
        Ok(())
    }
}

/// Serialized form of a [`FeatureRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub id: DocumentId,
    pub fonts: Vec<String>,
    pub images_count: usize,
    pub tables_count: usize,
    pub design: String,
    pub style: String,
    pub annotated: bool,
    pub language: String,
    pub slides_count: usize,
    pub text_density: f64,
    pub keywords: Vec<String>,
    pub color_palette: Vec<String>,
    pub title_density: f64,
}

impl From<&FeatureRecord> for DatasetRow {
    fn from(record: &FeatureRecord) -> Self {
        Self {
            id: record.id,
            fonts: record.fonts.iter().cloned().collect(),
            images_count: record.images_count,
            tables_count: record.tables_count,
            design: record.design().to_string(),
            style: record.style().to_string(),
            annotated: record.is_annotated(),
            language: record.language.clone(),
            slides_count: record.slides_count,
            text_density: record.text_density,
            keywords: record.keywords.clone(),
            color_palette: record.color_palette.clone(),
            title_density: record.title_density,
        }
    }
}

impl From<DatasetRow> for FeatureRecord {
    fn from(row: DatasetRow) -> Self {
        let annotation = row
            .annotated
            .then(|| Annotation::new(row.design, row.style));
        Self {
            id: row.id,
            fonts: row.fonts.into_iter().collect(),
            images_count: row.images_count,
            tables_count: row.tables_count,
            annotation,
            language: row.language,
            slides_count: row.slides_count,
            text_density: row.text_density,
            keywords: row.keywords,
            color_palette: row.color_palette,
            title_density: row.title_density,
        }
    }
}

/// CSV cells cannot hold lists, so they are joined
#[derive(Serialize)]
struct CsvRow<'a> {
    id: DocumentId,
    fonts: String,
    images_count: usize,
    tables_count: usize,
    design: &'a str,
    style: &'a str,
    annotated: bool,
    language: &'a str,
    slides_count: usize,
    text_density: f64,
    keywords: String,
    color_palette: String,
    title_density: f64,
}

impl<'a> From<&'a DatasetRow> for CsvRow<'a> {
    fn from(row: &'a DatasetRow) -> Self {
        Self {
            id: row.id,
            fonts: row.fonts.join(LIST_SEPARATOR),
            images_count: row.images_count,
            tables_count: row.tables_count,
            design: &row.design,
            style: &row.style,
            annotated: row.annotated,
            language: &row.language,
            slides_count: row.slides_count,
            text_density: row.text_density,
            keywords: row.keywords.join(LIST_SEPARATOR),
            color_palette: row.color_palette.join(LIST_SEPARATOR),
            title_density: row.title_density,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::SENTINEL;
    use pretty_assertions::assert_eq;

    fn record(id: u32) -> FeatureRecord {
        let mut record = FeatureRecord::empty(DocumentId(id), "English");
        record.fonts = ["Arial".to_string(), "Georgia".to_string()]
            .into_iter()
            .collect();
        record.slides_count = 3;
        record.keywords = vec!["growth".to_string(), "market".to_string()];
        record.color_palette = vec!["#ff0000".to_string()];
        record.title_density = 33.5;
        record
    }

    #[test]
    fn test_insert_rejects_duplicate_identifier() {
        let mut dataset = Dataset::new();
        dataset.insert(record(0)).unwrap();
        dataset.insert(record(1)).unwrap();
        let err = dataset.insert(record(0)).unwrap_err();
        assert!(matches!(err, PdfStatError::IdentityCollision(DocumentId(0))));
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_row_renders_sentinel_for_unannotated() {
        let row = DatasetRow::from(&record(4));
        assert_eq!(row.design, SENTINEL);
        assert_eq!(row.style, SENTINEL);
        assert!(!row.annotated);
    }

    #[test]
    fn test_json_preserves_annotation_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");

        let mut annotated = record(1);
        annotated.annotation = Some(Annotation::new("minimal", "formal"));
        let mut dataset = Dataset::new();
        dataset.insert(record(0)).unwrap();
        dataset.insert(annotated).unwrap();

        dataset.write_json(&path).unwrap();
        let loaded = Dataset::load_json(&path).unwrap();
        assert_eq!(loaded, dataset);
        assert_eq!(loaded.get(DocumentId(1)).unwrap().design(), "minimal");
        assert!(!loaded.get(DocumentId(0)).unwrap().is_annotated());
    }

    #[test]
    fn test_csv_has_fixed_columns_and_joined_lists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        let mut dataset = Dataset::new();
        dataset.insert(record(7)).unwrap();
        dataset.write_csv(&path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, COLUMNS.iter().map(|c| c.to_string()).collect::<Vec<_>>());

        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "7");
        assert_eq!(&row[1], "Arial, Georgia");
        assert_eq!(&row[4], SENTINEL);
        assert_eq!(&row[6], "false");
        assert_eq!(&row[10], "growth, market");
        assert_eq!(&row[12], "33.5");
    }

    #[test]
    fn test_from_rows_rejects_duplicates() {
        let rows = vec![DatasetRow::from(&record(2)), DatasetRow::from(&record(2))];
        assert!(Dataset::from_rows(rows).is_err());
    }
}
