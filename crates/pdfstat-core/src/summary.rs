//! Presentation-side summaries of a dataset
//!
//! Font names stay raw in the dataset. Grouping them into families, with
//! style suffixes removed, happens only here.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::content::strip_subset_tag;
use crate::dataset::Dataset;

const STYLE_SUFFIXES: [&str; 5] = ["Bold", "Italic", "BoldItalic", "Light", "Regular"];

/// Family part of a raw font name: `ABCDEF+Roboto-BoldItalic` -> `Roboto`
pub fn font_family(raw: &str) -> String {
    let name = strip_subset_tag(raw);
    let kept: Vec<&str> = name
        .split(|c: char| c == '-' || c == ',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && !STYLE_SUFFIXES.contains(part))
        .collect();
    if kept.is_empty() {
        name.trim().to_string()
    } else {
        kept.join("-")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountEntry {
    pub value: String,
    pub count: usize,
}

fn ranked(counts: HashMap<String, usize>) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> = counts
        .into_iter()
        .map(|(value, count)| CountEntry { value, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    entries
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub documents: usize,
    /// Documents using each font family
    pub font_families: Vec<CountEntry>,
    pub keywords: Vec<CountEntry>,
    pub designs: Vec<CountEntry>,
    pub images_count: Vec<CountEntry>,
    pub tables_count: Vec<CountEntry>,
    /// Percentage of rows carrying an annotation
    pub annotation_completeness: f64,
    pub mean_text_density: f64,
    pub mean_title_density: f64,
}

impl DatasetSummary {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let mut families = HashMap::new();
        let mut keywords = HashMap::new();
        let mut designs = HashMap::new();
        let mut images = HashMap::new();
        let mut tables = HashMap::new();
        let mut annotated = 0;
        let mut text_density = 0.0;
        let mut title_density = 0.0;

        for record in dataset.records() {
            let record_families: BTreeSet<String> =
                record.fonts.iter().map(|f| font_family(f)).collect();
            for family in record_families {
                *families.entry(family).or_insert(0) += 1;
            }
            for keyword in &record.keywords {
                *keywords.entry(keyword.clone()).or_insert(0) += 1;
            }
            *designs.entry(record.design().to_string()).or_insert(0) += 1;
            *images.entry(record.images_count.to_string()).or_insert(0) += 1;
            *tables.entry(record.tables_count.to_string()).or_insert(0) += 1;
            if record.is_annotated() {
                annotated += 1;
            }
            text_density += record.text_density;
            title_density += record.title_density;
        }

        let documents = dataset.len();
        let share = |part: f64| {
            if documents == 0 {
                0.0
            } else {
                part / documents as f64
            }
        };

        Self {
            documents,
            font_families: ranked(families),
            keywords: ranked(keywords),
            designs: ranked(designs),
            images_count: ranked(images),
            tables_count: ranked(tables),
            annotation_completeness: share(annotated as f64) * 100.0,
            mean_text_density: share(text_density),
            mean_title_density: share(title_density),
        }
    }
}
