//! Annotation merging
//!
//! An [`AnnotationMap`] is produced out of process, one entry per
//! identifier. Merging it into a dataset only rewrites the labels of
//! matching rows and is idempotent.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dataset::Dataset;
use crate::error::PdfStatError;
use crate::features::Annotation;
use crate::identity::{DocumentId, IdentityMap};

/// identifier -> annotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationMap {
    entries: BTreeMap<DocumentId, Annotation>,
}

/// Entries dropped while reading a mapping, each an `AnnotationFormat` error
pub type Rejected = Vec<PdfStatError>;

impl AnnotationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: DocumentId, annotation: Annotation) -> Option<Annotation> {
        self.entries.insert(id, annotation)
    }

    pub fn get(&self, id: DocumentId) -> Option<&Annotation> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DocumentId, &Annotation)> {
        self.entries.iter()
    }

    /// Parse either the identifier-keyed form
    /// `{"<id>": {"design": .., "style": ..}}` or the list form
    /// `[{"filename": .., "analysis": {"design": .., "style": ..}}]`.
    ///
    /// Keys and filenames are resolved through `identities`. Anything that
    /// is neither form is a fatal [`PdfStatError::MalformedMapping`]; a bad
    /// entry is skipped and returned in the rejected list.
    pub fn from_json_str(
        input: &str,
        identities: &IdentityMap,
    ) -> Result<(Self, Rejected), PdfStatError> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| PdfStatError::MalformedMapping(format!("not JSON: {}", e)))?;

        let mut map = AnnotationMap::new();
        let mut rejected = Vec::new();

        match value {
            Value::Object(object) => {
                for (key, entry) in &object {
                    let parsed = resolve_key(key, identities)
                        .and_then(|id| annotation_from_value(key, entry).map(|a| (id, a)));
                    map.absorb(parsed, &mut rejected);
                }
            }
            Value::Array(items) => {
                for (position, item) in items.iter().enumerate() {
                    let parsed = list_entry(position, item, identities);
                    map.absorb(parsed, &mut rejected);
                }
            }
            other => {
                return Err(PdfStatError::MalformedMapping(format!(
                    "expected an object or a list, found {}",
                    json_kind(&other)
                )))
            }
        }

        info!(
            "Loaded {} annotations ({} rejected)",
            map.len(),
            rejected.len()
        );
        Ok((map, rejected))
    }

    pub fn load(path: &Path, identities: &IdentityMap) -> Result<(Self, Rejected), PdfStatError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content, identities)
    }

    /// Always written in the identifier-keyed form
    pub fn save(&self, path: &Path) -> Result<(), PdfStatError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn absorb(
        &mut self,
        parsed: Result<(DocumentId, Annotation), PdfStatError>,
        rejected: &mut Rejected,
    ) {
        match parsed {
            Ok((id, annotation)) => {
                if self.insert(id, annotation).is_some() {
                    warn!("Annotation for {} given twice, keeping the last", id);
                }
            }
            Err(e) => {
                warn!("{}", e);
                rejected.push(e);
            }
        }
    }
}

impl FromIterator<(DocumentId, Annotation)> for AnnotationMap {
    fn from_iter<T: IntoIterator<Item = (DocumentId, Annotation)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Read `{"design": .., "style": ..}` out of a JSON value
pub fn annotation_from_value(key: &str, value: &Value) -> Result<Annotation, PdfStatError> {
    let label = |field: &str| -> Result<String, PdfStatError> {
        match value.get(field) {
            Some(Value::String(s)) => Ok(s.trim().to_string()),
            Some(other) => Err(PdfStatError::AnnotationFormat {
                key: key.to_string(),
                reason: format!("'{}' is {}, not a string", field, json_kind(other)),
            }),
            None => Err(PdfStatError::AnnotationFormat {
                key: key.to_string(),
                reason: format!("missing '{}'", field),
            }),
        }
    };
    if !value.is_object() {
        return Err(PdfStatError::AnnotationFormat {
            key: key.to_string(),
            reason: format!("expected an object, found {}", json_kind(value)),
        });
    }
    Ok(Annotation::new(label("design")?, label("style")?))
}

fn resolve_key(key: &str, identities: &IdentityMap) -> Result<DocumentId, PdfStatError> {
    if let Ok(raw) = key.trim().parse::<u32>() {
        return Ok(DocumentId(raw));
    }
    identities
        .resolve_file_name(key)
        .ok_or_else(|| PdfStatError::AnnotationFormat {
            key: key.to_string(),
            reason: "not an identifier or a known filename".to_string(),
        })
}

fn list_entry(
    position: usize,
    item: &Value,
    identities: &IdentityMap,
) -> Result<(DocumentId, Annotation), PdfStatError> {
    let Some(filename) = item.get("filename").and_then(Value::as_str) else {
        return Err(PdfStatError::AnnotationFormat {
            key: format!("entry #{}", position),
            reason: "missing 'filename'".to_string(),
        });
    };
    let id = identities
        .resolve_file_name(filename)
        .ok_or_else(|| PdfStatError::AnnotationFormat {
            key: filename.to_string(),
            reason: "unknown filename".to_string(),
        })?;
    let analysis = item.get("analysis").unwrap_or(&Value::Null);
    Ok((id, annotation_from_value(filename, analysis)?))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Rewrite labels of rows that have an annotation. Returns how many rows
/// matched.
pub fn apply_annotations(dataset: &mut Dataset, annotations: &AnnotationMap) -> usize {
    let mut matched = 0;
    for record in dataset.records_mut() {
        if let Some(annotation) = annotations.get(record.id) {
            record.annotation = Some(annotation.clone());
            matched += 1;
        }
    }
    debug!(
        "Merged {} of {} annotations into {} rows",
        matched,
        annotations.len(),
        dataset.len()
    );
    matched
}

/// Pure form of [`apply_annotations`]
pub fn merge_annotations(mut dataset: Dataset, annotations: &AnnotationMap) -> Dataset {
    apply_annotations(&mut dataset, annotations);
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureRecord, SENTINEL};
    use pretty_assertions::assert_eq;

    fn dataset(ids: &[u32]) -> Dataset {
        let mut dataset = Dataset::new();
        for &id in ids {
            dataset
                .insert(FeatureRecord::empty(DocumentId(id), "English"))
                .unwrap();
        }
        dataset
    }

    fn identities() -> IdentityMap {
        IdentityMap::assign(["intro.pdf", "pitch.pdf", "report.pdf"])
    }

    #[test]
    fn test_only_matching_row_is_updated() {
        let annotations: AnnotationMap = [(DocumentId(1), Annotation::new("minimal", "formal"))]
            .into_iter()
            .collect();
        let merged = merge_annotations(dataset(&[0, 1, 2]), &annotations);

        let row = merged.get(DocumentId(1)).unwrap();
        assert_eq!((row.design(), row.style()), ("minimal", "formal"));
        for id in [0, 2] {
            let row = merged.get(DocumentId(id)).unwrap();
            assert_eq!((row.design(), row.style()), (SENTINEL, SENTINEL));
            assert!(!row.is_annotated());
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let annotations: AnnotationMap = [
            (DocumentId(0), Annotation::new("bold", "casual")),
            (DocumentId(9), Annotation::new("dense", "academic")),
        ]
        .into_iter()
        .collect();
        let once = merge_annotations(dataset(&[0, 1]), &annotations);
        let twice = merge_annotations(once.clone(), &annotations);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_parse_id_keyed_form() {
        let input = r#"{"0": {"design": "minimal", "style": "formal"},
                        "2": {"design": " vivid ", "style": "playful"}}"#;
        let (map, rejected) = AnnotationMap::from_json_str(input, &identities()).unwrap();
        assert!(rejected.is_empty());
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(DocumentId(2)).unwrap().design, "vivid");
    }

    #[test]
    fn test_parse_list_form_resolves_filenames() {
        let input = r#"[
            {"filename": "pitch.pdf", "analysis": {"design": "clean", "style": "formal"}},
            {"filename": "2.pdf", "analysis": {"design": "busy", "style": "casual"}},
            {"filename": "unknown.pdf", "analysis": {"design": "x", "style": "y"}}
        ]"#;
        let (map, rejected) = AnnotationMap::from_json_str(input, &identities()).unwrap();
        assert_eq!(map.get(DocumentId(1)).unwrap().design, "clean");
        assert_eq!(map.get(DocumentId(2)).unwrap().style, "casual");
        assert_eq!(rejected.len(), 1);
        assert!(!rejected[0].is_fatal());
    }

    #[test]
    fn test_list_form_after_rename_uses_canonical_names() {
        let mut identities = IdentityMap::assign(["1.pdf", "a.pdf"]);
        identities.renamed = true;
        let input = r#"[{"filename": "1.pdf", "analysis": {"design": "clean", "style": "formal"}}]"#;
        let (map, rejected) = AnnotationMap::from_json_str(input, &identities).unwrap();
        assert!(rejected.is_empty());
        assert_eq!(map.get(DocumentId(1)).unwrap().design, "clean");
        assert!(map.get(DocumentId(0)).is_none());
    }

    #[test]
    fn test_bad_entry_is_isolated() {
        let input = r#"{"0": {"design": "minimal"}, "1": {"design": "a", "style": "b"}, "2": "flat"}"#;
        let (map, rejected) = AnnotationMap::from_json_str(input, &identities()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(rejected.len(), 2);
        assert!(rejected
            .iter()
            .all(|e| matches!(e, PdfStatError::AnnotationFormat { .. })));
    }

    #[test]
    fn test_malformed_mapping_is_fatal() {
        for input in ["not json", "42", "\"text\"", "null"] {
            let err = AnnotationMap::from_json_str(input, &identities()).unwrap_err();
            assert!(err.is_fatal(), "{} should be fatal", input);
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.json");
        let map: AnnotationMap = [(DocumentId(5), Annotation::new("d", "s"))]
            .into_iter()
            .collect();
        map.save(&path).unwrap();
        let (loaded, rejected) = AnnotationMap::load(&path, &identities()).unwrap();
        assert!(rejected.is_empty());
        assert_eq!(loaded, map);
    }
}
