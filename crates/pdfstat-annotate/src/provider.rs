//! Annotation providers

use async_trait::async_trait;
use pdfstat_core::merge::annotation_from_value;
use pdfstat_core::{Annotation, AnnotationMap};
use serde_json::Value;

use crate::error::AnnotationError;
use crate::excerpt::DocumentExcerpt;

/// Fixed instruction sent with every excerpt
pub const ANNOTATION_PROMPT: &str = "Analyze these pages and return the design style and text style. \
The response should be structured strictly as a JSON object: {\"design\": \"\",\"style\": \"\"}";

/// Something that labels a document's design and style from its first pages
#[async_trait]
pub trait AnnotationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn annotate(&self, excerpt: &DocumentExcerpt) -> Result<Annotation, AnnotationError>;
}

/// First JSON object in a model reply. Code fences and prose around it
/// are skipped; a `{` that does not open a valid object is passed over.
pub fn extract_json(reply: &str) -> Option<Value> {
    reply.match_indices('{').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&reply[start..])
            .into_iter::<Value>()
            .next()
            .and_then(Result::ok)
            .filter(Value::is_object)
    })
}

/// Parse a `{"design": .., "style": ..}` reply
pub fn parse_annotation(reply: &str) -> Result<Annotation, AnnotationError> {
    let value = extract_json(reply).ok_or_else(|| {
        AnnotationError::Format(format!(
            "no JSON object in reply: {}",
            reply.chars().take(200).collect::<String>()
        ))
    })?;
    annotation_from_value("reply", &value).map_err(|e| AnnotationError::Format(e.to_string()))
}

/// Answers from an annotation map produced earlier
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    annotations: AnnotationMap,
}

impl StaticProvider {
    pub fn new(annotations: AnnotationMap) -> Self {
        Self { annotations }
    }
}

#[async_trait]
impl AnnotationProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn annotate(&self, excerpt: &DocumentExcerpt) -> Result<Annotation, AnnotationError> {
        self.annotations
            .get(excerpt.id)
            .cloned()
            .ok_or_else(|| AnnotationError::Format(format!("no annotation for {}", excerpt.id)))
    }
}
