//! OpenAI-compatible chat completions provider
//!
//! Works against any endpoint speaking the vision flavour of the
//! `/chat/completions` protocol. Each rendered page is attached as an
//! `image_url` part after the fixed instruction.

use async_trait::async_trait;
use pdfstat_core::Annotation;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AnnotationError;
use crate::excerpt::DocumentExcerpt;
use crate::provider::{parse_annotation, AnnotationProvider, ANNOTATION_PROMPT};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Vision detail level requested for every page image
pub const DEFAULT_IMAGE_DETAIL: &str = "low";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<Content>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Content {
    Text { r#type: String, text: String },
    Image { r#type: String, image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    model: String,
    detail: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            detail: DEFAULT_IMAGE_DETAIL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Read the key from the named environment variable
    pub fn from_env(var: &str) -> Result<Self, AnnotationError> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key.trim())),
            _ => Err(AnnotationError::MissingApiKey(var.to_string())),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// `low`, `high` or `auto`
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(&self, excerpt: &DocumentExcerpt) -> ChatRequest {
        let mut content = vec![Content::Text {
            r#type: "text".to_string(),
            text: ANNOTATION_PROMPT.to_string(),
        }];
        content.extend(excerpt.image_urls().into_iter().map(|url| Content::Image {
            r#type: "image_url".to_string(),
            image_url: ImageUrl {
                url,
                detail: self.detail.clone(),
            },
        }));

        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content,
            }],
            temperature: 0.0,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
        }
    }
}

fn reply_content(response: ChatResponse) -> Result<String, AnnotationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| AnnotationError::Format("response has no message content".into()))
}

#[async_trait]
impl AnnotationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn annotate(&self, excerpt: &DocumentExcerpt) -> Result<Annotation, AnnotationError> {
        let request = self.build_request(excerpt);
        debug!(
            "Requesting annotation for {} ({} pages) from {}",
            excerpt.file_name,
            excerpt.page_count(),
            self.model
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(AnnotationError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnnotationError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnnotationError::Format(format!("unreadable response: {}", e)))?;
        parse_annotation(&reply_content(chat_response)?)
    }
}
