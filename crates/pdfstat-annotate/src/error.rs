use pdfstat_core::PdfStatError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rate limited by annotation service: {0}")]
    RateLimited(String),

    #[error("Annotation service error ({status}): {body}")]
    Service { status: u16, body: String },

    #[error("Malformed annotation response: {0}")]
    Format(String),

    #[error("Annotation call timed out after {0}ms")]
    Timeout(u64),

    #[error("Cannot build excerpt: {0}")]
    Excerpt(String),

    #[error("Cannot render page images: {0}")]
    Render(String),

    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),

    #[error(transparent)]
    Core(#[from] PdfStatError),
}

impl AnnotationError {
    /// Failures worth another attempt after backing off
    pub fn is_retryable(&self) -> bool {
        match self {
            AnnotationError::Transport(_)
            | AnnotationError::RateLimited(_)
            | AnnotationError::Timeout(_) => true,
            AnnotationError::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AnnotationError {
    fn from(err: reqwest::Error) -> Self {
        AnnotationError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AnnotationError::RateLimited("slow down".into()).is_retryable());
        assert!(AnnotationError::Timeout(100).is_retryable());
        assert!(AnnotationError::Service {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!AnnotationError::Service {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!AnnotationError::Format("{}".into()).is_retryable());
        assert!(!AnnotationError::MissingApiKey("OPENAI_API_KEY".into()).is_retryable());
        assert!(!AnnotationError::Render("no pdfium".into()).is_retryable());
    }
}
