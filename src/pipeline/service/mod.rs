//! The annotation-service boundary.
//!
//! An [`AnnotationService`] takes one document plus one page window and
//! returns the raw annotation text for that window. Parsing, retrying and
//! rate limiting all happen in [`crate::pipeline::client`], so a service
//! implementation only has to make one request and classify its failure.
//!
//! Two backends ship with the crate:
//!
//! * [`mistral::MistralOcrService`]: Mistral's OCR endpoint with a
//!   `document_annotation_format`; the whole PDF is uploaded and the window
//!   is selected with the `pages` parameter.
//! * [`vision::VisionAnnotationService`]: renders the window's pages and
//!   asks any `edgequake-llm` vision model for a schema-shaped JSON object.

pub mod mistral;
pub mod vision;

use crate::error::ServiceError;
use crate::pipeline::input::SourceDocument;
use crate::pipeline::window::PageWindow;
use crate::schema::ResponseSchema;
use async_trait::async_trait;

pub use mistral::{MistralOcrConfig, MistralOcrService};
pub use vision::{VisionAnnotationService, VisionConfig};

/// One request against an external annotation service.
#[async_trait]
pub trait AnnotationService: Send + Sync {
    /// Short name for logs ("mistral-ocr", "vision:gpt-4.1-nano", …).
    fn name(&self) -> String;

    /// Annotate `window` of `document` against `schema`.
    ///
    /// Returns the raw annotation text (expected to be a JSON object).
    async fn submit(
        &self,
        document: &SourceDocument,
        window: &PageWindow,
        schema: &ResponseSchema,
    ) -> Result<String, ServiceError>;
}

/// Classify a provider error message that carries no structured status.
///
/// Providers surface throttling as text ("429 Too Many Requests",
/// "rate limit exceeded"); timeouts and upstream overloads as transient.
pub fn classify_error_text(message: &str) -> ServiceError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("throttl")
    {
        ServiceError::RateLimited {
            retry_after: None,
            detail: message.to_string(),
        }
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("503")
        || lower.contains("502")
        || lower.contains("overloaded")
        || lower.contains("connection")
    {
        ServiceError::Transient(message.to_string())
    } else {
        ServiceError::Permanent(message.to_string())
    }
}
