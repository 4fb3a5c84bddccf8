//! Mistral OCR document annotation.
//!
//! The whole PDF is uploaded as a base64 data URL on every call and the
//! window is selected with `pages`. The service answers with OCR pages plus a
//! `document_annotation` string shaped by `document_annotation_format`; only
//! the annotation is kept.

use super::AnnotationService;
use crate::error::{Pdf2RecError, ServiceError};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::window::PageWindow;
use crate::schema::ResponseSchema;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";
pub const DEFAULT_MODEL: &str = "mistral-ocr-latest";

#[derive(Clone)]
pub struct MistralOcrConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for MistralOcrConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralOcrConfig")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl MistralOcrConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Read `MISTRAL_API_KEY` (required), `MISTRAL_BASE_URL` and `MISTRAL_OCR_MODEL`.
    pub fn from_env() -> Result<Self, Pdf2RecError> {
        let api_key = std::env::var("MISTRAL_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Pdf2RecError::ProviderNotConfigured {
                provider: "mistral".into(),
                hint: "Set MISTRAL_API_KEY.".into(),
            })?;
        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("MISTRAL_BASE_URL") {
            if !url.is_empty() {
                config.base_url = url;
            }
        }
        if let Ok(model) = std::env::var("MISTRAL_OCR_MODEL") {
            if !model.is_empty() {
                config.model = model;
            }
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: DocumentUrl,
    pages: Vec<usize>,
    document_annotation_format: AnnotationFormat<'a>,
    include_image_base64: bool,
}

#[derive(Debug, Serialize)]
struct DocumentUrl {
    #[serde(rename = "type")]
    kind: &'static str,
    document_url: String,
}

#[derive(Debug, Serialize)]
struct AnnotationFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    document_annotation: Option<String>,
}

/// [`AnnotationService`] backed by `POST {base_url}/v1/ocr`.
#[derive(Debug, Clone)]
pub struct MistralOcrService {
    http: reqwest::Client,
    config: MistralOcrConfig,
}

impl MistralOcrService {
    pub fn new(config: MistralOcrConfig) -> Result<Self, Pdf2RecError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Pdf2RecError::ProviderNotConfigured {
                provider: "mistral".into(),
                hint: format!("HTTP client: {e}"),
            })?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/ocr", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AnnotationService for MistralOcrService {
    fn name(&self) -> String {
        format!("mistral:{}", self.config.model)
    }

    async fn submit(
        &self,
        document: &SourceDocument,
        window: &PageWindow,
        schema: &ResponseSchema,
    ) -> Result<String, ServiceError> {
        let body = OcrRequest {
            model: &self.config.model,
            document: DocumentUrl {
                kind: "document_url",
                document_url: format!(
                    "data:application/pdf;base64,{}",
                    STANDARD.encode(document.content.as_slice())
                ),
            },
            pages: window.pages().collect(),
            document_annotation_format: AnnotationFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &schema.name,
                    schema: &schema.schema,
                    strict: true,
                },
            },
            include_image_base64: false,
        };

        trace!(doc = %document.name, window = %window, "POST {}", self.endpoint());
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &text));
        }

        let parsed: OcrResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Permanent(format!("undecodable OCR response: {e}")))?;
        let annotation = parsed.document_annotation.unwrap_or_default();
        debug!(doc = %document.name, window = %window, bytes = annotation.len(), "OCR annotation received");
        Ok(annotation)
    }
}

fn classify_request_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ServiceError::Transient(e.to_string())
    } else {
        ServiceError::Permanent(e.to_string())
    }
}

/// Map a non-success HTTP status onto the service error taxonomy.
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ServiceError {
    let detail = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", truncate(body, 300))
    };
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            ServiceError::RateLimited {
                retry_after,
                detail,
            }
        }
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            ServiceError::Transient(detail)
        }
        _ => ServiceError::Permanent(detail),
    }
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(2)), ""),
            ServiceError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(2)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, None, "busy"),
            ServiceError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None, ""),
            ServiceError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, None, "bad schema"),
            ServiceError::Permanent(d) if d.contains("bad schema")
        ));
    }

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after(" 3 "), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("0.5"), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn request_body_shape() {
        let schema = json!({"type": "object", "properties": {"Title": {"type": "string"}}});
        let body = OcrRequest {
            model: DEFAULT_MODEL,
            document: DocumentUrl {
                kind: "document_url",
                document_url: "data:application/pdf;base64,AAAA".into(),
            },
            pages: vec![8, 9, 10],
            document_annotation_format: AnnotationFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "study",
                    schema: &schema,
                    strict: true,
                },
            },
            include_image_base64: false,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["model"], "mistral-ocr-latest");
        assert_eq!(v["document"]["type"], "document_url");
        assert_eq!(v["pages"], json!([8, 9, 10]));
        assert_eq!(v["document_annotation_format"]["type"], "json_schema");
        assert_eq!(v["document_annotation_format"]["json_schema"]["name"], "study");
        assert_eq!(v["include_image_base64"], false);
    }

    #[test]
    fn debug_redacts_key() {
        let cfg = MistralOcrConfig::new("sk-secret");
        assert!(!format!("{cfg:?}").contains("sk-secret"));
    }

    fn doc() -> SourceDocument {
        SourceDocument {
            identity: Fingerprint::from_name("a.pdf"),
            name: "a.pdf".into(),
            page_count: 3,
            content: Arc::new(b"%PDF-1.7 fake".to_vec()),
        }
    }

    /// Submit pages `[start, end)` of [`doc`] to a service pointed at `server`.
    async fn submit_to(server: &MockServer, start: usize, end: usize) -> Result<String, ServiceError> {
        let service =
            MistralOcrService::new(MistralOcrConfig::new("k").with_base_url(server.uri())).unwrap();
        let schema = ResponseSchema::new("s", json!({"type": "object"}));
        let d = doc();
        service
            .submit(&d, &PageWindow::new(d.identity.clone(), start, end), &schema)
            .await
    }

    async fn respond_with(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/ocr"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn returns_document_annotation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/ocr"))
            .and(header("authorization", "Bearer k"))
            .and(body_partial_json(json!({
                "model": DEFAULT_MODEL,
                "pages": [1, 2],
                "include_image_base64": false,
                "document_annotation_format": {"type": "json_schema"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pages": [],
                "document_annotation": r#"{"Title": "X"}"#
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = submit_to(&server, 1, 3).await.unwrap();
        assert_eq!(out, r#"{"Title": "X"}"#);
    }

    #[tokio::test]
    async fn throttling_carries_retry_after() {
        let server = respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7")).await;
        let err = submit_to(&server, 0, 1).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::RateLimited {
                retry_after: Some(Duration::from_secs(7)),
                detail: "HTTP 429 Too Many Requests".into(),
            }
        );
    }

    #[tokio::test]
    async fn unavailable_is_rate_limited() {
        let server = respond_with(ResponseTemplate::new(503).set_body_string("overloaded")).await;
        let err = submit_to(&server, 0, 1).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::RateLimited {
                retry_after: None,
                detail: "HTTP 503 Service Unavailable: overloaded".into(),
            }
        );
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = respond_with(ResponseTemplate::new(500).set_body_string("boom")).await;
        let err = submit_to(&server, 0, 1).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::Transient("HTTP 500 Internal Server Error: boom".into())
        );
    }

    #[tokio::test]
    async fn bad_request_is_permanent() {
        let server = respond_with(ResponseTemplate::new(400).set_body_string("invalid schema")).await;
        let err = submit_to(&server, 0, 1).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::Permanent("HTTP 400 Bad Request: invalid schema".into())
        );
    }

    #[tokio::test]
    async fn unreasonable_retry_after_is_ignored() {
        let server = respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1e30")).await;
        let err = submit_to(&server, 0, 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited { retry_after: None, .. }));
    }
}
