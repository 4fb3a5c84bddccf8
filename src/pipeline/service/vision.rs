//! Vision-model annotation through `edgequake-llm`.
//!
//! Each call renders the window's pages, attaches them as PNG images, and
//! asks the model for a JSON object matching the schema. Provider errors
//! arrive as text, so they are classified with
//! [`super::classify_error_text`].

use super::{classify_error_text, AnnotationService};
use crate::error::{Pdf2RecError, ServiceError};
use crate::pipeline::encode::encode_window;
use crate::pipeline::input::SourceDocument;
use crate::pipeline::render::render_window;
use crate::pipeline::window::PageWindow;
use crate::prompts::{window_instruction, DEFAULT_SYSTEM_PROMPT};
use crate::schema::ResponseSchema;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// Vision backend settings.
#[derive(Clone)]
pub struct VisionConfig {
    /// Pre-built provider; takes priority over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,
    /// Provider name for `ProviderFactory` ("openai", "anthropic", "gemini", …).
    pub provider_name: Option<String>,
    pub model: Option<String>,
    /// Longest rendered edge in pixels.
    pub max_rendered_pixels: u32,
    pub temperature: f32,
    pub max_tokens: usize,
    pub system_prompt: Option<String>,
    /// Password for encrypted PDFs; used when re-opening pages to render.
    pub password: Option<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: None,
            provider_name: None,
            model: None,
            max_rendered_pixels: 2000,
            temperature: 0.0,
            max_tokens: 4096,
            system_prompt: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionConfig")
            .field("provider", &self.provider.as_ref().map(|_| "<provider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// [`AnnotationService`] that sends rendered pages to a vision LLM.
pub struct VisionAnnotationService {
    provider: Arc<dyn LLMProvider>,
    config: VisionConfig,
    label: String,
}

impl VisionAnnotationService {
    /// Resolve the provider and build the service.
    pub fn new(config: VisionConfig) -> Result<Self, Pdf2RecError> {
        let provider = resolve_provider(&config)?;
        let label = match (&config.provider_name, &config.model) {
            (Some(p), Some(m)) => format!("vision:{p}/{m}"),
            (None, Some(m)) => format!("vision:{m}"),
            (Some(p), None) => format!("vision:{p}"),
            (None, None) => "vision".to_string(),
        };
        Ok(Self {
            provider,
            config,
            label,
        })
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl AnnotationService for VisionAnnotationService {
    fn name(&self) -> String {
        self.label.clone()
    }

    async fn submit(
        &self,
        document: &SourceDocument,
        window: &PageWindow,
        schema: &ResponseSchema,
    ) -> Result<String, ServiceError> {
        let pages = render_window(
            Arc::clone(&document.content),
            &document.name,
            self.config.password.clone(),
            window,
            self.config.max_rendered_pixels,
        )
        .await
        .map_err(|e| ServiceError::Permanent(e.to_string()))?;
        let images = encode_window(&pages).map_err(|e| ServiceError::Permanent(e.to_string()))?;

        let system_prompt = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images(
                window_instruction(
                    &schema.name,
                    &schema.to_compact_string(),
                    window.start + 1,
                    window.end,
                ),
                images,
            ),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| classify_error_text(&e.to_string()))?;
        debug!(
            doc = %document.name,
            window = %window,
            input_tokens = response.prompt_tokens,
            output_tokens = response.completion_tokens,
            "vision annotation received"
        );
        Ok(response.content)
    }
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2RecError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2RecError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the provider, most specific first:
///
/// 1. a pre-built provider,
/// 2. a named provider plus model,
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`,
/// 4. OpenAI when `OPENAI_API_KEY` is set,
/// 5. `ProviderFactory::from_env` auto-detection.
fn resolve_provider(config: &VisionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2RecError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2RecError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                 Error: {e}"
            ),
        })?;
    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = VisionConfig::default();
        assert_eq!(cfg.max_rendered_pixels, 2000);
        assert_eq!(cfg.temperature, 0.0);
        assert!(cfg.provider.is_none());
    }

    #[test]
    fn debug_hides_password() {
        let cfg = VisionConfig {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }
}
