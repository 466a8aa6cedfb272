//! Groq provider implementation (OpenAI-compatible Chat Completions API).
//!
//! The image travels as a base64 data URL in a multimodal user message. The
//! strict-output flag maps to `response_format: {"type": "json_object"}`,
//! which some vision models reject — that rejection is what the execution
//! protocol's format-fallback retry exists for.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LazarilloError, Result};

use super::{GenerationRequest, ModelEntry, VisionProvider};

/// The Groq OpenAI-compatible API endpoint.
const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";

/// The default Groq vision model to use.
const DEFAULT_MODEL: &str = "llama-3.2-11b-vision-preview";

// ============================================================================
// Groq API Request Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GroqRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<GroqMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct GroqMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

// ============================================================================
// Groq API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GroqResponse {
    #[serde(default)]
    choices: Vec<GroqChoice>,
}

#[derive(Debug, Deserialize)]
struct GroqChoice {
    message: GroqResponseMessage,
}

#[derive(Debug, Deserialize)]
struct GroqResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroqModelsResponse {
    #[serde(default)]
    data: Vec<GroqCatalogModel>,
}

#[derive(Debug, Deserialize)]
struct GroqCatalogModel {
    id: String,
}

// ============================================================================
// Groq Provider
// ============================================================================

/// Groq vision provider.
pub struct GroqProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl GroqProvider {
    /// Create a new Groq provider with the given API key.
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: GROQ_API_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Create a provider with a custom base URL (proxies, test servers).
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn require_key(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(LazarilloError::MissingCredential("GROQ_API_KEY".to_string()));
        }
        Ok(())
    }
}

fn build_request(request: &GenerationRequest) -> GroqRequest {
    let mut content = vec![ContentPart::Text {
        text: request.prompt.clone(),
    }];
    if let Some(image) = &request.image {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
        let data_url = format!("data:{};base64,{}", image.mime_type, encoded);
        content.push(ContentPart::ImageUrl {
            image_url: ImageUrl { url: data_url },
        });
    }

    GroqRequest {
        model: request.model.clone(),
        temperature: request.temperature,
        max_tokens: request.max_output_tokens,
        messages: vec![GroqMessage {
            role: "user".to_string(),
            content,
        }],
        response_format: request.strict_json.then(|| ResponseFormat {
            r#type: "json_object".to_string(),
        }),
    }
}

#[async_trait]
impl VisionProvider for GroqProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.require_key()?;

        let body = build_request(request);

        debug!(model = %request.model, strict_json = request.strict_json, "Groq chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LazarilloError::Provider(format!(
                "Groq HTTP {}: {}",
                status, text
            )));
        }

        let parsed: GroqResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LazarilloError::Provider(
                "Groq returned empty message content".to_string(),
            ));
        }
        Ok(content)
    }

    async fn list_models(&self) -> Result<Vec<ModelEntry>> {
        self.require_key()?;

        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LazarilloError::Provider(format!(
                "Groq HTTP {} listing models: {}",
                status, text
            )));
        }

        let catalog: GroqModelsResponse = response.json().await?;
        Ok(catalog
            .data
            .into_iter()
            .map(|m| ModelEntry {
                name: m.id,
                supported_methods: Vec::new(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "groq"
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }
}
