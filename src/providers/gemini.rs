//! Gemini provider implementation.
//!
//! Talks to the Generative Language API: `models/{model}:generateContent` for
//! vision descriptions and `models` for catalog listing. The catalog query is
//! issued against the primary API surface (`v1beta`) first and falls back to
//! the secondary surface (`v1`) when the primary query itself fails.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LazarilloError, Result};

use super::{GenerationRequest, ModelEntry, VisionProvider};

/// The Generative Language API endpoint.
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Primary and secondary API surface versions for catalog queries.
const PRIMARY_API_VERSION: &str = "v1beta";
const SECONDARY_API_VERSION: &str = "v1";

/// The default Gemini model to use.
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

// ============================================================================
// Gemini API Request Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

/// One ordered part: inline image bytes or prompt text.
#[derive(Debug, Serialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    /// Strict-output flag: constrains the completion to JSON when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

// ============================================================================
// Gemini API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<CatalogModel>,
}

#[derive(Debug, Deserialize)]
struct CatalogModel {
    name: String,
    #[serde(default, rename = "supportedGenerationMethods")]
    supported_generation_methods: Vec<String>,
}

// ============================================================================
// Gemini Provider
// ============================================================================

/// Gemini vision provider.
pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider with the given API key.
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: GEMINI_API_URL.to_string(),
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
            return Err(LazarilloError::MissingCredential(
                "GEMINI_API_KEY".to_string(),
            ));
        }
        Ok(())
    }

    async fn list_models_at(&self, api_version: &str) -> Result<Vec<ModelEntry>> {
        let url = format!(
            "{}/{}/models?key={}",
            self.base_url, api_version, self.api_key
        );
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LazarilloError::Provider(format!(
                "Gemini HTTP {} listing models ({}): {}",
                status, api_version, body
            )));
        }

        let catalog: ModelsResponse = response.json().await?;
        Ok(catalog
            .models
            .into_iter()
            .map(|m| ModelEntry {
                name: m.name,
                supported_methods: m.supported_generation_methods,
            })
            .collect())
    }
}

fn build_request(request: &GenerationRequest) -> GeminiRequest {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = &request.image {
        let data = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
        parts.push(GeminiPart {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type.clone(),
                data,
            }),
        });
    }
    parts.push(GeminiPart {
        text: Some(request.prompt.clone()),
        inline_data: None,
    });

    GeminiRequest {
        contents: vec![GeminiContent { parts }],
        generation_config: Some(GenerationConfig {
            temperature: Some(request.temperature),
            max_output_tokens: Some(request.max_output_tokens),
            response_mime_type: request
                .strict_json
                .then(|| "application/json".to_string()),
        }),
    }
}

/// Join all text parts of the first candidate, newline-separated.
fn extract_text(response: GeminiResponse) -> String {
    let mut out = String::new();
    if let Some(candidate) = response.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(text) = part.text {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(&text);
                }
            }
        }
    }
    out
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.require_key()?;

        let url = format!(
            "{}/{}/models/{}:generateContent?key={}",
            self.base_url, PRIMARY_API_VERSION, request.model, self.api_key
        );
        let body = build_request(request);

        debug!(model = %request.model, strict_json = request.strict_json, "Gemini generateContent");

        let response = self.client.post(url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LazarilloError::Provider(format!(
                "Gemini HTTP {}: {}",
                status, text
            )));
        }

        let parsed: GeminiResponse = response.json().await?;
        Ok(extract_text(parsed))
    }

    async fn list_models(&self) -> Result<Vec<ModelEntry>> {
        self.require_key()?;

        match self.list_models_at(PRIMARY_API_VERSION).await {
            Ok(catalog) => Ok(catalog),
            Err(primary_err) => {
                debug!(error = %primary_err, "Primary catalog surface failed; trying secondary");
                self.list_models_at(SECONDARY_API_VERSION).await
            }
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }
}
