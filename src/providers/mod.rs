//! Providers module - vision LLM providers (Gemini, Groq).
//!
//! This module defines the `VisionProvider` trait and common types for
//! interacting with vision-capable LLM APIs. Each provider implements the
//! trait to expose a consistent generate/list-models surface; everything
//! above it (execution protocol, recovery, normalization) is
//! provider-agnostic.

pub mod classify;
pub mod execute;
pub mod gemini;
pub mod groq;
pub mod resolve;

use async_trait::async_trait;

use crate::error::Result;

pub use classify::{classify_failure, FailureSignature};
pub use execute::{ExecutionOutcome, Generation, RequestExecutor};
pub use gemini::GeminiProvider;
pub use groq::GroqProvider;
pub use resolve::{resolve_model, ModelResolutionCache};

/// Image payload sent inline with a generation request.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// Raw image bytes (not base64; adapters encode at the wire boundary).
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `image/jpeg`.
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: &str) -> Self {
        Self {
            bytes,
            mime_type: mime_type.to_string(),
        }
    }
}

/// One generation call's worth of parameters.
///
/// Owned exclusively by the call that creates it; the execution protocol
/// clones and adjusts it for its bounded retries (dropping the strict-output
/// flag, or substituting a resolved model name).
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Inline image; absent only for text-only probes (warm-up).
    pub image: Option<ImagePayload>,
    pub prompt: String,
    /// Model identifier as the provider expects it (no path prefix).
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Ask the provider to constrain output to JSON, when supported. Providers
    /// that reject the flag trigger the format-fallback retry path.
    pub strict_json: bool,
}

/// One entry from a provider's model catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    /// Catalog name, possibly path-prefixed (e.g. `models/gemini-1.5-flash`).
    pub name: String,
    /// Generation operations the model supports. Empty means the catalog does
    /// not report operations (treated as supporting generation).
    pub supported_methods: Vec<String>,
}

impl ModelEntry {
    pub fn new(name: &str, supported_methods: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            supported_methods: supported_methods.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Trait for vision-capable LLM providers.
///
/// Implement this trait to add support for a new provider. The adapter is
/// responsible for translating the request into the provider's wire format
/// and returning the completion text verbatim — recovery happens upstream.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Issue one generation call and return the raw completion text.
    ///
    /// Errors carry the provider's message string; the execution protocol
    /// classifies it to decide on a retry.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Query the provider's model catalog.
    async fn list_models(&self) -> Result<Vec<ModelEntry>>;

    /// Provider name (e.g. "gemini", "groq").
    fn name(&self) -> &str;

    /// Default model identifier for this provider.
    fn default_model(&self) -> &str;
}
