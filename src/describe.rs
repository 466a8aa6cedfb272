//! Description pipeline: the single operation callers consume.
//!
//! Validates input, builds the prompt, runs the execution protocol against
//! the configured provider, and turns the raw completion into a canonical
//! [`DescriptionRecord`] through recovery and normalization. Each request is
//! processed independently end-to-end; the only cross-request state is the
//! model-resolution cache shared through the executor.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LazarilloError, Result};
use crate::prompt::{build_prompt, PolicyMode};
use crate::providers::{
    GenerationRequest, ImagePayload, ModelResolutionCache, RequestExecutor, VisionProvider,
};
use crate::record::{normalize, DescriptionRecord, Timing};
use crate::recovery::RecoveryEngine;

/// Generation temperature for description requests.
const DESCRIBE_TEMPERATURE: f32 = 0.2;

/// One description request from the relay layer.
#[derive(Debug, Clone, Default)]
pub struct DescribeRequest {
    /// Raw image bytes. Required; an absent or empty payload fails before any
    /// network call.
    pub image: Option<Vec<u8>>,
    /// MIME type; defaults to `image/jpeg` when unset.
    pub image_mime_type: Option<String>,
    pub mode: PolicyMode,
    /// Optional caller instruction inserted into the prompt verbatim.
    pub user_instruction: Option<String>,
    /// Optional model-name hint; the provider default is used otherwise.
    pub model: Option<String>,
}

/// Result of a warm-up probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmUpReport {
    pub ok: bool,
    pub model: String,
    pub duration_ms: u64,
}

/// The description pipeline for one provider.
pub struct DescriptionPipeline {
    provider: Arc<dyn VisionProvider>,
    executor: RequestExecutor,
    engine: RecoveryEngine,
    /// Configured model used when a request carries no hint.
    default_model: Option<String>,
    /// Overrides the mode-derived token budget when set (config/env).
    max_output_tokens: Option<u32>,
}

impl DescriptionPipeline {
    /// Create a pipeline over `provider`, sharing `cache` for model
    /// resolution across every pipeline in the process.
    pub fn new(provider: Arc<dyn VisionProvider>, cache: Arc<ModelResolutionCache>) -> Self {
        Self {
            provider,
            executor: RequestExecutor::new(cache),
            engine: RecoveryEngine::default(),
            default_model: None,
            max_output_tokens: None,
        }
    }

    /// Set the model used when a request carries no hint.
    pub fn with_model(mut self, model: &str) -> Self {
        self.default_model = Some(model.to_string());
        self
    }

    /// Replace the request executor (timeout, classifier).
    pub fn with_executor(mut self, executor: RequestExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the recovery engine (repair strategy).
    pub fn with_recovery_engine(mut self, engine: RecoveryEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Fix the max-output-token budget regardless of policy mode.
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    fn select_model(&self, hint: Option<&str>) -> String {
        match hint.map(str::trim) {
            Some(model) if !model.is_empty() => model.to_string(),
            _ => self
                .default_model
                .clone()
                .unwrap_or_else(|| self.provider.default_model().to_string()),
        }
    }

    /// Describe one image: `describe(request) -> DescriptionRecord`.
    pub async fn describe(&self, request: DescribeRequest) -> Result<DescriptionRecord> {
        let bytes = match request.image {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Err(LazarilloError::MissingImage),
        };
        let mime_type = request
            .image_mime_type
            .as_deref()
            .unwrap_or("image/jpeg")
            .to_string();

        let model = self.select_model(request.model.as_deref());
        let max_output_tokens = self
            .max_output_tokens
            .unwrap_or_else(|| request.mode.default_max_output_tokens());

        let generation_request = GenerationRequest {
            image: Some(ImagePayload {
                bytes,
                mime_type,
            }),
            prompt: build_prompt(request.mode, request.user_instruction.as_deref()),
            model,
            temperature: DESCRIBE_TEMPERATURE,
            max_output_tokens,
            strict_json: true,
        };

        let generation = self
            .executor
            .execute(self.provider.as_ref(), generation_request)
            .await?;

        let parse_started = Instant::now();
        let value = self.engine.recover(&generation.raw_text)?;
        let fields = normalize(&value);
        let parse_ms = parse_started.elapsed().as_millis() as u64;

        info!(
            provider = self.provider.name(),
            model = %generation.model_used,
            outcome = ?generation.outcome,
            generation_ms = generation.generation_ms,
            parse_ms,
            confidence = ?fields.confidence,
            "Description request completed"
        );

        Ok(DescriptionRecord {
            summary: fields.summary,
            detailed: fields.detailed,
            points_of_interest: fields.points_of_interest,
            uncertainties: fields.uncertainties,
            confidence: fields.confidence,
            raw_text: generation.raw_text,
            model_used: generation.model_used,
            timing: Timing {
                generation_ms: generation.generation_ms,
                parse_ms,
                max_output_tokens: generation.max_output_tokens,
            },
        })
    }

    /// Cheap text-only generation that wakes the provider before a real
    /// request. Not subject to the strict-output or image requirements.
    pub async fn warm_up(&self, model_hint: Option<&str>) -> Result<WarmUpReport> {
        let generation_request = GenerationRequest {
            image: None,
            prompt: "warm up".to_string(),
            model: self.select_model(model_hint),
            temperature: 0.0,
            max_output_tokens: 32,
            strict_json: false,
        };

        let generation = self
            .executor
            .execute(self.provider.as_ref(), generation_request)
            .await?;

        info!(
            provider = self.provider.name(),
            model = %generation.model_used,
            duration_ms = generation.generation_ms,
            "Warm-up probe completed"
        );

        Ok(WarmUpReport {
            ok: true,
            model: generation.model_used,
            duration_ms: generation.generation_ms,
        })
    }
}
