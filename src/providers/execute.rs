//! Request execution protocol.
//!
//! Issues the generation call with a bounded timeout, classifies failures,
//! and performs at most one retry with an adjusted configuration: either the
//! strict-output flag is dropped (provider rejected the response format) or
//! the model name is substituted from catalog resolution (provider rejected
//! the model). A timeout is terminal for the attempt — the racing call is
//! abandoned, its eventual result ignored, and no retry follows.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{LazarilloError, Result};

use super::classify::{classify_failure, FailureSignature};
use super::resolve::{resolve_model, ModelResolutionCache};
use super::{GenerationRequest, VisionProvider};

/// Default timeout budget for one generation attempt. Vision-LLM inference is
/// slow, so the budget sits in the tens of seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How an execution reached its successful terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// First attempt succeeded.
    Success,
    /// Strict-output configuration was rejected; the plain retry succeeded.
    RetriedWithFallbackFormat,
    /// Requested model was rejected; the resolved-model retry succeeded.
    RetriedWithFallbackModel,
}

/// Raw result of a successful execution, prior to recovery.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Verbatim completion text.
    pub raw_text: String,
    /// Model the successful attempt actually used.
    pub model_used: String,
    pub outcome: ExecutionOutcome,
    /// Wall-clock duration across all attempts, in milliseconds.
    pub generation_ms: u64,
    /// Token budget the request carried, echoed for the timing record.
    pub max_output_tokens: u32,
}

/// Executes generation requests against a provider with bounded retries.
pub struct RequestExecutor {
    timeout: Duration,
    /// Pluggable failure-signature classifier; provider message drift only
    /// requires swapping this, not touching the state machine.
    classifier: fn(&str) -> FailureSignature,
    cache: Arc<ModelResolutionCache>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("timeout", &self.timeout)
            .field("cache", &self.cache)
            .finish()
    }
}

impl RequestExecutor {
    /// Create an executor sharing the given resolution cache, with the
    /// default timeout and the pattern-based classifier.
    pub fn new(cache: Arc<ModelResolutionCache>) -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            classifier: classify_failure,
            cache,
        }
    }

    /// Set the per-attempt timeout budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the failure-signature classifier.
    pub fn with_classifier(mut self, classifier: fn(&str) -> FailureSignature) -> Self {
        self.classifier = classifier;
        self
    }

    /// Run the execution state machine for one request.
    ///
    /// Terminal outcomes: success (possibly via one format or model retry) or
    /// a propagated failure. Exactly one retry is attempted per execution,
    /// chosen by the classification of the first failure; a failing retry
    /// propagates without further attempts.
    pub async fn execute(
        &self,
        provider: &dyn VisionProvider,
        request: GenerationRequest,
    ) -> Result<Generation> {
        let started = Instant::now();

        let first_failure = match self.attempt(provider, &request).await {
            Ok(raw_text) => {
                return Ok(self.generation(raw_text, &request, ExecutionOutcome::Success, started))
            }
            Err(LazarilloError::Provider(message)) => message,
            Err(other) => return Err(other),
        };

        match (self.classifier)(&first_failure) {
            FailureSignature::FormatUnsupported if request.strict_json => {
                warn!(
                    provider = provider.name(),
                    error = %first_failure,
                    "Provider rejected strict output format; retrying without it"
                );
                let mut retry = request.clone();
                retry.strict_json = false;
                let raw_text = self.attempt(provider, &retry).await?;
                Ok(self.generation(
                    raw_text,
                    &retry,
                    ExecutionOutcome::RetriedWithFallbackFormat,
                    started,
                ))
            }
            FailureSignature::ModelNotFound => {
                warn!(
                    provider = provider.name(),
                    model = %request.model,
                    error = %first_failure,
                    "Provider rejected model name; attempting catalog resolution"
                );
                let resolved = resolve_model(&self.cache, provider, &request.model).await;
                if resolved == request.model {
                    return Err(LazarilloError::Provider(first_failure));
                }
                let mut retry = request.clone();
                retry.model = resolved;
                let raw_text = self.attempt(provider, &retry).await?;
                Ok(self.generation(
                    raw_text,
                    &retry,
                    ExecutionOutcome::RetriedWithFallbackModel,
                    started,
                ))
            }
            _ => Err(LazarilloError::Provider(first_failure)),
        }
    }

    /// One generation attempt raced against the timeout budget. The losing
    /// future is abandoned, not cancelled at the network layer.
    async fn attempt(
        &self,
        provider: &dyn VisionProvider,
        request: &GenerationRequest,
    ) -> Result<String> {
        debug!(
            provider = provider.name(),
            model = %request.model,
            strict_json = request.strict_json,
            max_output_tokens = request.max_output_tokens,
            "Issuing generation request"
        );
        match tokio::time::timeout(self.timeout, provider.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(LazarilloError::Timeout(format!(
                "{} generation exceeded {}ms",
                provider.name(),
                self.timeout.as_millis()
            ))),
        }
    }

    fn generation(
        &self,
        raw_text: String,
        request: &GenerationRequest,
        outcome: ExecutionOutcome,
        started: Instant,
    ) -> Generation {
        Generation {
            raw_text,
            model_used: request.model.clone(),
            outcome,
            generation_ms: started.elapsed().as_millis() as u64,
            max_output_tokens: request.max_output_tokens,
        }
    }
}
