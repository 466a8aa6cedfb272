//! Pattern-based classification of provider failure messages.
//!
//! The execution protocol reacts to exactly two failure signatures — a
//! rejected strict-output configuration and an invalid model name — and
//! treats everything else as opaque. Providers phrase these rejections in
//! free text, so the default classifier pattern-matches the message; when a
//! provider's wording drifts, only this module needs updating.

use once_cell::sync::Lazy;
use regex::Regex;

/// Closed set of failure signatures the execution protocol acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSignature {
    /// The provider rejected the strict-output (JSON response format)
    /// configuration; retry without it.
    FormatUnsupported,
    /// The requested model name is invalid for the API surface in use;
    /// resolve a substitute from the catalog and retry.
    ModelNotFound,
    /// Anything else: propagate unmodified.
    Other,
}

/// Strict-output rejection wording across OpenAI-compatible APIs.
static FORMAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)response_format|json_object|json mode|unknown field|invalid").unwrap()
});

/// "Not found"-class errors that reference the model or the catalog call.
static MODEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)not found|not supported for|does not exist|listmodels|list models").unwrap()
});

/// Classify a provider failure message into a [`FailureSignature`].
///
/// Model-name failures are checked first: a "model not found" message often
/// also contains the word "invalid", which would otherwise satisfy the
/// format pattern.
pub fn classify_failure(message: &str) -> FailureSignature {
    let mentions_model = message.to_lowercase().contains("model");

    if mentions_model && MODEL_RE.is_match(message) {
        return FailureSignature::ModelNotFound;
    }
    if FORMAT_RE.is_match(message) {
        return FailureSignature::FormatUnsupported;
    }
    FailureSignature::Other
}
