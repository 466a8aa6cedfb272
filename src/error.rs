//! Error types for Lazarillo
//!
//! This module defines all error types used throughout the description
//! pipeline. Uses `thiserror` for ergonomic error handling with automatic
//! `Display` and `Error` trait implementations.

use thiserror::Error;

/// The primary error type for Lazarillo operations.
///
/// Input errors (`MissingCredential`, `MissingImage`) are detected before any
/// network call is made. `Timeout` is terminal for the attempt that raced it.
/// `Recovery` always carries the verbatim provider output so a failed parse
/// can be debugged after the fact.
#[derive(Error, Debug)]
pub enum LazarilloError {
    /// No API key was supplied for the selected provider.
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// No image payload was supplied with the request.
    #[error("Missing image payload")]
    MissingImage,

    /// The provider call exceeded its timeout budget.
    #[error("Provider timeout: {0}")]
    Timeout(String),

    /// Provider-side failure (HTTP error, rejected request, empty completion).
    /// The message string is what the failure-signature classifier inspects.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The response recovery chain exhausted every fallback stage.
    #[error("Recovery failed: provider output is not parseable")]
    Recovery {
        /// Verbatim provider output, preserved for postmortem debugging.
        raw_text: String,
    },

    /// Configuration-related errors (invalid values, missing required fields).
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors outside the recovery chain.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LazarilloError {
    /// Returns the raw provider text attached to a recovery failure, if any.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            LazarilloError::Recovery { raw_text } => Some(raw_text),
            _ => None,
        }
    }
}

/// A specialized `Result` type for Lazarillo operations.
pub type Result<T> = std::result::Result<T, LazarilloError>;
