//! HTTP relay exposed to the mobile client.
//!
//! Three routes: `GET /health`, `POST /describe`, `POST /warmup`. CORS is
//! permissive — the relay fronts a mobile app in development and carries no
//! cookies. Core errors map onto status codes at this boundary: bad input is
//! 400, a timed-out provider is 504, and provider/recovery failures are 502
//! (the upstream gave us garbage, not the caller).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Config, ProviderConfig};
use crate::describe::{DescribeRequest, DescriptionPipeline, WarmUpReport};
use crate::error::{LazarilloError, Result};
use crate::prompt::PolicyMode;
use crate::providers::{
    GeminiProvider, GroqProvider, ModelResolutionCache, RequestExecutor, VisionProvider,
};
use crate::record::DescriptionRecord;

/// Shared state: one pipeline per provider, each with its own single-slot
/// resolution cache (catalogs differ per provider, so the slots must not be
/// shared across them).
pub struct AppState {
    default_provider: String,
    gemini: DescriptionPipeline,
    groq: DescriptionPipeline,
}

fn build_pipeline(provider: Arc<dyn VisionProvider>, cfg: &ProviderConfig) -> DescriptionPipeline {
    let cache = Arc::new(ModelResolutionCache::new());
    let executor = RequestExecutor::new(Arc::clone(&cache))
        .with_timeout(Duration::from_millis(cfg.timeout_ms));
    let mut pipeline = DescriptionPipeline::new(provider, cache).with_executor(executor);
    if let Some(model) = &cfg.model {
        pipeline = pipeline.with_model(model);
    }
    if let Some(max) = cfg.max_output_tokens {
        pipeline = pipeline.with_max_output_tokens(max);
    }
    pipeline
}

impl AppState {
    /// Build both provider pipelines from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_provider: config.default_provider.clone(),
            gemini: build_pipeline(
                Arc::new(GeminiProvider::new(&config.gemini.api_key)),
                &config.gemini,
            ),
            groq: build_pipeline(
                Arc::new(GroqProvider::new(&config.groq.api_key)),
                &config.groq,
            ),
        }
    }

    /// Select a pipeline by provider name, falling back to the configured
    /// default. "llama" is accepted as a legacy alias for groq.
    pub fn pipeline(&self, name: Option<&str>) -> Result<&DescriptionPipeline> {
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_lowercase(),
            _ => self.default_provider.clone(),
        };
        match name.as_str() {
            "gemini" => Ok(&self.gemini),
            "groq" | "llama" => Ok(&self.groq),
            other => Err(LazarilloError::Config(format!("unknown provider: {other}"))),
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DescribeBody {
    provider: Option<String>,
    mode: Option<PolicyMode>,
    /// base64 image, without a `data:` prefix.
    image_base64: Option<String>,
    image_mime_type: Option<String>,
    /// Additional user instruction for the prompt.
    prompt: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WarmUpBody {
    provider: Option<String>,
    model: Option<String>,
}

/// Core error wrapped for HTTP responses.
struct ApiError(LazarilloError);

impl From<LazarilloError> for ApiError {
    fn from(err: LazarilloError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LazarilloError::MissingImage | LazarilloError::Config(_) => StatusCode::BAD_REQUEST,
            LazarilloError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            LazarilloError::Provider(_) | LazarilloError::Recovery { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = json!({ "error": self.0.to_string() });
        if let Some(raw_text) = self.0.raw_text() {
            body["rawText"] = json!(raw_text);
        }
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "service": "lazarillo",
        "ts": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn describe(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DescribeBody>,
) -> std::result::Result<Json<DescriptionRecord>, ApiError> {
    let pipeline = state.pipeline(body.provider.as_deref())?;

    let image = match body.image_base64.as_deref().map(str::trim) {
        Some(encoded) if !encoded.is_empty() => Some(
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|_| {
                    LazarilloError::Config("imageBase64 is not valid base64".to_string())
                })?,
        ),
        _ => None,
    };

    let record = pipeline
        .describe(DescribeRequest {
            image,
            image_mime_type: body.image_mime_type,
            mode: body.mode.unwrap_or_default(),
            user_instruction: body.prompt,
            model: body.model,
        })
        .await?;

    Ok(Json(record))
}

async fn warmup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WarmUpBody>,
) -> std::result::Result<Json<WarmUpReport>, ApiError> {
    let pipeline = state.pipeline(body.provider.as_deref())?;
    let report = pipeline.warm_up(body.model.as_deref()).await?;
    Ok(Json(report))
}

// ============================================================================
// Router / server
// ============================================================================

/// Build the relay router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/describe", post(describe))
        .route("/warmup", post(warmup))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve the relay until the process exits.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Lazarillo relay listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
