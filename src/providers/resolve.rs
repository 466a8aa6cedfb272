//! Model resolution: substituting a working model name when the requested one
//! is rejected by the provider's API surface.
//!
//! Resolution is one-shot per process lifetime: the first successful catalog
//! query populates a single-slot cache that is never invalidated, even if the
//! resolved model later fails too (model catalogs change slowly relative to
//! process uptime; a restart clears it). The cache is an explicit injectable
//! object rather than ambient global state so tests can scope it per case.

use std::sync::RwLock;

use tracing::{info, warn};

use super::{ModelEntry, VisionProvider};

/// Process-wide single-slot cache for the resolved model name.
///
/// Read-mostly: if two requests race to populate it, the last writer wins
/// with an equivalent value (candidate ranking is deterministic given the
/// same catalog), so the benign race needs no coordination beyond the lock.
#[derive(Debug, Default)]
pub struct ModelResolutionCache {
    slot: RwLock<Option<String>>,
}

impl ModelResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached resolved name, if resolution already ran.
    pub fn get(&self) -> Option<String> {
        self.slot.read().ok().and_then(|guard| guard.clone())
    }

    fn store(&self, resolved: &str) {
        if let Ok(mut guard) = self.slot.write() {
            *guard = Some(resolved.to_string());
        }
    }
}

impl ModelEntry {
    /// Whether this catalog entry can serve generation requests. Catalogs
    /// that do not report operations are assumed to support generation.
    fn supports_generation(&self) -> bool {
        self.supported_methods.is_empty()
            || self
                .supported_methods
                .iter()
                .any(|m| m.to_lowercase().contains("generate"))
    }

    fn is_embedding_only(&self) -> bool {
        self.name.to_lowercase().contains("embedding")
    }
}

/// Fixed preference order: vision/multimodal-named models first, then the
/// fast tier, then the capability tier, then everything else. Ties break by
/// catalog order.
fn preference_tier(name: &str) -> u8 {
    let lower = name.to_lowercase();
    if lower.contains("vision") || lower.contains("multimodal") {
        0
    } else if ["flash", "instant", "mini"].iter().any(|p| lower.contains(p)) {
        1
    } else if ["pro", "versatile"].iter().any(|p| lower.contains(p)) {
        2
    } else {
        3
    }
}

/// Strip a path-style prefix from a catalog name (`models/x` → `x`).
fn normalize_model_name(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

/// Resolve a working model name for `desired`.
///
/// Returns the cached resolution when present (no network call). Otherwise
/// queries the provider catalog, filters to generation-capable non-embedding
/// entries, ranks by [`preference_tier`], caches and returns the winner. A
/// failed or empty catalog is best-effort: `desired` comes back unchanged and
/// nothing is cached, so a later call may try again.
pub async fn resolve_model(
    cache: &ModelResolutionCache,
    provider: &dyn VisionProvider,
    desired: &str,
) -> String {
    if let Some(cached) = cache.get() {
        return cached;
    }

    let catalog = match provider.list_models().await {
        Ok(catalog) => catalog,
        Err(err) => {
            warn!(provider = provider.name(), error = %err, "Model catalog query failed; keeping requested model");
            return desired.to_string();
        }
    };

    let best = catalog
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.supports_generation() && !entry.is_embedding_only())
        .min_by_key(|(index, entry)| (preference_tier(&entry.name), *index))
        .map(|(_, entry)| normalize_model_name(&entry.name));

    match best {
        Some(resolved) => {
            info!(
                provider = provider.name(),
                requested = desired,
                resolved = %resolved,
                "Resolved substitute model from catalog"
            );
            cache.store(&resolved);
            resolved
        }
        None => {
            warn!(
                provider = provider.name(),
                requested = desired,
                "Model catalog empty after filtering; keeping requested model"
            );
            desired.to_string()
        }
    }
}
