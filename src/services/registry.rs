//! Model registry: the immutable name → backend mapping.

use crate::core::config::{GatewayConfig, KeyConfig, ModelEntry};
use crate::core::{AppError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Process-wide lookup tables built once from configuration.
///
/// Reads are lock-free because nothing is ever mutated after construction;
/// replacing the whole registry via atomic swap is how a future hot reload
/// would work.
#[derive(Clone)]
pub struct ModelRegistry {
    models: Arc<HashMap<String, ModelEntry>>,
    keys: Arc<HashMap<String, KeyConfig>>,
}

impl ModelRegistry {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            models: Arc::new(config.models.clone()),
            keys: Arc::new(config.keys.clone()),
        }
    }

    /// Resolve a model name to its backend entry.
    ///
    /// Matching is exact and case-sensitive; there is no fallback model.
    pub fn resolve(&self, model_name: &str) -> Result<&ModelEntry> {
        self.models
            .get(model_name)
            .ok_or_else(|| AppError::UnknownModel(model_name.to_string()))
    }

    /// Look up a key configuration by its SHA-256 digest.
    pub fn key_by_digest(&self, digest: &str) -> Option<&KeyConfig> {
        self.keys.get(digest)
    }

    /// All configured model names, sorted for stable listings.
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }

    /// Log the configured backends at startup.
    pub fn log_models(&self) {
        for name in self.model_names() {
            let entry = &self.models[&name];
            tracing::info!(
                model = %name,
                backend_model = %entry.model,
                host = %entry.host,
                port = entry.port,
                quant = entry.quant.as_deref(),
                timeout_secs = entry.timeout,
                "Registered model backend"
            );
        }
    }
}
