//! Bearer-token authentication.
//!
//! Pure lookup against the configured key table; no side effects beyond log
//! lines. Runs before model resolution and before any upstream I/O.

use crate::core::config::hash_key;
use crate::core::{AppError, Result};
use crate::services::ModelRegistry;
use axum::http::HeaderMap;

/// The identity associated with a validated credential.
#[derive(Debug, Clone)]
pub struct Principal {
    pub name: String,
    pub quota: String,
}

/// Authenticate a request from its headers.
///
/// The credential is expected as `Authorization: Bearer <key>`. Lookup is by
/// SHA-256 digest, so no comparison ever touches raw key bytes. Absent,
/// malformed, unknown, and disabled keys all fail the same way.
pub fn authenticate(headers: &HeaderMap, registry: &ModelRegistry) -> Result<Principal> {
    let provided_key = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .filter(|key| !key.is_empty());

    let Some(provided_key) = provided_key else {
        tracing::warn!("Authentication failed: no bearer credential presented");
        return Err(AppError::Unauthorized);
    };

    let digest = hash_key(provided_key);
    match registry.key_by_digest(&digest) {
        Some(key_config) if key_config.enabled => {
            tracing::debug!(
                principal = %key_config.name,
                "Request authenticated"
            );
            Ok(Principal {
                name: key_config.name.clone(),
                quota: key_config.quota.clone(),
            })
        }
        Some(key_config) => {
            tracing::warn!(
                principal = %key_config.name,
                "Authentication failed: key is disabled"
            );
            Err(AppError::Unauthorized)
        }
        None => {
            tracing::warn!("Authentication failed: unknown API key");
            Err(AppError::Unauthorized)
        }
    }
}
