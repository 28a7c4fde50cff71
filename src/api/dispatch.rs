//! Pure routing: request → (backend, relay mode).

use crate::api::models::ChatCompletionRequest;
use crate::core::{ModelEntry, Result};
use crate::services::ModelRegistry;

/// How the upstream response is relayed back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Wait for the full backend payload, return one JSON body.
    Buffered,
    /// Relay backend chunks as SSE frames as they arrive.
    Streaming,
}

/// Resolve the backend and relay mode for a validated request.
///
/// Performs no I/O. The mode comes straight from the request's `stream`
/// flag; the backend from an exact registry match.
pub fn dispatch<'a>(
    request: &ChatCompletionRequest,
    registry: &'a ModelRegistry,
) -> Result<(&'a ModelEntry, RelayMode)> {
    let backend = registry.resolve(&request.model)?;
    let mode = if request.stream.unwrap_or(false) {
        RelayMode::Streaming
    } else {
        RelayMode::Buffered
    };
    Ok((backend, mode))
}
