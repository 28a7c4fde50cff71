//! API layer for the gateway.
//!
//! This module contains all HTTP handlers, request/response models,
//! dispatch logic, and the upstream/streaming relay machinery.

pub mod auth;
pub mod disconnect;
pub mod dispatch;
pub mod handlers;
pub mod models;
pub mod relay;
pub mod upstream;

// Re-export commonly used types
pub use auth::{authenticate, Principal};
pub use dispatch::{dispatch, RelayMode};
pub use handlers::{chat_completions, health, list_models, metrics_handler, AppState};
pub use models::{ChatCompletionRequest, ChatCompletionResponse, HealthResponse, ModelList};
pub use upstream::{ChunkStream, UpstreamClient};
