//! Ollamao - an OpenAI-compatible gateway for Ollama backends
//!
//! This library provides a chat-completion gateway that routes requests by
//! model name to independent Ollama instances, with:
//!
//! - **Model Routing**: Each public model name maps to exactly one backend
//! - **Bearer Authentication**: API keys validated by SHA-256 digest lookup
//! - **Streaming Support**: Ollama NDJSON relayed as Server-Sent Events
//! - **Usage Accounting**: Exactly one usage record per request, including
//!   failures and client disconnects
//! - **Metrics & Monitoring**: Prometheus metrics for observability
//!
//! # Architecture
//!
//! The codebase is organized into three main layers:
//!
//! - [`core`]: Core functionality (config, errors, usage, metrics, middleware)
//! - [`api`]: HTTP handlers, dispatch, upstream client, and streaming relay
//! - [`services`]: The model registry built from configuration
//!
//! # Configuration
//!
//! Backends and keys are read from `models.yaml` and `keys.yaml` in the
//! directory named by `OLLAMAO_CONFIG_DIR` (default: `config`).
//!
//! Optional environment variables:
//! - `OLLAMAO_HOST`: Server bind address (default: 0.0.0.0)
//! - `OLLAMAO_PORT`: Server port (default: 8000)
//! - `OLLAMAO_STREAM_IDLE_TIMEOUT_SECS`: Idle deadline between stream chunks
//!   (default: 120)

pub mod api;
pub mod core;
pub mod services;

// Re-export commonly used types for convenience
pub use api::{AppState, ChatCompletionRequest, ChatCompletionResponse, UpstreamClient};
pub use core::{AppError, CancelHandle, GatewayConfig, Result, UsageRecorder};
pub use services::ModelRegistry;
