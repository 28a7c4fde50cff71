//! Core functionality for the gateway.
//!
//! This module contains the fundamental components used throughout the
//! application:
//! - Configuration loading
//! - Error handling
//! - Request-scoped logging context
//! - Usage accounting
//! - Metrics collection
//! - HTTP middleware
//! - Stream cancellation

pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod usage;

// Re-export commonly used types
pub use cancel::CancelHandle;
pub use config::{hash_key, GatewayConfig, KeyConfig, ModelEntry, ServerConfig};
pub use error::{AppError, Result};
pub use logging::{generate_request_id, get_request_id};
pub use metrics::{get_metrics, init_metrics, Metrics};
pub use middleware::{request_id_middleware, track_metrics};
pub use usage::{TokenTally, UsageRecord, UsageRecorder};
