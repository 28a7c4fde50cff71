//! Business logic services for the gateway.

pub mod registry;

pub use registry::ModelRegistry;
