//! Domain types for the gateway: configuration, errors, the method registry,
//! request timestamp rules and metrics.

pub mod config;
pub mod error;
pub mod methods;
pub mod metrics;
pub mod timestamp;

// Re-exports for convenience
pub use config::{ClearnodeConfig, ConfigError, NetworkConfig};
pub use error::{GatewayError, RpcError};
pub use methods::RpcMethod;
pub use metrics::NodeMetrics;
