//! Rudder E2E common library
//!
//! Configuration, logging, test-data generation and shared types used by the
//! end-to-end suite. Everything here is constructed explicitly at process
//! start and passed by reference; there is no global state apart from the
//! tracing subscriber.

pub mod config;
pub mod data;
pub mod error;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::{Browser, DeliverySettings, EnvironmentProfile, SuiteConfig, Viewport};
pub use data::{DataStorage, TestMetrics};
pub use error::{Error, Result};
pub use types::*;

/// Suite version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
