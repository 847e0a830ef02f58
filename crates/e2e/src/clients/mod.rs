//! HTTP helpers: the ingestion API and the webhook collector

pub mod ingest;
pub mod webhook;

pub use ingest::{ApiResponse, IngestClient};
pub use webhook::{CollectorError, CollectorProvider, ObservedEvent, WebhookCollector, WebhookMetrics};

/// `User-Agent` sent by every helper
pub const USER_AGENT: &str = concat!("rudder-e2e/", env!("CARGO_PKG_VERSION"));
