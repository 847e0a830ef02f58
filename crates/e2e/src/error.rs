//! Error types for E2E testing

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Configuration error: {0}")]
    Config(#[from] rudder_common::Error),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Browser bridge closed: {0}")]
    BridgeClosed(String),

    #[error("No visible element for {target} (tried: {tried})")]
    ElementNotFound { target: String, tried: String },

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("{condition} not satisfied after {attempts} attempt(s) in {elapsed:?}")]
    DeliveryTimeout {
        condition: String,
        attempts: u32,
        elapsed: Duration,
        last_error: Option<String>,
    },

    #[error("Collector error: {0}")]
    Collector(#[from] crate::clients::webhook::CollectorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

impl E2eError {
    pub fn step(step: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        E2eError::StepFailed {
            step: step.into(),
            reason: reason.to_string(),
        }
    }
}
