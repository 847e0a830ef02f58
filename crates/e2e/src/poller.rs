//! Eventual-delivery poller
//!
//! Events travel ingestion API -> platform -> webhook asynchronously, so a
//! delivery check re-reads the collector until a condition holds or the
//! timeout passes. A failed read is not a verdict: it is logged, counted and
//! treated as "not yet".

use async_trait::async_trait;
use rudder_common::{DeliverySettings, Properties};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clients::webhook::{CollectorError, ObservedEvent};
use crate::error::{E2eError, E2eResult};

/// Anything that can list the events observed so far
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(&self) -> Result<Vec<ObservedEvent>, CollectorError>;
}

/// What "delivered" means for one check
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryCondition {
    /// At least one observed event carries one of these names (exact case)
    AnyNamed(Vec<String>),
    /// Every name appears among the observed events, ignoring case
    AllNamed(Vec<String>),
    /// An observed event with this name whose properties include all of these
    Matches { event: String, properties: Properties },
}

impl DeliveryCondition {
    pub fn any_named<S: AsRef<str>>(names: &[S]) -> Self {
        DeliveryCondition::AnyNamed(names.iter().map(|n| n.as_ref().to_string()).collect())
    }

    pub fn all_named<S: AsRef<str>>(names: &[S]) -> Self {
        DeliveryCondition::AllNamed(names.iter().map(|n| n.as_ref().to_string()).collect())
    }

    pub fn matches(event: impl Into<String>, properties: Properties) -> Self {
        DeliveryCondition::Matches {
            event: event.into(),
            properties,
        }
    }

    pub fn is_satisfied(&self, observed: &[ObservedEvent]) -> bool {
        self.missing(observed).is_empty()
    }

    /// Names still outstanding; empty when the condition holds
    pub fn missing(&self, observed: &[ObservedEvent]) -> Vec<String> {
        match self {
            DeliveryCondition::AnyNamed(names) => {
                let hit = observed
                    .iter()
                    .filter_map(ObservedEvent::name)
                    .any(|name| names.iter().any(|n| n == name));
                if hit {
                    Vec::new()
                } else {
                    names.clone()
                }
            }
            DeliveryCondition::AllNamed(names) => {
                let seen: Vec<String> = observed
                    .iter()
                    .filter_map(ObservedEvent::name)
                    .map(str::to_lowercase)
                    .collect();
                names
                    .iter()
                    .filter(|n| !seen.contains(&n.to_lowercase()))
                    .cloned()
                    .collect()
            }
            DeliveryCondition::Matches { event, properties } => {
                let hit = observed.iter().any(|o| {
                    o.name() == Some(event.as_str()) && properties_include(&o.properties, properties)
                });
                if hit {
                    Vec::new()
                } else {
                    vec![event.clone()]
                }
            }
        }
    }
}

impl fmt::Display for DeliveryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryCondition::AnyNamed(names) => write!(f, "any of [{}]", names.join(", ")),
            DeliveryCondition::AllNamed(names) => write!(f, "all of [{}]", names.join(", ")),
            DeliveryCondition::Matches { event, properties } => {
                write!(f, "{} with {} matching properties", event, properties.len())
            }
        }
    }
}

fn properties_include(observed: &Properties, expected: &Properties) -> bool {
    expected
        .iter()
        .all(|(key, value)| observed.get(key).map_or(false, |v| values_equal(v, value)))
}

// Numbers compare by value so 10 and 10.0 agree after a JSON round trip.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

/// Outcome of a poll, successful or not
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub satisfied: bool,
    pub attempts: u32,
    pub fetch_failures: u32,
    pub elapsed: Duration,
    pub last_error: Option<String>,
    /// Result of the last successful read
    pub observed: Vec<ObservedEvent>,
    pub missing: Vec<String>,
}

/// Repeatedly checks a [`DeliveryCondition`] against an [`EventSource`]
pub struct DeliveryPoller<'a, S: EventSource + ?Sized> {
    source: &'a S,
    settings: DeliverySettings,
}

impl<'a, S: EventSource + ?Sized> DeliveryPoller<'a, S> {
    pub fn new(source: &'a S, settings: DeliverySettings) -> Self {
        Self { source, settings }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.settings.interval = interval;
        self
    }

    pub fn settings(&self) -> DeliverySettings {
        self.settings
    }

    /// Poll until the condition holds or the timeout passes
    pub async fn poll(&self, condition: &DeliveryCondition) -> PollReport {
        let start = Instant::now();
        let mut report = PollReport {
            satisfied: false,
            attempts: 0,
            fetch_failures: 0,
            elapsed: Duration::ZERO,
            last_error: None,
            observed: Vec::new(),
            missing: condition.missing(&[]),
        };

        info!(
            "Waiting for {} (timeout {:?}, interval {:?})",
            condition, self.settings.timeout, self.settings.interval
        );

        while report.attempts == 0 || start.elapsed() < self.settings.timeout {
            report.attempts += 1;

            match self.source.fetch_events().await {
                Ok(events) => {
                    report.missing = condition.missing(&events);
                    report.observed = events;
                    if report.missing.is_empty() {
                        report.satisfied = true;
                        report.elapsed = start.elapsed();
                        info!(
                            "{} satisfied after {} attempt(s) in {:?}",
                            condition, report.attempts, report.elapsed
                        );
                        return report;
                    }
                    debug!(
                        attempt = report.attempts,
                        observed = report.observed.len(),
                        "Still missing: {}",
                        report.missing.join(", ")
                    );
                }
                Err(e) => {
                    warn!("Collector read failed on attempt {}: {}", report.attempts, e);
                    report.fetch_failures += 1;
                    report.last_error = Some(e.to_string());
                }
            }

            tokio::time::sleep(self.settings.interval).await;
        }

        report.elapsed = start.elapsed();
        warn!(
            "{} not satisfied after {} attempt(s) in {:?}",
            condition, report.attempts, report.elapsed
        );
        report
    }

    /// Like [`poll`](Self::poll), but an unmet condition is an error
    pub async fn wait_for(&self, condition: &DeliveryCondition) -> E2eResult<PollReport> {
        let report = self.poll(condition).await;
        if report.satisfied {
            Ok(report)
        } else {
            Err(E2eError::DeliveryTimeout {
                condition: condition.to_string(),
                attempts: report.attempts,
                elapsed: report.elapsed,
                last_error: report.last_error,
            })
        }
    }
}
