//! Per-scenario state

use chrono::{DateTime, Utc};
use rudder_common::{Credentials, DestinationConfig, Properties, SourceConfig};
use serde::Serialize;
use uuid::Uuid;

use crate::clients::ApiResponse;
use crate::poller::DeliveryCondition;

/// One event sent by a scenario, in send order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentEvent {
    pub event: String,
    pub properties: Properties,
    pub timestamp: DateTime<Utc>,
    pub response: ApiResponse,
}

/// `{name lowercased, whitespace runs as -}`
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// `{slug}-{millis}`
pub fn scenario_test_id(name: &str, millis: i64) -> String {
    format!("{}-{}", slugify(name), millis)
}

/// Everything a scenario accumulates between its hooks
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    pub name: String,
    pub test_id: String,
    /// Stamped into event properties so a run can pick out its own deliveries
    pub test_run_id: String,
    pub credentials: Credentials,
    pub data_plane_url: Option<String>,
    pub write_key: Option<String>,
    pub webhook_url: Option<String>,
    pub source: Option<SourceConfig>,
    pub destination: Option<DestinationConfig>,
    pub last_response: Option<ApiResponse>,
    sent: Vec<SentEvent>,
}

impl ScenarioContext {
    pub fn new(name: &str, credentials: Credentials) -> Self {
        Self {
            name: name.to_string(),
            test_id: scenario_test_id(name, Utc::now().timestamp_millis()),
            test_run_id: Uuid::new_v4().to_string(),
            credentials,
            data_plane_url: None,
            write_key: None,
            webhook_url: None,
            source: None,
            destination: None,
            last_response: None,
            sent: Vec::new(),
        }
    }

    pub fn record_sent(&mut self, event: &str, properties: Properties, response: ApiResponse) {
        self.last_response = Some(response.clone());
        self.sent.push(SentEvent {
            event: event.to_string(),
            properties,
            timestamp: Utc::now(),
            response,
        });
    }

    /// Start a fresh batch; earlier sends are forgotten
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    pub fn sent_events(&self) -> &[SentEvent] {
        &self.sent
    }

    pub fn sent_names(&self) -> Vec<String> {
        self.sent.iter().map(|e| e.event.clone()).collect()
    }

    /// Delivered once any event this scenario sent shows up under its exact name
    pub fn any_sent_delivered(&self) -> DeliveryCondition {
        DeliveryCondition::any_named(&self.sent_names())
    }

    /// Sends the API rejected or never answered
    pub fn failed_sends(&self) -> Vec<&SentEvent> {
        self.sent.iter().filter(|e| !e.response.success).collect()
    }
}
