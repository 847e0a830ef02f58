//! Webhook collector client
//!
//! Reads back what the destination delivered to a third-party request
//! catcher. Two hosted collectors are understood (webhook.site and
//! RequestCatcher); any other URL is fetched directly and expected to return
//! events in the platform's own shape.

use async_trait::async_trait;
use chrono::Utc;
use rudder_common::Properties;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::USER_AGENT;
use crate::error::E2eResult;
use crate::poller::EventSource;

/// Why a collector read produced no event list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("collector returned HTTP {status}")]
    Status { status: u16 },

    #[error("malformed collector response: {0}")]
    Malformed(String),
}

/// Hosted collector behind a webhook URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorProvider {
    /// `https://webhook.site/<token>`
    WebhookSite { token: String },
    /// `https://<name>.requestcatcher.com/`
    RequestCatcher,
    /// Anything else, read with a plain GET
    Direct,
}

impl CollectorProvider {
    pub fn detect(webhook_url: &str) -> Self {
        if webhook_url.contains("webhook.site") {
            let token = webhook_url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();
            CollectorProvider::WebhookSite { token }
        } else if webhook_url.contains("requestcatcher.com") {
            CollectorProvider::RequestCatcher
        } else {
            CollectorProvider::Direct
        }
    }

    /// URL that lists captured requests for `webhook_url`
    pub fn api_url(&self, webhook_url: &str) -> String {
        match self {
            CollectorProvider::WebhookSite { token } => {
                format!("https://webhook.site/token/{}/requests", token)
            }
            CollectorProvider::RequestCatcher => {
                format!("{}/api/requests", webhook_url.trim_end_matches('/'))
            }
            CollectorProvider::Direct => webhook_url.to_string(),
        }
    }
}

/// An event as seen by the collector, normalized across providers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedEvent {
    pub event: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    pub timestamp: Option<String>,
    pub received_at: Option<String>,
    /// Payload as captured, when the provider exposes it
    #[serde(default)]
    pub raw: Value,
}

impl ObservedEvent {
    /// Event name, falling back to the raw payload's `event` field
    pub fn name(&self) -> Option<&str> {
        self.event
            .as_deref()
            .or_else(|| self.raw.get("event").and_then(Value::as_str))
    }

    fn from_payload(payload: &Value, received_at: Option<String>) -> Self {
        Self {
            event: str_field(payload, "event"),
            event_type: str_field(payload, "type"),
            user_id: str_field(payload, "userId"),
            properties: payload
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            timestamp: str_field(payload, "timestamp"),
            received_at,
            raw: payload.clone(),
        }
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

/// Delivery counters derived from the collector contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMetrics {
    pub delivered: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub last_delivery_time: Option<String>,
}

impl WebhookMetrics {
    pub fn from_events(events: &[ObservedEvent]) -> Self {
        let delivered = events.len();
        // The collectors only record successful deliveries.
        let failed = 0;
        let success_rate = if delivered > 0 {
            delivered as f64 / (delivered + failed) as f64
        } else {
            0.0
        };
        Self {
            delivered,
            failed,
            success_rate,
            last_delivery_time: events.last().and_then(|e| e.received_at.clone()),
        }
    }
}

/// Normalize a collector listing into observed events
pub fn parse_collector_response(data: &Value) -> Result<Vec<ObservedEvent>, CollectorError> {
    let items = if let Some(items) = data.as_array() {
        items
    } else if let Some(items) = data.get("data").and_then(Value::as_array) {
        items
    } else if let Some(items) = data.get("requests").and_then(Value::as_array) {
        items
    } else {
        return Err(CollectorError::Malformed(
            "expected an array, {data: [...]} or {requests: [...]}".to_string(),
        ));
    };

    Ok(items.iter().map(parse_item).collect())
}

fn parse_item(item: &Value) -> ObservedEvent {
    // webhook.site: request body as a JSON string under `content`
    if let Some(content) = item.get("content").and_then(Value::as_str) {
        let received_at = str_field(item, "created_at").or_else(|| str_field(item, "date"));
        return match serde_json::from_str::<Value>(content) {
            Ok(payload) => ObservedEvent::from_payload(&payload, received_at),
            Err(e) => {
                debug!("Unparseable webhook.site content: {}", e);
                ObservedEvent {
                    event: Some("Unknown".to_string()),
                    received_at,
                    ..Default::default()
                }
            }
        };
    }

    // RequestCatcher: parsed body under `body`
    if let Some(body) = item.get("body").filter(|b| b.is_object()) {
        return ObservedEvent::from_payload(body, str_field(item, "date"));
    }

    // Platform event shape
    let received_at = str_field(item, "receivedAt").or_else(|| Some(Utc::now().to_rfc3339()));
    ObservedEvent::from_payload(item, received_at)
}

/// Client for reading back captured webhook deliveries
#[derive(Debug, Clone)]
pub struct WebhookCollector {
    webhook_url: String,
    api_url: String,
    client: reqwest::Client,
}

impl WebhookCollector {
    /// Collector for `webhook_url`, deriving the listing endpoint from the provider
    pub fn new(webhook_url: &str, timeout: Duration) -> E2eResult<Self> {
        let api_url = CollectorProvider::detect(webhook_url).api_url(webhook_url);
        Self::with_api_url(webhook_url, &api_url, timeout)
    }

    /// Collector with an explicit listing endpoint
    pub fn with_api_url(webhook_url: &str, api_url: &str, timeout: Duration) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            webhook_url: webhook_url.to_string(),
            api_url: api_url.to_string(),
            client,
        })
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Everything the collector has captured so far
    pub async fn received_events(&self) -> Result<Vec<ObservedEvent>, CollectorError> {
        info!("Fetching received webhook events from {}", self.api_url);

        let response = self
            .client
            .get(&self.api_url)
            .send()
            .await
            .map_err(|e| CollectorError::Transport {
                url: self.api_url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Webhook collector returned {}", status);
            return Err(CollectorError::Status {
                status: status.as_u16(),
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| CollectorError::Malformed(e.to_string()))?;
        let events = parse_collector_response(&data)?;

        info!(count = events.len(), "Webhook events retrieved");
        Ok(events)
    }

    pub async fn metrics(&self) -> Result<WebhookMetrics, CollectorError> {
        let events = self.received_events().await?;
        let metrics = WebhookMetrics::from_events(&events);
        info!(
            delivered = metrics.delivered,
            success_rate = metrics.success_rate,
            "Webhook metrics calculated"
        );
        Ok(metrics)
    }
}

#[async_trait]
impl EventSource for WebhookCollector {
    async fn fetch_events(&self) -> Result<Vec<ObservedEvent>, CollectorError> {
        self.received_events().await
    }
}
