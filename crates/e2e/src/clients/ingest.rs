//! Ingestion API client
//!
//! Failures are reported inside [`ApiResponse`] instead of being raised, so a
//! step can assert on the outcome of a rejected call as easily as on a
//! successful one.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use rudder_common::data::{generate_message_id, library_context};
use rudder_common::{mask_secret, EventPayload, Properties};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::USER_AGENT;
use crate::error::E2eResult;

/// Outcome of one ingestion call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    /// HTTP status, absent when no response arrived
    pub status: Option<u16>,
    pub body: Option<Value>,
    pub error: Option<String>,
    #[serde(rename = "responseTimeMs", serialize_with = "as_millis")]
    pub response_time: Duration,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// `Authorization` value for a write key: Basic auth with an empty password
pub fn basic_auth_header(write_key: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:", write_key)))
}

/// Track payload for `event`; a user id is generated when none is given
pub fn build_track_payload(event: &str, user_id: Option<&str>, properties: Properties) -> EventPayload {
    EventPayload {
        user_id: user_id
            .map(String::from)
            .unwrap_or_else(|| format!("test-user-{}", Utc::now().timestamp_millis())),
        event: event.to_string(),
        properties,
        context: Some(library_context()),
        timestamp: Utc::now().to_rfc3339(),
        message_id: generate_message_id(),
    }
}

/// Client for the data plane's HTTP source endpoints
#[derive(Debug, Clone)]
pub struct IngestClient {
    data_plane_url: String,
    client: reqwest::Client,
}

impl IngestClient {
    pub fn new(data_plane_url: &str, timeout: Duration) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            data_plane_url: data_plane_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn data_plane_url(&self) -> &str {
        &self.data_plane_url
    }

    /// `POST /v1/track`
    pub async fn send_track(
        &self,
        event: &str,
        write_key: &str,
        user_id: Option<&str>,
        properties: Properties,
    ) -> ApiResponse {
        let payload = build_track_payload(event, user_id, properties);
        self.send_event(&payload, write_key).await
    }

    /// `POST /v1/track` with a prepared payload
    pub async fn send_event(&self, payload: &EventPayload, write_key: &str) -> ApiResponse {
        info!(
            "Sending event {} with write key {}",
            payload.event,
            mask_secret(write_key)
        );
        match serde_json::to_value(payload) {
            Ok(body) => self.post("/v1/track", write_key, &body).await,
            Err(e) => ApiResponse {
                success: false,
                status: None,
                body: None,
                error: Some(e.to_string()),
                response_time: Duration::ZERO,
            },
        }
    }

    /// `POST /v1/identify`
    pub async fn send_identify(&self, write_key: &str, user_id: &str, traits: Properties) -> ApiResponse {
        info!("Sending identify for {} with write key {}", user_id, mask_secret(write_key));
        let body = json!({
            "userId": user_id,
            "traits": traits,
            "context": library_context(),
            "timestamp": Utc::now().to_rfc3339(),
            "messageId": generate_message_id(),
        });
        self.post("/v1/identify", write_key, &body).await
    }

    /// `POST /v1/batch`, every payload sent as a track call
    pub async fn send_batch(&self, write_key: &str, events: &[EventPayload]) -> ApiResponse {
        info!(
            "Sending batch of {} events with write key {}",
            events.len(),
            mask_secret(write_key)
        );
        let batch: Vec<Value> = events
            .iter()
            .filter_map(|e| serde_json::to_value(e).ok())
            .map(|mut v| {
                if let Some(map) = v.as_object_mut() {
                    map.insert("type".to_string(), json!("track"));
                }
                v
            })
            .collect();
        self.post("/v1/batch", write_key, &json!({ "batch": batch }))
            .await
    }

    async fn post(&self, path: &str, write_key: &str, body: &Value) -> ApiResponse {
        let url = format!("{}{}", self.data_plane_url, path);
        let start = Instant::now();

        let result = self
            .client
            .post(&url)
            .header(AUTHORIZATION, basic_auth_header(write_key))
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let response_time = start.elapsed();
                warn!("Request to {} failed after {:?}: {}", url, response_time, e);
                return ApiResponse {
                    success: false,
                    status: None,
                    body: None,
                    error: Some(e.to_string()),
                    response_time,
                };
            }
        };

        let status = response.status();
        // The endpoint answers "OK" as plain text.
        let body = response.text().await.ok().map(|text| {
            serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text))
        });
        let response_time = start.elapsed();

        if status.is_success() {
            info!(
                status = status.as_u16(),
                "{} succeeded in {}ms",
                path,
                response_time.as_millis()
            );
            ApiResponse {
                success: true,
                status: Some(status.as_u16()),
                body,
                error: None,
                response_time,
            }
        } else {
            warn!(status = status.as_u16(), "{} rejected: {:?}", path, body);
            ApiResponse {
                success: false,
                status: Some(status.as_u16()),
                body,
                error: Some(format!("HTTP {}", status)),
                response_time,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header_has_empty_password() {
        let header = basic_auth_header("2abc");
        let encoded = header.strip_prefix("Basic ").unwrap();
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, "2abc:");
    }

    #[test]
    fn test_track_payload_shape() {
        let mut props = Properties::new();
        props.insert("price".to_string(), json!(99.99));

        let payload = build_track_payload("Product Viewed", None, props);
        assert!(payload.user_id.starts_with("test-user-"));
        assert!(payload.message_id.starts_with("msg-"));

        let wire = serde_json::to_value(&payload).unwrap();
        assert_eq!(wire["event"], "Product Viewed");
        assert_eq!(wire["properties"]["price"], 99.99);
        assert_eq!(wire["context"]["library"]["name"], "rudder-e2e");
        assert!(wire.get("userId").is_some());
        assert!(wire.get("messageId").is_some());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = IngestClient::new("https://dp.example.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.data_plane_url(), "https://dp.example.com");
    }

    #[test]
    fn test_response_serializes_millis() {
        let response = ApiResponse {
            success: true,
            status: Some(200),
            body: Some(json!("OK")),
            error: None,
            response_time: Duration::from_millis(42),
        };
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["responseTimeMs"], 42);
        assert_eq!(wire["status"], 200);
    }
}
