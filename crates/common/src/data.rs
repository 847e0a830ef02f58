//! Test data generation and per-run storage
//!
//! `DataStorage` is created once per run and shared by reference. Generated
//! identifiers are unique per call; stored values and metrics are append-only
//! and exported as JSON when the run finishes.

use chrono::Utc;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    DestinationConfig, DestinationKind, EventPayload, Properties, SourceConfig, SourceKind,
    TestUser,
};

/// Name and version reported in the `context.library` block of generated events
pub const LIBRARY_NAME: &str = "rudder-e2e";
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Per-scenario timing and delivery counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMetrics {
    pub duration_ms: u64,
    pub events_delivered: u32,
    pub events_failed: u32,
    pub api_response_times_ms: Vec<u64>,
}

impl TestMetrics {
    pub fn average_response_time_ms(&self) -> u64 {
        if self.api_response_times_ms.is_empty() {
            return 0;
        }
        self.api_response_times_ms.iter().sum::<u64>() / self.api_response_times_ms.len() as u64
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredData {
    write_keys: BTreeMap<String, String>,
    webhook_urls: BTreeMap<String, String>,
    metrics: BTreeMap<String, TestMetrics>,
}

/// Generator for unique test data plus an append-only store for the run
#[derive(Debug)]
pub struct DataStorage {
    session_id: Uuid,
    stored: Mutex<StoredData>,
}

impl Default for DataStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStorage {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            stored: Mutex::new(StoredData::default()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// A 32 character hex write key
    pub fn generate_write_key(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// A write key shaped like the ones the suite falls back to when none is configured
    pub fn generate_test_write_key(&self) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(|c| char::from(c).to_ascii_lowercase())
            .collect();
        format!("test_{}", suffix)
    }

    pub fn generate_test_user(&self) -> TestUser {
        TestUser {
            email: format!("test.user.{}@example.com", Utc::now().timestamp_millis()),
            password: "TestPassword123!".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
        }
    }

    pub fn generate_source_config(&self, name: Option<&str>) -> SourceConfig {
        let mut settings = Properties::new();
        settings.insert("allowInsecure".to_string(), Value::Bool(false));
        settings.insert("enableDeduplication".to_string(), Value::Bool(true));

        SourceConfig {
            name: name
                .map(String::from)
                .unwrap_or_else(|| format!("HTTP-Source-{}", Utc::now().timestamp_millis())),
            kind: SourceKind::Http,
            write_key: Some(self.generate_write_key()),
            enabled: true,
            settings,
        }
    }

    pub fn generate_destination_config(&self, name: Option<&str>, url: Option<&str>) -> DestinationConfig {
        let mut headers = std::collections::HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        DestinationConfig {
            name: name
                .map(String::from)
                .unwrap_or_else(|| format!("Webhook-Destination-{}", Utc::now().timestamp_millis())),
            kind: DestinationKind::Webhook,
            url: Some(url.unwrap_or(crate::config::DEFAULT_WEBHOOK_URL).to_string()),
            enabled: true,
            configured: false,
            headers,
        }
    }

    /// A complete track payload; caller properties override the generated ones
    pub fn generate_event_payload(&self, event: &str, properties: Properties) -> EventPayload {
        let now = Utc::now().to_rfc3339();

        let mut merged = Properties::new();
        merged.insert("timestamp".to_string(), Value::String(now.clone()));
        merged.insert("sessionId".to_string(), Value::String(self.session_id.to_string()));
        merged.extend(properties);

        EventPayload {
            user_id: Uuid::new_v4().to_string(),
            event: event.to_string(),
            properties: merged,
            context: Some(library_context()),
            timestamp: now,
            message_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn store_write_key(&self, key: &str, value: &str) {
        self.stored.lock().write_keys.insert(key.to_string(), value.to_string());
    }

    pub fn store_webhook_url(&self, key: &str, value: &str) {
        self.stored.lock().webhook_urls.insert(key.to_string(), value.to_string());
    }

    pub fn write_key(&self, key: &str) -> Option<String> {
        self.stored.lock().write_keys.get(key).cloned()
    }

    pub fn webhook_url(&self, key: &str) -> Option<String> {
        self.stored.lock().webhook_urls.get(key).cloned()
    }

    pub fn initialize_metrics(&self, test_id: &str) {
        self.stored
            .lock()
            .metrics
            .insert(test_id.to_string(), TestMetrics::default());
    }

    pub fn add_response_time(&self, test_id: &str, response_time: Duration) {
        self.stored
            .lock()
            .metrics
            .entry(test_id.to_string())
            .or_default()
            .api_response_times_ms
            .push(response_time.as_millis() as u64);
    }

    pub fn record_delivery(&self, test_id: &str, delivered: bool) {
        let mut stored = self.stored.lock();
        let metrics = stored.metrics.entry(test_id.to_string()).or_default();
        if delivered {
            metrics.events_delivered += 1;
        } else {
            metrics.events_failed += 1;
        }
    }

    /// Stamp the scenario duration and return a snapshot of its metrics
    pub fn finalize_metrics(&self, test_id: &str, duration: Duration) -> TestMetrics {
        let mut stored = self.stored.lock();
        let metrics = stored.metrics.entry(test_id.to_string()).or_default();
        metrics.duration_ms = duration.as_millis() as u64;
        metrics.clone()
    }

    pub fn metrics(&self, test_id: &str) -> Option<TestMetrics> {
        self.stored.lock().metrics.get(test_id).cloned()
    }

    /// Snapshot of everything stored so far
    pub fn export_data(&self) -> Value {
        let stored = self.stored.lock();
        json!({
            "sessionId": self.session_id.to_string(),
            "exportedAt": Utc::now().to_rfc3339(),
            "data": &*stored,
        })
    }

    /// Write the snapshot to `<dir>/session-<id>.json`
    pub fn export_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join(format!("session-{}.json", self.session_id));
        let json = serde_json::to_string_pretty(&self.export_data())?;
        std::fs::write(&path, json)?;

        info!("Session data exported to {}", path.display());
        Ok(path)
    }
}

/// `context` block attached to every event the suite sends
pub fn library_context() -> Properties {
    let mut context = Properties::new();
    context.insert(
        "library".to_string(),
        json!({ "name": LIBRARY_NAME, "version": LIBRARY_VERSION }),
    );
    context
}

/// `msg-<millis>-<9 random chars>`
pub fn generate_message_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    let id = format!("msg-{}-{}", Utc::now().timestamp_millis(), suffix);
    debug!("Generated message id {}", id);
    id
}
