//! Suite lifecycle: one browser per run, one page per scenario
//!
//! ```text
//! Suite::start ── launch browser once
//!   ├── begin_scenario  ── open page, build page objects + HTTP helpers
//!   ├── finish_scenario ── failure screenshot, metrics, close page
//!   └── ...
//! Suite::shutdown ── session export, test-results.json, close browser
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rudder_common::telemetry::{init_logging, log_scenario_end, log_scenario_start};
use rudder_common::{DataStorage, SuiteConfig, TestMetrics};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::clients::IngestClient;
use crate::context::{slugify, ScenarioContext};
use crate::driver::PageDriver;
use crate::error::{E2eError, E2eResult};
use crate::pages::{BasePage, PageSettings, Pages};
use crate::playwright::{PlaywrightBrowser, PlaywrightConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScenarioStatus::Passed => "PASSED",
            ScenarioStatus::Failed => "FAILED",
            ScenarioStatus::Skipped => "SKIPPED",
        })
    }
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub name: String,
    pub test_id: String,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    pub tags: Vec<String>,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
    pub events_sent: usize,
    pub metrics: TestMetrics,
}

/// Result of the whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    pub environment: String,
    pub browser: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// How a scenario ended, as seen by the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Passed,
    Failed(String),
    Skipped,
}

/// Live state of one scenario
pub struct Scenario {
    pub context: ScenarioContext,
    pub pages: Pages,
    pub ingest: IngestClient,
    base: BasePage,
    driver: Arc<dyn PageDriver>,
    tags: Vec<String>,
    started: Instant,
    api_timeout: Duration,
}

impl Scenario {
    pub fn base(&self) -> &BasePage {
        &self.base
    }

    pub fn driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Ingestion client for a data plane other than the configured one
    pub fn ingest_for(&self, data_plane_url: &str) -> E2eResult<IngestClient> {
        IngestClient::new(data_plane_url, self.api_timeout)
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("context", &self.context)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Owns everything that lives for the whole run
pub struct Suite {
    config: SuiteConfig,
    data: DataStorage,
    browser: Option<PlaywrightBrowser>,
    results: Mutex<Vec<ScenarioResult>>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl Suite {
    /// Validate config, set up logging and output dirs, launch the browser
    pub async fn start(config: SuiteConfig) -> E2eResult<Self> {
        config.validate()?;

        match init_logging(&config.logging) {
            Ok(()) => {}
            Err(rudder_common::Error::LoggingInitialized) => debug!("Logging already initialized"),
            Err(e) => return Err(e.into()),
        }

        info!(
            environment = %config.environment.name,
            base_url = %config.base_url(),
            data_plane = %config.data_plane_url(),
            "Starting suite"
        );

        let browser = PlaywrightBrowser::launch(PlaywrightConfig::from_suite(&config)).await?;
        let suite = Self::with_browser(config, Some(browser))?;
        Ok(suite)
    }

    /// Suite around an existing browser; `None` runs driverless scenarios only
    pub fn with_browser(config: SuiteConfig, browser: Option<PlaywrightBrowser>) -> E2eResult<Self> {
        for dir in [
            config.reports_dir.clone(),
            config.screenshot_dir(),
            config.test_data_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }

        Ok(Self {
            config,
            data: DataStorage::new(),
            browser,
            results: Mutex::new(Vec::new()),
            started: Instant::now(),
            started_at: Utc::now(),
        })
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn data(&self) -> &DataStorage {
        &self.data
    }

    /// Open a fresh page and wrap it for a scenario
    pub async fn begin_scenario(&self, name: &str, tags: &[String]) -> E2eResult<Scenario> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| E2eError::Playwright("browser not launched".to_string()))?;
        let page = browser.new_page().await?;
        self.begin_with_driver(name, tags, Arc::new(page))
    }

    /// Scenario over an already-open page
    pub fn begin_with_driver(
        &self,
        name: &str,
        tags: &[String],
        driver: Arc<dyn PageDriver>,
    ) -> E2eResult<Scenario> {
        let context = ScenarioContext::new(name, self.config.credentials.clone());
        log_scenario_start(name, &context.test_id, tags);
        self.data.initialize_metrics(&context.test_id);

        let base = BasePage::new(driver.clone(), PageSettings::from_suite(&self.config));
        let pages = Pages::new(driver.clone(), PageSettings::from_suite(&self.config));
        let ingest = IngestClient::new(self.config.data_plane_url(), self.config.api_timeout)?;

        Ok(Scenario {
            context,
            pages,
            ingest,
            base,
            driver,
            tags: tags.to_vec(),
            started: Instant::now(),
            api_timeout: self.config.api_timeout,
        })
    }

    /// Capture diagnostics, record the result and release the page
    pub async fn finish_scenario(&self, scenario: Scenario, outcome: ScenarioOutcome) -> ScenarioResult {
        let duration = scenario.started.elapsed();
        let test_id = scenario.context.test_id.clone();

        let (status, error) = match outcome {
            ScenarioOutcome::Passed => (ScenarioStatus::Passed, None),
            ScenarioOutcome::Failed(reason) => (ScenarioStatus::Failed, Some(reason)),
            ScenarioOutcome::Skipped => (ScenarioStatus::Skipped, None),
        };

        let mut screenshot = None;
        if status == ScenarioStatus::Failed && self.config.artifacts.screenshots {
            let path = self.failure_screenshot_path(&scenario.context.name, Utc::now());
            match scenario.base.screenshot_to(&path).await {
                Ok(()) => screenshot = Some(path),
                Err(e) => warn!("Failed to capture failure screenshot: {}", e),
            }
        }

        for sent in scenario.context.sent_events() {
            self.data.add_response_time(&test_id, sent.response.response_time);
        }
        let metrics = self.data.finalize_metrics(&test_id, duration);

        log_scenario_end(&scenario.context.name, &status.to_string(), duration);
        if let Some(reason) = &error {
            error!("✗ {} - {}", scenario.context.name, reason);
        } else {
            info!("✓ {} ({} ms)", scenario.context.name, duration.as_millis());
        }

        if let Err(e) = scenario.driver.close().await {
            warn!("Failed to close page: {}", e);
        }

        let result = ScenarioResult {
            name: scenario.context.name.clone(),
            test_id,
            status,
            duration_ms: duration.as_millis() as u64,
            tags: scenario.tags.clone(),
            error,
            screenshot,
            events_sent: scenario.context.sent_events().len(),
            metrics,
        };
        self.results.lock().push(result.clone());
        result
    }

    /// `failure-{slug}-{timestamp}.png` with `:` and `.` made filename-safe
    pub fn failure_screenshot_path(&self, name: &str, at: DateTime<Utc>) -> PathBuf {
        let stamp = at
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        self.config
            .screenshot_dir()
            .join(format!("failure-{}-{}.png", slugify(name), stamp))
    }

    pub fn report(&self) -> SuiteReport {
        let results = self.results.lock().clone();
        let count = |s: ScenarioStatus| results.iter().filter(|r| r.status == s).count();

        SuiteReport {
            environment: self.config.environment.name.clone(),
            browser: self.config.browser.to_string(),
            started_at: self.started_at,
            total: results.len(),
            passed: count(ScenarioStatus::Passed),
            failed: count(ScenarioStatus::Failed),
            skipped: count(ScenarioStatus::Skipped),
            duration_ms: self.started.elapsed().as_millis() as u64,
            results,
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, report: &SuiteReport) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.reports_dir)?;

        let path = self.config.reports_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }

    /// Export session data, write the report and close the browser
    ///
    /// Every step runs even if an earlier one fails; the first error is returned.
    pub async fn shutdown(&self) -> E2eResult<SuiteReport> {
        let report = self.report();
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            report.passed, report.failed, report.skipped, report.duration_ms
        );

        let mut first_error: Option<E2eError> = None;

        if let Err(e) = self.data.export_to_dir(&self.config.test_data_dir()) {
            warn!("Failed to export session data: {}", e);
            first_error.get_or_insert(e.into());
        }
        if let Err(e) = self.write_results(&report) {
            warn!("Failed to write results: {}", e);
            first_error.get_or_insert(e);
        }
        if let Some(browser) = &self.browser {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
