//! Shared page-object behavior

use chrono::Utc;
use rudder_common::SuiteConfig;
use serde_json::{json, Value};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::driver::{LoadState, PageDriver, SelectOption, WaitState};
use crate::error::{E2eError, E2eResult};
use crate::locator::{Locator, LocatorSet};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Re-probe interval while waiting for one of several selectors
const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Knobs every page object shares
#[derive(Debug, Clone)]
pub struct PageSettings {
    pub base_url: String,
    pub action_timeout: Duration,
    pub screenshot_dir: PathBuf,
    pub type_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            action_timeout: Duration::from_secs(30),
            screenshot_dir: PathBuf::from("reports/screenshots"),
            type_delay: Duration::from_millis(50),
            retry: RetryPolicy::default(),
        }
    }
}

impl PageSettings {
    pub fn from_suite(config: &SuiteConfig) -> Self {
        Self {
            base_url: config.base_url().trim_end_matches('/').to_string(),
            action_timeout: config.action_timeout,
            screenshot_dir: config.screenshot_dir(),
            // RETRY_COUNT counts retries, not attempts
            retry: RetryPolicy::new(config.retries + 1, RetryPolicy::default().base_delay),
            ..Default::default()
        }
    }
}

/// Page helper wrapping a driver with waits, logging and fallbacks
#[derive(Clone)]
pub struct BasePage {
    driver: Arc<dyn PageDriver>,
    settings: PageSettings,
}

impl BasePage {
    pub fn new(driver: Arc<dyn PageDriver>, settings: PageSettings) -> Self {
        Self { driver, settings }
    }

    pub fn driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }

    pub fn settings(&self) -> &PageSettings {
        &self.settings
    }

    pub fn timeout(&self) -> Duration {
        self.settings.action_timeout
    }

    /// Absolute URL for an application path
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.settings.base_url, path.trim_start_matches('/'))
        }
    }

    pub async fn navigate(&self, path: &str) -> E2eResult<()> {
        let url = self.url_for(path);
        info!("Navigating to: {}", url);
        self.driver.goto(&url).await?;
        self.wait_for_page_load().await
    }

    pub async fn wait_for_page_load(&self) -> E2eResult<()> {
        self.driver.wait_for_load(LoadState::NetworkIdle).await?;
        self.driver.wait_for_load(LoadState::DomContentLoaded).await
    }

    pub async fn click(&self, selector: &str) -> E2eResult<()> {
        debug!("Clicking on: {}", selector);
        self.wait_for_element(selector, None).await?;
        self.driver.click(selector).await
    }

    pub async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        debug!("Filling {}", selector);
        self.wait_for_element(selector, None).await?;
        self.driver.fill(selector, value).await
    }

    pub async fn type_text(&self, selector: &str, text: &str) -> E2eResult<()> {
        debug!("Typing into {}", selector);
        self.wait_for_element(selector, None).await?;
        self.driver
            .type_text(selector, text, self.settings.type_delay)
            .await
    }

    pub async fn text(&self, selector: &str) -> E2eResult<String> {
        self.wait_for_element(selector, None).await?;
        Ok(self.driver.text_content(selector).await?.unwrap_or_default())
    }

    pub async fn value(&self, selector: &str) -> E2eResult<String> {
        self.wait_for_element(selector, None).await?;
        self.driver.input_value(selector).await
    }

    pub async fn attribute(&self, selector: &str, name: &str) -> E2eResult<Option<String>> {
        self.wait_for_element(selector, None).await?;
        self.driver.attribute(selector, name).await
    }

    pub async fn wait_for_element(&self, selector: &str, timeout: Option<Duration>) -> E2eResult<()> {
        self.driver
            .wait_for_selector(
                selector,
                WaitState::Visible,
                timeout.unwrap_or(self.settings.action_timeout),
            )
            .await
    }

    pub async fn wait_for_state(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Option<Duration>,
    ) -> E2eResult<()> {
        self.driver
            .wait_for_selector(selector, state, timeout.unwrap_or(self.settings.action_timeout))
            .await
    }

    /// Wait until `selector` contains `text`
    pub async fn wait_for_text(&self, selector: &str, text: &str) -> E2eResult<()> {
        let scoped = format!("{}:has-text({:?})", selector, text);
        self.wait_for_element(&scoped, None).await
    }

    pub async fn wait_for_url(&self, pattern: &str, timeout: Option<Duration>) -> E2eResult<()> {
        self.driver
            .wait_for_url(pattern, timeout.unwrap_or(self.settings.action_timeout))
            .await
    }

    /// Visibility probe; a failed probe counts as not visible
    pub async fn is_visible(&self, selector: &str) -> bool {
        self.driver.is_visible(selector).await.unwrap_or(false)
    }

    pub async fn is_enabled(&self, selector: &str) -> bool {
        self.driver.is_enabled(selector).await.unwrap_or(false)
    }

    pub async fn is_checked(&self, selector: &str) -> bool {
        self.driver.is_checked(selector).await.unwrap_or(false)
    }

    pub async fn select_option(&self, selector: &str, option: SelectOption) -> E2eResult<()> {
        self.wait_for_element(selector, None).await?;
        self.driver.select_option(selector, &option).await
    }

    /// First visible candidate of `set`, waiting up to `timeout` for one to appear
    pub async fn find(&self, set: &LocatorSet, timeout: Option<Duration>) -> E2eResult<Locator> {
        set.wait_for_any(
            self.driver(),
            timeout.unwrap_or(self.settings.action_timeout),
            PROBE_INTERVAL,
        )
        .await
    }

    pub async fn click_first(&self, set: &LocatorSet) -> E2eResult<()> {
        let target = self.find(set, None).await?;
        debug!("Clicking {} via {}", set.name(), target);
        self.driver.click(target.selector()).await
    }

    pub async fn fill_first(&self, set: &LocatorSet, value: &str) -> E2eResult<()> {
        let target = self.find(set, None).await?;
        debug!("Filling {} via {}", set.name(), target);
        self.driver.fill(target.selector(), value).await
    }

    pub async fn text_first(&self, set: &LocatorSet) -> E2eResult<String> {
        let target = self.find(set, None).await?;
        Ok(self
            .driver
            .text_content(target.selector())
            .await?
            .unwrap_or_default())
    }

    /// Click the first candidate once it is enabled
    pub async fn click_when_enabled(&self, set: &LocatorSet) -> E2eResult<()> {
        let target = self.find(set, None).await?;
        if !self.driver.is_enabled(target.selector()).await? {
            return Err(E2eError::AssertionFailed(format!("{} is disabled", set.name())));
        }
        self.driver.click(target.selector()).await
    }

    /// Full-page screenshot named `{name}-{millis}.png` in the screenshot directory
    pub async fn screenshot(&self, name: &str) -> E2eResult<PathBuf> {
        let path = self.settings.screenshot_dir.join(format!(
            "{}-{}.png",
            name,
            Utc::now().timestamp_millis()
        ));
        self.screenshot_to(&path).await?;
        Ok(path)
    }

    pub async fn screenshot_to(&self, path: &Path) -> E2eResult<()> {
        self.driver.screenshot(path, true).await?;
        info!("Screenshot saved: {}", path.display());
        Ok(())
    }

    pub async fn scroll_to_element(&self, selector: &str) -> E2eResult<()> {
        self.driver
            .evaluate(
                "sel => { const el = document.querySelector(sel); if (el) el.scrollIntoView({ block: 'center' }); }",
                json!(selector),
            )
            .await
            .map(|_| ())
    }

    pub async fn scroll_to_top(&self) -> E2eResult<()> {
        self.driver
            .evaluate("() => window.scrollTo(0, 0)", Value::Null)
            .await
            .map(|_| ())
    }

    pub async fn scroll_to_bottom(&self) -> E2eResult<()> {
        self.driver
            .evaluate(
                "() => window.scrollTo(0, document.body.scrollHeight)",
                Value::Null,
            )
            .await
            .map(|_| ())
    }

    pub async fn current_url(&self) -> E2eResult<String> {
        self.driver.url().await
    }

    pub async fn title(&self) -> E2eResult<String> {
        self.driver.title().await
    }

    pub async fn go_back(&self) -> E2eResult<()> {
        self.driver.go_back().await
    }

    pub async fn go_forward(&self) -> E2eResult<()> {
        self.driver.go_forward().await
    }

    pub async fn reload(&self) -> E2eResult<()> {
        self.driver.reload().await?;
        self.driver.wait_for_load(LoadState::NetworkIdle).await
    }

    pub async fn local_storage_item(&self, key: &str) -> E2eResult<Option<String>> {
        let value = self
            .driver
            .evaluate("key => localStorage.getItem(key)", json!(key))
            .await?;
        Ok(value.as_str().map(String::from))
    }

    pub async fn set_local_storage_item(&self, key: &str, value: &str) -> E2eResult<()> {
        self.driver
            .evaluate(
                "([key, value]) => localStorage.setItem(key, value)",
                json!([key, value]),
            )
            .await
            .map(|_| ())
    }

    /// Run a flaky UI action under the page's retry policy
    pub async fn retry_action<T, F, Fut>(&self, action: F) -> E2eResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = E2eResult<T>>,
    {
        retry_with_backoff(self.settings.retry, action).await
    }

    /// Pause for UI transitions that expose nothing to wait on
    pub async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
