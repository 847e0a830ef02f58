//! Ordered selector fallbacks
//!
//! The target application's markup varies between releases, so every control
//! is described by a list of candidate selectors. Resolution returns the first
//! candidate that is currently visible.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::driver::PageDriver;
use crate::error::{E2eError, E2eResult};

/// One candidate selector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(String);

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn selector(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named, ordered list of candidates for one logical element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorSet {
    name: String,
    candidates: Vec<Locator>,
}

impl LocatorSet {
    pub fn new(name: impl Into<String>, selectors: &[&str]) -> Self {
        Self {
            name: name.into(),
            candidates: selectors.iter().map(|s| Locator::css(*s)).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn candidates(&self) -> &[Locator] {
        &self.candidates
    }

    /// A copy of this set with extra candidates tried after the existing ones
    pub fn with_fallbacks(&self, selectors: &[&str]) -> Self {
        let mut set = self.clone();
        set.candidates
            .extend(selectors.iter().map(|s| Locator::css(*s)));
        set
    }

    /// All candidates joined into a single CSS selector list
    pub fn union(&self) -> String {
        self.candidates
            .iter()
            .map(Locator::selector)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// First visible candidate, if any
    pub async fn find_visible(&self, driver: &dyn PageDriver) -> Option<Locator> {
        for candidate in &self.candidates {
            match driver.is_visible(candidate.selector()).await {
                Ok(true) => {
                    debug!("{} resolved via {}", self.name, candidate);
                    return Some(candidate.clone());
                }
                Ok(false) => {}
                Err(e) => debug!("{} candidate {} not usable: {}", self.name, candidate, e),
            }
        }
        None
    }

    pub async fn resolve(&self, driver: &dyn PageDriver) -> E2eResult<Locator> {
        self.find_visible(driver)
            .await
            .ok_or_else(|| E2eError::ElementNotFound {
                target: self.name.clone(),
                tried: self.union(),
            })
    }

    pub async fn any_visible(&self, driver: &dyn PageDriver) -> bool {
        self.find_visible(driver).await.is_some()
    }

    /// Re-probe every `interval` until a candidate shows up or `timeout` passes
    pub async fn wait_for_any(
        &self,
        driver: &dyn PageDriver,
        timeout: Duration,
        interval: Duration,
    ) -> E2eResult<Locator> {
        let start = Instant::now();
        loop {
            if let Some(found) = self.find_visible(driver).await {
                return Ok(found);
            }
            if start.elapsed() + interval > timeout {
                return Err(E2eError::Timeout(format!(
                    "{} after {:?} (tried: {})",
                    self.name,
                    timeout,
                    self.union()
                )));
            }
            tokio::time::sleep(interval).await;
        }
    }
}
