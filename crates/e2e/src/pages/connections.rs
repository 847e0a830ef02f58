//! Connections overview: entry point for sources and destinations

use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::base::BasePage;
use crate::error::E2eResult;
use crate::locator::LocatorSet;

const INDICATOR_TIMEOUT: Duration = Duration::from_secs(15);

/// Data plane URL shapes, most specific first
const DATA_PLANE_PATTERNS: &[&str] = &[
    r"https?://[a-zA-Z0-9.-]+\.dataplane\.rudderstack\.com",
    r"https?://[a-zA-Z0-9.-]+\.rudderlabs\.com",
    r"https?://hosted\.rudderlabs\.com",
    r"https?://[a-zA-Z0-9.-]+rudderstack[a-zA-Z0-9.-]*\.com",
];

/// First data plane URL mentioned in `text`
pub fn extract_data_plane_url(text: &str) -> Option<String> {
    DATA_PLANE_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .find_map(|re| re.find(text).map(|m| m.as_str().to_string()))
}

pub struct ConnectionsPage {
    base: BasePage,
    add_source: LocatorSet,
    add_destination: LocatorSet,
    loaded: LocatorSet,
    header: LocatorSet,
    data_plane_hints: LocatorSet,
}

impl ConnectionsPage {
    pub fn new(base: BasePage) -> Self {
        let add_source = LocatorSet::new(
            "add source button",
            &[
                r#"button:has-text("Add Source")"#,
                r#"[data-testid="add-source"]"#,
                ".add-source-btn",
            ],
        );
        let loaded = LocatorSet::new(
            "connections page",
            &[
                r#"button:has-text("Add Source")"#,
                r#"[data-testid="add-source"]"#,
                ".add-source-btn",
                r#"[data-testid="sources"]"#,
                ".sources-section",
                r#".ant-card:has-text("Sources")"#,
                r#"h1:has-text("Connections")"#,
                r#"h2:has-text("Sources")"#,
                ".connections-page",
            ],
        );

        Self {
            base,
            add_source,
            add_destination: LocatorSet::new(
                "add destination button",
                &[
                    r#"button:has-text("Add Destination")"#,
                    r#"[data-testid="add-destination"]"#,
                    ".add-destination-btn",
                ],
            ),
            loaded,
            header: LocatorSet::new(
                "header",
                &[".header", ".navbar", ".ant-layout-header", r#"[role="banner"]"#],
            ),
            data_plane_hints: LocatorSet::new(
                "data plane indicator",
                &[
                    r#"[data-testid*="data-plane"]"#,
                    ".data-plane-url",
                    ".plane-url",
                    r#"*:has-text("dataplane")"#,
                    r#"*:has-text("Data Plane")"#,
                ],
            ),
        }
    }

    pub fn base(&self) -> &BasePage {
        &self.base
    }

    /// Open the page and give its indicators a chance to render
    pub async fn navigate(&self) -> E2eResult<()> {
        info!("Navigating to connections page");
        self.base.navigate("/connections").await?;
        match self.base.find(&self.loaded, Some(INDICATOR_TIMEOUT)).await {
            Ok(found) => info!("Connections page loaded ({})", found),
            Err(e) => warn!("Connections page elements not found immediately: {}", e),
        }
        Ok(())
    }

    pub async fn is_loaded(&self) -> bool {
        match self.loaded.find_visible(self.base.driver()).await {
            Some(found) => {
                info!("Connections page confirmed with selector: {}", found);
                true
            }
            None => false,
        }
    }

    /// Data plane URL shown in the UI, or `fallback` when none is found
    pub async fn data_plane_url(&self, fallback: &str) -> String {
        info!("Attempting to extract data plane URL");

        let from_sets = [&self.header, &self.data_plane_hints];
        for set in from_sets {
            for candidate in set.candidates() {
                if !self.base.is_visible(candidate.selector()).await {
                    continue;
                }
                let text = self
                    .base
                    .driver()
                    .text_content(candidate.selector())
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                if let Some(url) = extract_data_plane_url(&text) {
                    info!("Data plane URL found in {}: {}", set.name(), url);
                    return url;
                }
            }
        }

        if let Ok(Some(body)) = self.base.driver().text_content("body").await {
            if let Some(url) = extract_data_plane_url(&body) {
                info!("Data plane URL found in page body: {}", url);
                return url;
            }
        }

        warn!("Could not find data plane URL in UI, using {}", fallback);
        fallback.to_string()
    }

    pub async fn has_add_source_button(&self) -> bool {
        self.add_source.any_visible(self.base.driver()).await
    }

    pub async fn has_add_destination_button(&self) -> bool {
        self.add_destination.any_visible(self.base.driver()).await
    }

    pub async fn click_add_source(&self) -> E2eResult<()> {
        debug!("Opening source setup");
        self.base.click_first(&self.add_source).await
    }

    pub async fn click_add_destination(&self) -> E2eResult<()> {
        debug!("Opening destination setup");
        self.base.click_first(&self.add_destination).await
    }
}
