//! HTTP source setup flow

use std::time::Duration;
use tracing::{info, warn};

use super::base::BasePage;
use crate::error::{E2eError, E2eResult};
use crate::locator::LocatorSet;

const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

pub struct SourcePage {
    base: BasePage,
    header: LocatorSet,
    type_picker: LocatorSet,
    http_option: LocatorSet,
    name_input: LocatorSet,
    continue_button: LocatorSet,
    save_button: LocatorSet,
    write_key_panel: LocatorSet,
    write_key_value: LocatorSet,
}

impl SourcePage {
    pub fn new(base: BasePage) -> Self {
        Self {
            base,
            header: LocatorSet::new(
                "source setup header",
                &[
                    r#"[data-testid="source-setup"]"#,
                    r#"h1:has-text("Source")"#,
                    ".source-header",
                ],
            ),
            type_picker: LocatorSet::new(
                "source types",
                &[
                    r#"[data-testid="source-type"]"#,
                    ".source-types",
                    ".integration-grid",
                ],
            ),
            http_option: LocatorSet::new(
                "HTTP source option",
                &[
                    r#"[data-testid="http-source"]"#,
                    r#"[data-source-type="http"]"#,
                    ".http-source",
                ],
            ),
            name_input: LocatorSet::new(
                "source name",
                &[
                    r#"[data-testid="source-name"]"#,
                    r#"input[name="sourceName"]"#,
                    "#sourceName",
                ],
            ),
            continue_button: continue_button(),
            save_button: save_button(),
            write_key_panel: LocatorSet::new(
                "write key panel",
                &[r#"[data-testid="write-key"]"#, ".write-key", ".source-key"],
            ),
            write_key_value: LocatorSet::new(
                "write key value",
                &[
                    r#"[data-testid="write-key-value"]"#,
                    ".key-value",
                    ".credential-value",
                ],
            ),
        }
    }

    pub async fn is_loaded(&self) -> bool {
        match self.base.find(&self.header, Some(SETUP_TIMEOUT)).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Source page not loaded: {}", e);
                false
            }
        }
    }

    pub async fn select_http_source(&self) -> E2eResult<()> {
        self.base.find(&self.type_picker, None).await?;
        self.base.click_first(&self.http_option).await
    }

    pub async fn enter_name(&self, name: &str) -> E2eResult<()> {
        self.base.fill_first(&self.name_input, name).await
    }

    pub async fn click_continue(&self) -> E2eResult<()> {
        self.base.click_when_enabled(&self.continue_button).await
    }

    pub async fn click_save(&self) -> E2eResult<()> {
        self.base.click_when_enabled(&self.save_button).await
    }

    /// Write key shown after saving; empty is an error
    pub async fn write_key(&self) -> E2eResult<String> {
        self.base
            .find(&self.write_key_panel, Some(SETUP_TIMEOUT))
            .await?;
        let key = self.base.text_first(&self.write_key_value).await?;
        let key = key.trim();
        if key.is_empty() {
            return Err(E2eError::AssertionFailed(
                "Write key is empty or not found".to_string(),
            ));
        }
        Ok(key.to_string())
    }

    /// Run the whole setup flow and return the new source's write key
    pub async fn create_http_source(&self, name: &str) -> E2eResult<String> {
        info!("Creating HTTP source: {}", name);
        self.select_http_source().await?;
        self.enter_name(name).await?;
        self.click_continue().await?;
        self.click_save().await?;

        let key = self.write_key().await?;
        info!("HTTP source created with write key");
        Ok(key)
    }
}

pub(super) fn continue_button() -> LocatorSet {
    LocatorSet::new(
        "continue button",
        &[
            r#"[data-testid="continue"]"#,
            r#"button:has-text("Continue")"#,
            ".continue-btn",
        ],
    )
}

pub(super) fn save_button() -> LocatorSet {
    LocatorSet::new(
        "save button",
        &[
            r#"[data-testid="save"]"#,
            r#"button:has-text("Save")"#,
            ".save-btn",
        ],
    )
}
