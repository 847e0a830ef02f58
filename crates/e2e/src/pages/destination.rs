//! Webhook destination setup flow

use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use super::base::BasePage;
use super::source::{continue_button, save_button};
use crate::driver::SelectOption;
use crate::error::{E2eError, E2eResult};
use crate::locator::LocatorSet;

const SETUP_TIMEOUT: Duration = Duration::from_secs(15);
/// The connection test reports asynchronously with nothing to wait on.
const CONNECTION_TEST_WAIT: Duration = Duration::from_secs(5);

pub struct DestinationPage {
    base: BasePage,
    header: LocatorSet,
    type_picker: LocatorSet,
    webhook_option: LocatorSet,
    name_input: LocatorSet,
    url_input: LocatorSet,
    method_select: LocatorSet,
    add_header: LocatorSet,
    header_name: LocatorSet,
    header_value: LocatorSet,
    test_connection: LocatorSet,
    connection_error: LocatorSet,
    continue_button: LocatorSet,
    save_button: LocatorSet,
}

impl DestinationPage {
    pub fn new(base: BasePage) -> Self {
        Self {
            base,
            header: LocatorSet::new(
                "destination setup header",
                &[
                    r#"[data-testid="destination-setup"]"#,
                    r#"h1:has-text("Destination")"#,
                    ".destination-header",
                ],
            ),
            type_picker: LocatorSet::new(
                "destination types",
                &[
                    r#"[data-testid="destination-type"]"#,
                    ".destination-types",
                    ".integration-grid",
                ],
            ),
            webhook_option: LocatorSet::new(
                "webhook destination option",
                &[
                    r#"[data-testid="webhook-destination"]"#,
                    r#"[data-destination-type="webhook"]"#,
                    ".webhook-destination",
                ],
            ),
            name_input: LocatorSet::new(
                "destination name",
                &[
                    r#"[data-testid="destination-name"]"#,
                    r#"input[name="destinationName"]"#,
                    "#destinationName",
                ],
            ),
            url_input: LocatorSet::new(
                "webhook URL",
                &[
                    r#"[data-testid="webhook-url"]"#,
                    r#"input[name="webhookUrl"]"#,
                    "#webhookUrl",
                ],
            ),
            method_select: LocatorSet::new(
                "HTTP method",
                &[
                    r#"[data-testid="http-method"]"#,
                    r#"select[name="method"]"#,
                    "#httpMethod",
                ],
            ),
            add_header: LocatorSet::new(
                "add header button",
                &[r#"[data-testid="add-header"]"#, ".add-header-btn"],
            ),
            header_name: LocatorSet::new(
                "header name",
                &[
                    r#"[data-testid="header-name"]"#,
                    r#"input[placeholder*="Header Name"]"#,
                ],
            ),
            header_value: LocatorSet::new(
                "header value",
                &[
                    r#"[data-testid="header-value"]"#,
                    r#"input[placeholder*="Header Value"]"#,
                ],
            ),
            test_connection: LocatorSet::new(
                "test connection button",
                &[
                    r#"[data-testid="test-connection"]"#,
                    ".test-connection-btn",
                    r#"button:has-text("Test Connection")"#,
                ],
            ),
            connection_error: LocatorSet::new(
                "connection error",
                &[r#"[data-testid="error-message"]"#, ".error"],
            ),
            continue_button: continue_button(),
            save_button: save_button(),
        }
    }

    pub async fn is_loaded(&self) -> bool {
        match self.base.find(&self.header, Some(SETUP_TIMEOUT)).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Destination page not loaded: {}", e);
                false
            }
        }
    }

    pub async fn select_webhook(&self) -> E2eResult<()> {
        self.base.find(&self.type_picker, None).await?;
        self.base.click_first(&self.webhook_option).await
    }

    pub async fn enter_name(&self, name: &str) -> E2eResult<()> {
        self.base.fill_first(&self.name_input, name).await
    }

    pub async fn enter_webhook_url(&self, url: &str) -> E2eResult<()> {
        self.base.fill_first(&self.url_input, url).await
    }

    pub async fn select_http_method(&self, method: &str) -> E2eResult<()> {
        let select = self.base.find(&self.method_select, None).await?;
        self.base
            .select_option(select.selector(), SelectOption::Value(method.to_string()))
            .await
    }

    /// Add a custom header; skipped when the form offers no header controls
    pub async fn add_custom_header(&self, name: &str, value: &str) -> E2eResult<bool> {
        let Some(button) = self.add_header.find_visible(self.base.driver()).await else {
            warn!("No header controls, skipping header {}", name);
            return Ok(false);
        };
        self.base.driver().click(button.selector()).await?;
        self.base.fill_first(&self.header_name, name).await?;
        self.base.fill_first(&self.header_value, value).await?;
        Ok(true)
    }

    /// Run the connection test when offered; true when no error shows
    pub async fn test_connection(&self) -> E2eResult<bool> {
        let Some(button) = self.test_connection.find_visible(self.base.driver()).await else {
            return Ok(true);
        };
        self.base.driver().click(button.selector()).await?;
        self.base.settle(CONNECTION_TEST_WAIT).await;
        Ok(!self.connection_error.any_visible(self.base.driver()).await)
    }

    pub async fn click_continue(&self) -> E2eResult<()> {
        self.base.click_when_enabled(&self.continue_button).await
    }

    pub async fn click_save(&self) -> E2eResult<()> {
        self.base.click_when_enabled(&self.save_button).await
    }

    pub async fn create_webhook_destination(
        &self,
        name: &str,
        webhook_url: &str,
        headers: &BTreeMap<String, String>,
    ) -> E2eResult<()> {
        info!("Creating webhook destination: {}", name);

        self.select_webhook().await?;
        self.enter_name(name).await?;
        self.enter_webhook_url(webhook_url).await?;

        for (header, value) in headers {
            self.add_custom_header(header, value).await?;
        }

        if !self.test_connection().await? {
            return Err(E2eError::step(
                "create webhook destination",
                "connection test failed",
            ));
        }

        self.click_continue().await?;
        self.click_save().await?;
        info!("Webhook destination created successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::{FakeElement, FakePage};
    use crate::pages::base::PageSettings;
    use std::sync::Arc;

    fn setup_form() -> FakePage {
        FakePage::new()
            .with(r#"[data-testid="destination-type"]"#, FakeElement::visible())
            .with(".webhook-destination", FakeElement::visible())
            .with(r#"[data-testid="destination-name"]"#, FakeElement::visible())
            .with(r#"[data-testid="webhook-url"]"#, FakeElement::visible())
            .with(".continue-btn", FakeElement::visible())
            .with(".save-btn", FakeElement::visible())
    }

    fn headers() -> BTreeMap<String, String> {
        BTreeMap::from([("X-Test".to_string(), "1".to_string())])
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_without_optional_controls() {
        let fake = Arc::new(setup_form());
        let page = DestinationPage::new(BasePage::new(fake.clone(), PageSettings::default()));

        page.create_webhook_destination("e2e-webhook", "https://webhook.site/abc", &headers())
            .await
            .unwrap();

        assert_eq!(
            fake.value_of(r#"[data-testid="webhook-url"]"#).as_deref(),
            Some("https://webhook.site/abc")
        );
        assert_eq!(fake.actions().last().map(String::as_str), Some("click:.save-btn"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_headers_and_connection_test() {
        let fake = Arc::new(
            setup_form()
                .with(".add-header-btn", FakeElement::visible())
                .with(r#"[data-testid="header-name"]"#, FakeElement::visible())
                .with(r#"[data-testid="header-value"]"#, FakeElement::visible())
                .with(".test-connection-btn", FakeElement::visible()),
        );
        let page = DestinationPage::new(BasePage::new(fake.clone(), PageSettings::default()));

        page.create_webhook_destination("e2e-webhook", "https://webhook.site/abc", &headers())
            .await
            .unwrap();

        assert_eq!(
            fake.value_of(r#"[data-testid="header-name"]"#).as_deref(),
            Some("X-Test")
        );
        assert!(fake.actions().contains(&"click:.test-connection-btn".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connection_test_aborts() {
        let fake = Arc::new(
            setup_form()
                .with(".test-connection-btn", FakeElement::visible())
                .on("click:.test-connection-btn", |state| {
                    state.show(".error", FakeElement::visible().with_text("unreachable"));
                }),
        );
        let page = DestinationPage::new(BasePage::new(fake.clone(), PageSettings::default()));

        let err = page
            .create_webhook_destination("e2e-webhook", "https://bad.example", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::StepFailed { .. }));
        assert!(!fake.actions().contains(&"click:.save-btn".to_string()));
    }
}
