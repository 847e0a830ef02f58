use rudder_common::{Credentials, SuiteConfig};
use rudder_e2e::clients::ApiResponse;
use rudder_e2e::pages::LoginState;
use rudder_e2e::{Scenario, Suite, WebhookCollector};
use std::fmt;
use std::sync::Arc;

/// Fallback login used when the environment provides none
pub const FALLBACK_USERNAME: &str = "test@business-domain.com";
pub const FALLBACK_PASSWORD: &str = "TestPassword123!";

/// Per-scenario state shared by the step definitions
#[derive(cucumber::World, Default)]
pub struct E2eWorld {
    pub suite: Option<Arc<Suite>>,
    pub scenario: Option<Scenario>,
    pub credentials: Option<Credentials>,
    pub login_state: Option<LoginState>,
    pub collector: Option<WebhookCollector>,
    /// Responses from the latest multi-event send
    pub batch_responses: Vec<ApiResponse>,
}

impl E2eWorld {
    pub fn attach(&mut self, suite: Arc<Suite>, scenario: Scenario) {
        self.suite = Some(suite);
        self.scenario = Some(scenario);
    }

    pub fn suite(&self) -> anyhow::Result<Arc<Suite>> {
        self.suite
            .clone()
            .ok_or_else(|| anyhow::anyhow!("scenario not attached to a suite"))
    }

    pub fn config(&self) -> anyhow::Result<SuiteConfig> {
        Ok(self.suite()?.config().clone())
    }

    pub fn scenario(&mut self) -> anyhow::Result<&mut Scenario> {
        self.scenario
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no browser page for this scenario"))
    }

    /// Configured credentials, falling back to the documented test account
    pub fn credentials_or_default(&self) -> anyhow::Result<Credentials> {
        if let Some(creds) = &self.credentials {
            return Ok(creds.clone());
        }
        let configured = self.config()?.credentials;
        Ok(Credentials::new(
            non_empty_or(configured.username, FALLBACK_USERNAME),
            non_empty_or(configured.password, FALLBACK_PASSWORD),
        ))
    }

    pub fn collector(&self) -> anyhow::Result<&WebhookCollector> {
        self.collector
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no webhook collector configured for this scenario"))
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

impl fmt::Debug for E2eWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("E2eWorld")
            .field("scenario", &self.scenario)
            .field("credentials", &self.credentials)
            .field("login_state", &self.login_state)
            .field("batch_responses", &self.batch_responses.len())
            .finish_non_exhaustive()
    }
}
