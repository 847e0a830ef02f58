//! Login page and the login state machine

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::base::BasePage;
use crate::error::{E2eError, E2eResult};
use crate::locator::LocatorSet;

/// How long to wait for the app to leave the login page after submitting
const POST_LOGIN_TIMEOUT: Duration = Duration::from_secs(15);
const OUTCOME_PROBE_INTERVAL: Duration = Duration::from_millis(250);
const LOADED_TIMEOUT: Duration = Duration::from_secs(10);
const FORM_SETTLE: Duration = Duration::from_secs(2);

/// Paths that count as "inside the app" after login
const POST_LOGIN_PATHS: &[&str] = &["/connections", "/dashboard"];

/// Where a login attempt stands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoginState {
    #[default]
    LoggedOut,
    Submitting,
    LoggedIn,
    LoginError { message: String },
}

impl LoginState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, LoginState::LoggedIn)
    }
}

/// True when `url` is an app page reached only after a successful login
pub fn is_post_login_url(url: &str) -> bool {
    !url.contains("/login") && POST_LOGIN_PATHS.iter().any(|p| url.contains(p))
}

/// Settle a submitted login from what the page shows
pub fn classify_login(url: &str, error: Option<String>) -> LoginState {
    if is_post_login_url(url) {
        return LoginState::LoggedIn;
    }
    match error {
        Some(message) => LoginState::LoginError { message },
        None if url.contains("/login") => LoginState::LoginError {
            message: "still on the login page".to_string(),
        },
        None => LoginState::LoginError {
            message: format!("unexpected page after login: {}", url),
        },
    }
}

/// Selectors for the login form
pub struct LoginSelectors {
    pub email: LocatorSet,
    pub password: LocatorSet,
    pub submit: LocatorSet,
    pub error: LocatorSet,
    pub loaded: LocatorSet,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        let email = LocatorSet::new(
            "email input",
            &[r#"input[type="email"]"#, r#"input[name="email"]"#, "#email"],
        );
        let password = LocatorSet::new(
            "password input",
            &[
                r#"input[type="password"]"#,
                r#"input[name="password"]"#,
                "#password",
            ],
        );
        let loaded = email.with_fallbacks(&[
            r#"form[action*="login"]"#,
            r#"form:has(input[type="password"])"#,
            r#"[data-testid*="login"]"#,
            ".login-form",
        ]);

        Self {
            email,
            password,
            submit: LocatorSet::new(
                "login button",
                &[
                    r#"button[type="submit"]"#,
                    r#"button:has-text("Sign in")"#,
                    r#"button:has-text("Log in")"#,
                    ".ant-btn-primary",
                    r#"input[type="submit"]"#,
                    "form button:last-child",
                ],
            ),
            error: LocatorSet::new(
                "login error",
                &[".ant-form-item-explain-error", ".error-message", r#"[role="alert"]"#],
            ),
            loaded,
        }
    }
}

pub struct LoginPage {
    base: BasePage,
    selectors: LoginSelectors,
    state: LoginState,
}

impl LoginPage {
    pub fn new(base: BasePage) -> Self {
        Self {
            base,
            selectors: LoginSelectors::default(),
            state: LoginState::LoggedOut,
        }
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    pub fn base(&self) -> &BasePage {
        &self.base
    }

    pub async fn navigate(&self) -> E2eResult<()> {
        self.base.navigate("/login").await
    }

    pub async fn is_loaded(&self) -> bool {
        match self.base.find(&self.selectors.loaded, Some(LOADED_TIMEOUT)).await {
            Ok(found) => {
                debug!("Login page detected via {}", found);
                true
            }
            Err(e) => {
                warn!("Login page not loaded: {}", e);
                false
            }
        }
    }

    /// Submit credentials and wait for the outcome
    ///
    /// Returns the final state; `Err` only when the form itself could not be
    /// driven.
    pub async fn login(&mut self, email: &str, password: &str) -> E2eResult<LoginState> {
        info!("Logging in as {}", email);
        self.state = LoginState::Submitting;

        if let Err(e) = self.submit(email, password).await {
            self.state = LoginState::LoginError {
                message: e.to_string(),
            };
            return Err(e);
        }

        self.state = match self.await_outcome().await {
            Ok(state) => state,
            Err(e) => {
                self.state = LoginState::LoginError {
                    message: e.to_string(),
                };
                return Err(e);
            }
        };
        match &self.state {
            LoginState::LoggedIn => info!("Login successful"),
            LoginState::LoginError { message } => warn!("Login failed: {}", message),
            _ => {}
        }
        Ok(self.state.clone())
    }

    async fn submit(&self, email: &str, password: &str) -> E2eResult<()> {
        self.base.find(&self.selectors.email, None).await?;
        self.base.settle(FORM_SETTLE).await;

        self.base.fill_first(&self.selectors.email, email).await?;
        self.base.fill_first(&self.selectors.password, password).await?;

        match self.selectors.submit.find_visible(self.base.driver()).await {
            Some(button) => {
                debug!("Submitting via {}", button);
                self.base.driver().click(button.selector()).await
            }
            None => {
                debug!("No submit control visible, pressing Enter");
                let field = self.selectors.password.resolve(self.base.driver()).await?;
                self.base.driver().press(field.selector(), "Enter").await
            }
        }
    }

    async fn await_outcome(&self) -> E2eResult<LoginState> {
        let start = Instant::now();
        loop {
            let url = self.base.current_url().await?;
            if is_post_login_url(&url) {
                return Ok(LoginState::LoggedIn);
            }
            if let Some(message) = self.error_message().await {
                return Ok(LoginState::LoginError { message });
            }
            if start.elapsed() >= POST_LOGIN_TIMEOUT {
                return Ok(classify_login(&url, None));
            }
            tokio::time::sleep(OUTCOME_PROBE_INTERVAL).await;
        }
    }

    /// Text of the first visible error element
    pub async fn error_message(&self) -> Option<String> {
        let found = self.selectors.error.find_visible(self.base.driver()).await?;
        let text = self
            .base
            .driver()
            .text_content(found.selector())
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        Some(text.trim().to_string())
    }

    pub async fn is_error_displayed(&self) -> bool {
        self.selectors.error.any_visible(self.base.driver()).await
    }

    pub async fn is_logged_in(&self) -> E2eResult<bool> {
        Ok(is_post_login_url(&self.base.current_url().await?))
    }

    /// Log in and fail unless the app was reached
    pub async fn login_expecting_success(&mut self, email: &str, password: &str) -> E2eResult<()> {
        match self.login(email, password).await? {
            LoginState::LoggedIn => Ok(()),
            LoginState::LoginError { message } => Err(E2eError::step("login", message)),
            other => Err(E2eError::step("login", format!("ended in {:?}", other))),
        }
    }
}
