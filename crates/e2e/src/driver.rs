//! Browser page abstraction
//!
//! Page objects talk to a [`PageDriver`] rather than to Playwright directly,
//! so selector fallback and login classification can be exercised against an
//! in-memory page in unit tests.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::error::E2eResult;

/// Element state to wait for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

/// Document load milestone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    #[serde(rename = "load")]
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[default]
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// How to pick an entry of a `<select>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectOption {
    Value(String),
    Label(String),
    Index(u32),
}

/// Operations the page objects need from a browser tab
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> E2eResult<()>;
    async fn wait_for_load(&self, state: LoadState) -> E2eResult<()>;
    async fn url(&self) -> E2eResult<String>;
    async fn title(&self) -> E2eResult<String>;

    async fn is_visible(&self, selector: &str) -> E2eResult<bool>;
    async fn is_enabled(&self, selector: &str) -> E2eResult<bool>;
    async fn is_checked(&self, selector: &str) -> E2eResult<bool>;

    async fn click(&self, selector: &str) -> E2eResult<()>;
    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()>;
    /// Type key by key with `delay` between keystrokes
    async fn type_text(&self, selector: &str, text: &str, delay: Duration) -> E2eResult<()>;
    async fn press(&self, selector: &str, key: &str) -> E2eResult<()>;

    async fn text_content(&self, selector: &str) -> E2eResult<Option<String>>;
    async fn input_value(&self, selector: &str) -> E2eResult<String>;
    async fn attribute(&self, selector: &str, name: &str) -> E2eResult<Option<String>>;
    async fn select_option(&self, selector: &str, option: &SelectOption) -> E2eResult<()>;

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()>;
    /// Wait until the URL matches a glob such as `**/connections`
    async fn wait_for_url(&self, pattern: &str, timeout: Duration) -> E2eResult<()>;

    async fn screenshot(&self, path: &Path, full_page: bool) -> E2eResult<()>;
    /// Evaluate a function expression in the page, passing `arg`
    async fn evaluate(&self, script: &str, arg: Value) -> E2eResult<Value>;

    async fn reload(&self) -> E2eResult<()>;
    async fn go_back(&self) -> E2eResult<()>;
    async fn go_forward(&self) -> E2eResult<()>;
    async fn close(&self) -> E2eResult<()>;
}

/// Match a URL against a Playwright-style glob (`*` within a segment, `**` across)
pub fn url_matches_glob(url: &str, glob: &str) -> bool {
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                pattern.push_str(".*");
            }
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');

    Regex::new(&pattern)
        .map(|re| re.is_match(url))
        .unwrap_or(false)
}
