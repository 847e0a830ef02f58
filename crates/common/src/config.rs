//! Suite configuration
//!
//! Configuration is read once at process start from environment variables
//! (optionally seeded from a `.env` file), resolved against a named
//! environment profile, validated, and then handed to every consumer as an
//! immutable [`SuiteConfig`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::Credentials;

/// Data plane used when neither the environment nor the profile provides one
pub const DEFAULT_DATA_PLANE_URL: &str = "https://hosted.rudderlabs.com";

/// Collector URL used by steps when `REQUEST_CATCHER_URL` is unset
pub const DEFAULT_WEBHOOK_URL: &str = "https://webhook.site/unique-id";

/// Browser engine driven by Playwright
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(Error::InvalidEnvValue {
                name: "BROWSER".to_string(),
                value: other.to_string(),
                reason: "expected chromium, firefox or webkit".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Console log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// A named deployment of the platform under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    pub name: String,
    pub base_url: String,
    pub data_plane_url: String,
}

impl EnvironmentProfile {
    /// Built-in profiles for the hosted environments
    pub fn builtin() -> Vec<Self> {
        vec![
            Self {
                name: "dev".to_string(),
                base_url: "https://app-dev.rudderstack.com".to_string(),
                data_plane_url: "https://dev-dataplane.rudderstack.com".to_string(),
            },
            Self {
                name: "qa".to_string(),
                base_url: "https://app-qa.rudderstack.com".to_string(),
                data_plane_url: "https://qa-dataplane.rudderstack.com".to_string(),
            },
            Self {
                name: "prod".to_string(),
                base_url: "https://app.rudderstack.com".to_string(),
                data_plane_url: "https://prod-dataplane.rudderstack.com".to_string(),
            },
        ]
    }

    /// Parse a profile from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    /// Parse a profile from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load every `*.yaml`/`*.yml` profile below a directory
    pub fn load_all(dir: &Path) -> Result<Vec<Self>> {
        let mut profiles = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let profile = Self::from_file(entry.path())?;
            debug!("Loaded environment profile '{}' from {}", profile.name, entry.path().display());
            profiles.push(profile);
        }

        Ok(profiles)
    }

    /// Resolve a profile by name; file profiles override built-ins of the same name
    pub fn resolve(name: &str, overrides: Vec<Self>) -> Result<Self> {
        let wanted = name.to_ascii_lowercase();
        overrides
            .into_iter()
            .chain(Self::builtin())
            .find(|p| p.name.eq_ignore_ascii_case(&wanted))
            .ok_or(Error::UnknownEnvironment(wanted))
    }
}

/// Viewport size for new pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Eventual-delivery polling bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySettings {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(2),
        }
    }
}

/// Which diagnostics to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactSettings {
    pub screenshots: bool,
    pub videos: bool,
    pub traces: bool,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            screenshots: true,
            videos: false,
            traces: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `rudder_e2e=debug`
    pub level: String,
    pub format: LogFormat,
    /// Plain-text log file; `None` disables the file sink
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: Some(PathBuf::from("reports/logs/test.log")),
        }
    }
}

/// Immutable snapshot of everything the suite reads from its environment
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub environment: EnvironmentProfile,
    pub credentials: Credentials,
    /// Pre-provisioned source write key, if any
    pub write_key: Option<String>,
    /// Webhook collector URL, if any
    pub webhook_url: Option<String>,
    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,
    /// Upper bound for a single UI action
    pub action_timeout: Duration,
    /// Upper bound for a single ingestion call
    pub api_timeout: Duration,
    pub retries: u32,
    pub parallel_workers: usize,
    pub delivery: DeliverySettings,
    pub artifacts: ArtifactSettings,
    pub logging: LoggingConfig,
    pub reports_dir: PathBuf,
    pub ci: bool,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        let environment = EnvironmentProfile::builtin()
            .into_iter()
            .next()
            .unwrap_or_else(|| EnvironmentProfile {
                name: "dev".to_string(),
                base_url: "https://app-dev.rudderstack.com".to_string(),
                data_plane_url: DEFAULT_DATA_PLANE_URL.to_string(),
            });

        Self {
            environment,
            credentials: Credentials::default(),
            write_key: None,
            webhook_url: None,
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
            action_timeout: Duration::from_millis(30_000),
            api_timeout: Duration::from_millis(30_000),
            retries: 2,
            parallel_workers: 1,
            delivery: DeliverySettings::default(),
            artifacts: ArtifactSettings::default(),
            logging: LoggingConfig::default(),
            reports_dir: PathBuf::from("reports"),
            ci: false,
        }
    }
}

impl SuiteConfig {
    /// Build configuration from the process environment, loading `.env` first
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => warn!("Ignoring unreadable .env file: {}", e),
        }

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from a map of variables
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Vars(&lookup);
        let defaults = Self::default();

        let env_name = env.get("ENVIRONMENT").unwrap_or_else(|| "dev".to_string());
        let profiles_dir = env
            .get("ENVIRONMENTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config/environments"));
        let overrides = if profiles_dir.is_dir() {
            EnvironmentProfile::load_all(&profiles_dir)?
        } else {
            Vec::new()
        };

        let mut environment = EnvironmentProfile::resolve(&env_name, overrides)?;
        if let Some(base_url) = env.get("RUDDERSTACK_BASE_URL").or_else(|| env.get("BASE_URL")) {
            environment.base_url = base_url;
        }
        if let Some(data_plane_url) = env.get("RUDDERSTACK_DATA_PLANE_URL") {
            environment.data_plane_url = data_plane_url;
        }
        if environment.data_plane_url.is_empty() {
            environment.data_plane_url = DEFAULT_DATA_PLANE_URL.to_string();
        }

        let browser = match env.get("BROWSER") {
            Some(value) => value.parse()?,
            None => defaults.browser,
        };

        let reports_dir = env
            .get("REPORTS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.reports_dir);

        let format = match env.get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(invalid("LOG_FORMAT", other, "expected text or json"));
            }
        };

        let parallel_workers = env.parse_or("PARALLEL_WORKERS", defaults.parallel_workers)?;
        if parallel_workers == 0 {
            return Err(invalid("PARALLEL_WORKERS", "0", "must be at least 1"));
        }

        let delivery = DeliverySettings {
            timeout: Duration::from_secs(
                env.parse_or("DELIVERY_TIMEOUT_SECS", defaults.delivery.timeout.as_secs())?,
            ),
            interval: Duration::from_secs(
                env.parse_or("DELIVERY_POLL_INTERVAL_SECS", defaults.delivery.interval.as_secs())?,
            ),
        };

        let config = Self {
            environment,
            credentials: Credentials {
                username: env.get("RUDDERSTACK_USERNAME").unwrap_or_default(),
                password: env.get("RUDDERSTACK_PASSWORD").unwrap_or_default(),
            },
            write_key: env.get("RUDDERSTACK_WRITE_KEY"),
            webhook_url: env.get("REQUEST_CATCHER_URL"),
            browser,
            headless: env.flag_unless_false("HEADLESS"),
            viewport: Viewport {
                width: env.parse_or("VIEWPORT_WIDTH", defaults.viewport.width)?,
                height: env.parse_or("VIEWPORT_HEIGHT", defaults.viewport.height)?,
            },
            action_timeout: Duration::from_millis(
                env.parse_or("TIMEOUT", defaults.action_timeout.as_millis() as u64)?,
            ),
            api_timeout: Duration::from_millis(
                env.parse_or("API_TIMEOUT", defaults.api_timeout.as_millis() as u64)?,
            ),
            retries: env.parse_or("RETRY_COUNT", defaults.retries)?,
            parallel_workers,
            delivery,
            artifacts: ArtifactSettings {
                screenshots: env.flag_unless_false("SCREENSHOTS"),
                videos: env.flag_if_true("VIDEOS"),
                traces: env.flag_if_true("TRACES"),
            },
            logging: LoggingConfig {
                level: env.get("LOG_LEVEL").unwrap_or(defaults.logging.level),
                format,
                file: Some(reports_dir.join("logs").join("test.log")),
            },
            reports_dir,
            ci: env.flag_if_true("CI"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the suite cannot run with
    pub fn validate(&self) -> Result<()> {
        require_http_url("base URL", &self.environment.base_url)?;
        require_http_url("data plane URL", &self.environment.data_plane_url)?;
        if let Some(url) = &self.webhook_url {
            require_http_url("webhook URL", url)?;
        }
        if self.delivery.interval.is_zero() {
            return Err(Error::InvalidConfig(
                "delivery poll interval must be greater than zero".to_string(),
            ));
        }
        if self.delivery.interval > self.delivery.timeout {
            return Err(Error::InvalidConfig(format!(
                "delivery poll interval ({:?}) exceeds delivery timeout ({:?})",
                self.delivery.interval, self.delivery.timeout
            )));
        }
        if self.action_timeout.is_zero() {
            return Err(Error::InvalidConfig("TIMEOUT must be greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.environment.base_url.trim_end_matches('/')
    }

    pub fn data_plane_url(&self) -> &str {
        self.environment.data_plane_url.trim_end_matches('/')
    }

    /// Webhook collector URL with the default used by scenarios
    pub fn webhook_url_or_default(&self) -> &str {
        self.webhook_url.as_deref().unwrap_or(DEFAULT_WEBHOOK_URL)
    }

    pub fn is_ci(&self) -> bool {
        self.ci
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.reports_dir.join("screenshots")
    }

    pub fn video_dir(&self) -> PathBuf {
        self.reports_dir.join("videos")
    }

    pub fn test_data_dir(&self) -> PathBuf {
        self.reports_dir.join("test-data")
    }
}

struct Vars<'a, F>(&'a F);

impl<'a, F> Vars<'a, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| invalid(name, &raw, &e.to_string())),
            None => Ok(default),
        }
    }

    fn flag_unless_false(&self, name: &str) -> bool {
        self.get(name).map(|v| v != "false").unwrap_or(true)
    }

    fn flag_if_true(&self, name: &str) -> bool {
        self.get(name).map(|v| v == "true").unwrap_or(false)
    }
}

fn invalid(name: &str, value: &str, reason: &str) -> Error {
    Error::InvalidEnvValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn require_http_url(what: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else if url.is_empty() {
        Err(Error::InvalidConfig(format!("{} is not configured", what)))
    } else {
        Err(Error::InvalidConfig(format!(
            "{} must be an http(s) URL, got {:?}",
            what, url
        )))
    }
}
