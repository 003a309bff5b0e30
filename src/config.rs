//! Configuration document and settings.
//!
//! The document lists monitored websites plus general, notification and
//! export settings. It is read from JSON, TOML or YAML depending on the
//! file extension.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{FetchStrategyKind, SourceDescriptor};
use crate::scrapers::BrowserEngineConfig;
use crate::services::{Cadence, RetryPolicy};

/// Default config file name in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "scraper_config.json";

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "SCRAPEWATCH_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One monitored website.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsiteConfig {
    pub name: String,
    pub url: String,
    /// Free-form category (`news`, `ecommerce`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Field name to CSS selector.
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
    /// Own cadence; sources without one are covered by the global schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Render with a headless browser instead of a plain GET.
    #[serde(default, alias = "use_browser")]
    pub use_selenium: bool,
}

impl WebsiteConfig {
    pub fn to_descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            name: self.name.clone(),
            url: self.url.clone(),
            kind: self.kind.clone(),
            selectors: self.selectors.clone(),
            fetch: if self.use_selenium {
                FetchStrategyKind::Browser
            } else {
                FetchStrategyKind::Http
            },
            schedule: self.schedule.clone(),
            enabled: self.enabled,
        }
    }
}

/// Settings shared by every source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// User agent string; `impersonate` picks a real browser agent.
    pub user_agent: String,
    /// Per-attempt fetch timeout in seconds.
    pub timeout: u64,
    /// Fetch attempts per execution, including the first.
    pub max_retries: u32,
    /// Minimum spacing in seconds between requests to the same host.
    pub delay_between_requests: f64,
    /// Concurrent executions cap.
    pub max_workers: usize,
    pub backoff_base_secs: f64,
    pub backoff_max_secs: f64,
    pub tick_interval_secs: u64,
    /// Cadence for sources without their own. Empty disables it.
    pub global_schedule: String,
    pub shutdown_grace_secs: u64,
    /// Directory holding the database. Defaults to the config file's directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    pub browser: BrowserEngineConfig,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            user_agent: crate::scrapers::USER_AGENT.to_string(),
            timeout: 10,
            max_retries: 3,
            delay_between_requests: 1.0,
            max_workers: 5,
            backoff_base_secs: 2.0,
            backoff_max_secs: 60.0,
            tick_interval_secs: 60,
            global_schedule: "*/30".to_string(),
            shutdown_grace_secs: 30,
            data_dir: None,
            database: "scraping_data.db".to_string(),
            log_file: None,
            browser: BrowserEngineConfig::default(),
        }
    }
}

/// SMTP settings. Kept for document compatibility; no transport is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub recipients: Vec<String>,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            recipients: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Notification channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub email: EmailSettings,
    pub webhook: WebhookSettings,
    /// Write change events to the log.
    pub log: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email: EmailSettings::default(),
            webhook: WebhookSettings::default(),
            log: true,
        }
    }
}

/// Periodic report export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Reports are only produced when enabled.
    pub excel_export: bool,
    pub export_schedule: String,
    pub max_records_per_file: usize,
    pub report_dir: String,
    pub report_window_hours: u64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            excel_export: true,
            export_schedule: "daily".to_string(),
            max_records_per_file: 10_000,
            report_dir: "reports".to_string(),
            report_window_hours: 24,
        }
    }
}

/// The configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub websites: Vec<WebsiteConfig>,
    #[serde(default)]
    pub general_settings: GeneralSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub export_settings: ExportSettings,

    /// Path of the file this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
    /// True when the file did not exist and the default was written.
    #[serde(skip)]
    pub created_default: bool,
}

fn default_true() -> bool {
    true
}

enum Format {
    Json,
    Toml,
    Yaml,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::Toml,
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

impl Config {
    /// The document written when no config file exists: one disabled
    /// example source.
    pub fn default_document() -> Self {
        let mut selectors = BTreeMap::new();
        selectors.insert("title".to_string(), ".news-title".to_string());
        selectors.insert("content".to_string(), ".news-content".to_string());

        Self {
            websites: vec![WebsiteConfig {
                name: "example_news".to_string(),
                url: "https://example-news.com".to_string(),
                kind: Some("news".to_string()),
                selectors,
                schedule: Some("*/30".to_string()),
                enabled: false,
                use_selenium: false,
            }],
            ..Self::default()
        }
    }

    /// Pick the config file: explicit path, then `./scraper_config.json`,
    /// then the user config directory. Falls back to the working directory
    /// location when none exist.
    pub fn discover_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return local;
        }

        if let Some(user) = dirs::config_dir().map(|d| d.join("scrapewatch").join("config.json")) {
            if user.exists() {
                return user;
            }
        }

        local
    }

    /// Load the config at `path`, writing and returning the default document
    /// when the file does not exist. A malformed file is an error.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let mut config = Self::default_document();
            config.write_to_path(path).await?;
            config.source_path = Some(path.to_path_buf());
            config.created_default = true;
            return Ok(config);
        }

        let config = Self::load_from_path(path).await?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let mut config: Config = match Format::of(path) {
            Format::Toml => toml::from_str(&contents).map_err(|e| parse_err(e.to_string()))?,
            Format::Yaml => serde_yaml::from_str(&contents).map_err(|e| parse_err(e.to_string()))?,
            Format::Json => serde_json::from_str(&contents).map_err(|e| parse_err(e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        config.general_settings.browser = config.general_settings.browser.with_env_overrides();
        Ok(config)
    }

    /// Serialize in the format implied by the extension and write to `path`.
    pub async fn write_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let rendered = match Format::of(path) {
            Format::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            Format::Yaml => {
                serde_yaml::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            Format::Json => serde_json::to_string_pretty(self)
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        tokio::fs::write(path, rendered).await.map_err(write_err)?;

        info!("Wrote configuration to {}", path.display());
        Ok(())
    }

    /// Check structural constraints. Unparseable cadences are not errors;
    /// the scheduler skips those sources with a warning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for site in &self.websites {
            if site.name.trim().is_empty() {
                return Err(ConfigError::Invalid("website with empty name".to_string()));
            }
            if site.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "website '{}' has no url",
                    site.name
                )));
            }
            if !seen.insert(site.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate website name '{}'",
                    site.name
                )));
            }
        }

        let general = &self.general_settings;
        if general.max_retries < 1 {
            return Err(ConfigError::Invalid(
                "general_settings.max_retries must be at least 1".to_string(),
            ));
        }
        if general.max_workers < 1 {
            return Err(ConfigError::Invalid(
                "general_settings.max_workers must be at least 1".to_string(),
            ));
        }
        if !general.delay_between_requests.is_finite() || general.delay_between_requests < 0.0 {
            return Err(ConfigError::Invalid(
                "general_settings.delay_between_requests must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory that relative paths resolve against.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        let base = self.base_dir();
        match self.general_settings.data_dir {
            Some(ref dir) => self.resolve_path(dir, &base),
            None => base,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve_path(&self.general_settings.database, &self.data_dir())
    }

    pub fn report_dir(&self) -> PathBuf {
        self.resolve_path(&self.export_settings.report_dir, &self.base_dir())
    }

    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.general_settings
            .log_file
            .as_deref()
            .map(|f| self.resolve_path(f, &self.base_dir()))
    }

    /// Every configured source, enabled or not.
    pub fn sources(&self) -> Vec<SourceDescriptor> {
        self.websites.iter().map(WebsiteConfig::to_descriptor).collect()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.general_settings.timeout.max(1))
    }

    pub fn request_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.general_settings.delay_between_requests)
            .unwrap_or(Duration::ZERO)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.general_settings.tick_interval_secs.max(1))
    }

    /// Look-back window for scheduled reports.
    pub fn report_window(&self) -> Duration {
        window_from_hours(self.export_settings.report_window_hours)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.general_settings.shutdown_grace_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let general = &self.general_settings;
        let secs = |s: f64| Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO);
        RetryPolicy {
            max_attempts: general.max_retries.max(1),
            base_delay: secs(general.backoff_base_secs),
            max_delay: secs(general.backoff_max_secs),
        }
    }

    /// Cadence for sources without their own. `None` when disabled or invalid.
    pub fn global_cadence(&self) -> Option<Cadence> {
        parse_optional_cadence("general_settings.global_schedule", &self.general_settings.global_schedule)
    }

    /// Report cadence, `None` when reporting is disabled.
    pub fn report_cadence(&self) -> Option<Cadence> {
        if !self.export_settings.excel_export {
            return None;
        }
        parse_optional_cadence("export_settings.export_schedule", &self.export_settings.export_schedule)
    }
}

/// A window of whole hours, at least one. Absurd values saturate.
pub fn window_from_hours(hours: u64) -> Duration {
    Duration::from_secs(hours.max(1).saturating_mul(3600))
}

fn parse_optional_cadence(key: &str, value: &str) -> Option<Cadence> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("off") {
        return None;
    }
    match value.parse() {
        Ok(cadence) => Some(cadence),
        Err(e) => {
            warn!(error = %e, "Ignoring {}", key);
            None
        }
    }
}
