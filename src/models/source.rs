//! Source descriptors: the immutable, configured view of one monitored site.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which fetch strategy retrieves a source's document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategyKind {
    /// Plain HTTP GET.
    #[default]
    Http,
    /// Rendered in a headless browser.
    Browser,
}

impl FetchStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Browser => "browser",
        }
    }
}

/// One configured remote target.
///
/// Loaded once at startup and shared read-only with every execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique source name, used as the source identifier in storage.
    pub name: String,
    /// Target locator.
    pub url: String,
    /// Free-form category from the configuration (`news`, `shop`, ...).
    pub kind: Option<String>,
    /// Field name to CSS selector.
    pub selectors: BTreeMap<String, String>,
    pub fetch: FetchStrategyKind,
    /// Cadence string (`*/N`, `hourly`, `daily`, `daily-at-HH:MM`).
    pub schedule: Option<String>,
    pub enabled: bool,
}

impl SourceDescriptor {
    /// Create an enabled HTTP source with no own cadence.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind: None,
            selectors: BTreeMap::new(),
            fetch: FetchStrategyKind::Http,
            schedule: None,
            enabled: true,
        }
    }

    pub fn with_selector(mut self, field: impl Into<String>, selector: impl Into<String>) -> Self {
        self.selectors.insert(field.into(), selector.into());
        self
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    pub fn with_fetch(mut self, fetch: FetchStrategyKind) -> Self {
        self.fetch = fetch;
        self
    }
}
