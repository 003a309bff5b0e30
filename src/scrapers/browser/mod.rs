//! Browser-rendered fetch strategy for script-heavy sites.
//!
//! Uses chromiumoxide (CDP). A single browser is launched lazily and
//! shared across fetches; each fetch opens and closes its own tab.
//! Without the `browser` feature the strategy exists but every fetch fails
//! permanently.

mod config;

pub use config::BrowserEngineConfig;

use std::time::Duration;

use async_trait::async_trait;

use super::{Document, FetchError, FetchStrategy};

#[cfg(feature = "browser")]
use std::sync::Arc;

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

/// Browser-based fetcher.
#[cfg(feature = "browser")]
pub struct BrowserFetcher {
    config: BrowserEngineConfig,
    user_agent: String,
    browser: Mutex<Option<Arc<Browser>>>,
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    pub fn new(config: BrowserEngineConfig, user_agent: impl Into<String>) -> Self {
        Self {
            config,
            user_agent: user_agent.into(),
            browser: Mutex::new(None),
        }
    }

    fn find_chrome() -> Result<std::path::PathBuf, FetchError> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &["google-chrome", "chromium", "chromium-browser"] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(FetchError::Permanent(
            "Chrome/Chromium not found; install it or set BROWSER_URL".to_string(),
        ))
    }

    /// Return the shared browser, launching or connecting on first use.
    async fn ensure_browser(&self) -> Result<Arc<Browser>, FetchError> {
        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        let browser = match self.config.remote_url.clone() {
            Some(remote_url) => self.connect_remote(&remote_url).await?,
            None => self.launch().await?,
        };
        let browser = Arc::new(browser);
        *slot = Some(browser.clone());
        Ok(browser)
    }

    async fn launch(&self) -> Result<Browser, FetchError> {
        info!("Launching browser (headless={})", self.config.headless);
        let chrome_path = Self::find_chrome()?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);
        // with_head means NOT headless
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        builder = builder
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| FetchError::Permanent(format!("invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Transient(format!("failed to launch browser: {}", e)))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    async fn connect_remote(&self, url: &str) -> Result<Browser, FetchError> {
        info!("Connecting to remote browser at {}", url);

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let unreachable = |e: reqwest::Error| {
            FetchError::Transient(format!("remote browser unreachable at {}: {}", url, e))
        };
        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .map_err(unreachable)?
            .json()
            .await
            .map_err(unreachable)?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                FetchError::Permanent(format!("no webSocketDebuggerUrl from {}", version_url))
            })?;

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(self.config.timeout),
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| FetchError::Transient(format!("failed to connect browser: {}", e)))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    async fn render(&self, browser: &Browser, url: &str) -> Result<Document, FetchError> {
        let cdp = |e: chromiumoxide::error::CdpError| {
            FetchError::Transient(format!("browser error for {}: {}", url, e))
        };

        let page = browser.new_page("about:blank").await.map_err(cdp)?;
        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(cdp)?;

        debug!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| FetchError::Permanent(format!("invalid locator {}: {}", url, e)))?;
        page.execute(nav_params).await.map_err(cdp)?;

        let wait_for_ready_script = r#"
            new Promise((resolve) => {
                if (document.readyState === 'complete' || document.readyState === 'interactive') {
                    resolve(document.readyState);
                } else {
                    document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
                }
            })
        "#;
        let ready_timeout = Duration::from_secs(self.config.timeout);
        match tokio::time::timeout(
            ready_timeout,
            page.evaluate(wait_for_ready_script.to_string()),
        )
        .await
        {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => debug!("Could not check ready state: {}", e),
            Err(_) => warn!("Timeout waiting for page ready state"),
        }

        if let Some(ref selector) = self.config.wait_for_selector {
            match tokio::time::timeout(ready_timeout, page.find_element(selector.as_str())).await {
                Ok(Ok(_)) => debug!("Selector {} found", selector),
                Ok(Err(e)) => warn!("Selector {} not found: {}", selector, e),
                Err(_) => warn!("Timeout waiting for selector {}", selector),
            }
        }

        let final_url = page
            .url()
            .await
            .map_err(cdp)?
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());
        let body = page.content().await.map_err(cdp)?;

        // Close the tab so they don't accumulate.
        let _ = page.close().await;

        Ok(Document {
            url: url.to_string(),
            final_url,
            body,
            fetched_at: chrono::Utc::now(),
        })
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl FetchStrategy for BrowserFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Document, FetchError> {
        url::Url::parse(url)
            .map_err(|e| FetchError::Permanent(format!("malformed locator {}: {}", url, e)))?;

        let browser = self.ensure_browser().await?;
        match tokio::time::timeout(timeout, self.render(&browser, url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Transient(format!(
                "browser render of {} timed out",
                url
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserFetcher {
    _config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub fn new(config: BrowserEngineConfig, _user_agent: impl Into<String>) -> Self {
        Self { _config: config }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl FetchStrategy for BrowserFetcher {
    async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<Document, FetchError> {
        Err(FetchError::Permanent(
            "browser support not compiled; rebuild with --features browser".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: BrowserEngineConfig = serde_json::from_str("{}").unwrap();
        assert!(config.headless);
        assert_eq!(config.timeout, 30);
        assert!(config.remote_url.is_none());
    }

    #[tokio::test]
    async fn test_malformed_locator_is_permanent() {
        let fetcher = BrowserFetcher::new(BrowserEngineConfig::default(), "test-agent");
        let err = fetcher
            .fetch("not a url", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
