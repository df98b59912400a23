use crate::browser::{pacing::Pacing, page::PageSession};
use anyhow::{Context, Result};
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use std::time::Duration;
use webdriver::capabilities::Capabilities;

/// How the Chrome session behind the WebDriver endpoint is launched.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub webdriver_url: String,
    pub headless: bool,
    pub user_agent: String,
    pub locale: String,
    pub viewport: (u32, u32),
    /// Upper bound for every wait on an element.
    pub timeout: Duration,
    /// Skip image downloads; posts are read as text only.
    pub block_images: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            user_agent: String::new(),
            locale: "ja-JP".to_string(),
            viewport: (500, 5000),
            timeout: Duration::from_secs(10),
            block_images: true,
        }
    }
}

/// Construct Chrome command-line arguments for the given options.
pub fn chrome_arguments(opts: &DriverOptions) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        "--disable-extensions".to_string(),
        format!("--window-size={},{}", opts.viewport.0, opts.viewport.1),
        format!("--lang={}", opts.locale),
    ];
    if !opts.user_agent.trim().is_empty() {
        args.push(format!("--user-agent={}", opts.user_agent.trim()));
    }
    if opts.block_images {
        args.push("--blink-settings=imagesEnabled=false".to_string());
    }
    if opts.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args
}

/// Thin wrapper around a `fantoccini` WebDriver client.
pub struct BrowserDriver {
    client: Client,
    options: DriverOptions,
    pacing: Pacing,
}

impl BrowserDriver {
    /// Create a new session on a running WebDriver service (chromedriver).
    pub async fn new(options: DriverOptions) -> Result<Self> {
        let mut caps = Capabilities::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({
                "args": chrome_arguments(&options),
                "prefs": { "intl.accept_languages": options.locale },
            }),
        );
        // Return once the DOM is parsed; the feed waits for its own elements.
        caps.insert("pageLoadStrategy".to_string(), json!("eager"));

        tracing::debug!(
            webdriver_url = %options.webdriver_url,
            headless = options.headless,
            locale = %options.locale,
            "browser.session.connect"
        );

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&options.webdriver_url)
            .await
            .with_context(|| {
                format!("failed to open WebDriver session at {}", options.webdriver_url)
            })?;

        Ok(Self {
            client,
            options,
            pacing: Pacing::new(),
        })
    }

    /// Navigate to `url` and return a [`PageSession`] bound to this browser.
    pub async fn open(&self, url: &str) -> Result<PageSession> {
        let page = PageSession::new(self.client.clone(), self.pacing.clone(), self.options.timeout);
        page.goto(url).await?;
        Ok(page)
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_adds_headless_flags() {
        let args = chrome_arguments(&DriverOptions::default());
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert!(args.iter().any(|a| a == "--window-size=500,5000"));
        assert!(args.iter().any(|a| a == "--lang=ja-JP"));
    }

    #[test]
    fn headed_session_has_no_headless_flag() {
        let opts = DriverOptions {
            headless: false,
            ..DriverOptions::default()
        };
        assert!(!chrome_arguments(&opts).iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn user_agent_is_only_set_when_configured() {
        let mut opts = DriverOptions::default();
        assert!(!chrome_arguments(&opts).iter().any(|a| a.starts_with("--user-agent")));
        opts.user_agent = "promo-agent/1.0".into();
        assert!(chrome_arguments(&opts)
            .iter()
            .any(|a| a == "--user-agent=promo-agent/1.0"));
    }

    #[test]
    fn images_can_stay_enabled() {
        let opts = DriverOptions {
            block_images: false,
            ..DriverOptions::default()
        };
        assert!(!chrome_arguments(&opts)
            .iter()
            .any(|a| a.contains("imagesEnabled")));
    }
}
