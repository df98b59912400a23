use crate::browser::pacing::Pacing;
use anyhow::{anyhow, Context, Result};
use fantoccini::{elements::Element, Client, Locator};
use std::time::{Duration, Instant};
use tokio::time::sleep;

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(250);

const HIDE_AUTOMATION_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    if (!window.chrome) window.chrome = { runtime: {} };
"#;

const SCROLL_INTO_VIEW_SCRIPT: &str = "arguments[0].scrollIntoView(true);";

/// One navigated tab: waits, reads and scrolls with a fixed wait budget.
pub struct PageSession {
    client: Client,
    pacing: Pacing,
    timeout: Duration,
}

impl PageSession {
    pub fn new(client: Client, pacing: Pacing, timeout: Duration) -> Self {
        Self {
            client,
            pacing,
            timeout,
        }
    }

    /// Navigate to `url` and mask the most obvious automation signal.
    pub async fn goto(&self, url: &str) -> Result<()> {
        self.pacing.pause().await;
        self.client
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        self.client
            .execute(HIDE_AUTOMATION_SCRIPT, vec![])
            .await
            .context("failed to apply page scripts")?;
        tracing::debug!(%url, "browser.page.loaded");
        Ok(())
    }

    /// Wait up to the session timeout for an element matching `selector`.
    pub async fn wait_for(&self, selector: &str) -> Result<PageElement> {
        let element = self
            .client
            .wait()
            .at_most(self.timeout)
            .for_element(Locator::Css(selector))
            .await
            .with_context(|| format!("timed out waiting for {selector}"))?;
        Ok(PageElement::new(element, self.timeout))
    }

    /// Click `selector` if it shows up in time. Returns whether it was clicked.
    pub async fn click_if_present(&self, selector: &str) -> Result<bool> {
        match self.wait_for(selector).await {
            Ok(el) => {
                el.element.click().await.context("click failed")?;
                self.pacing.pause().await;
                Ok(true)
            }
            Err(err) => {
                tracing::debug!(%selector, error = %err, "browser.page.click_skipped");
                Ok(false)
            }
        }
    }

    /// Scroll `element` to the top of the viewport so the feed lazily renders more posts.
    pub async fn scroll_into_view(&self, element: &PageElement) -> Result<()> {
        let arg = serde_json::to_value(&element.element)?;
        self.client
            .execute(SCROLL_INTO_VIEW_SCRIPT, vec![arg])
            .await
            .context("scrollIntoView failed")?;
        self.pacing.pause().await;
        Ok(())
    }
}

#[derive(Clone)]
/// Wrapper for DOM elements that provides typed helpers consistent with [`PageSession`].
pub struct PageElement {
    pub element: Element,
    timeout: Duration,
}

impl PageElement {
    pub fn new(element: Element, timeout: Duration) -> Self {
        Self { element, timeout }
    }

    /// Poll for a descendant matching `selector` until the wait budget runs out.
    pub async fn wait_for_child(&self, selector: &str) -> Result<PageElement> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.element.find(Locator::Css(selector)).await {
                Ok(found) => return Ok(PageElement::new(found, self.timeout)),
                Err(err) if Instant::now() >= deadline => {
                    return Err(anyhow!("timed out waiting for child {selector}: {err}"));
                }
                Err(_) => sleep(CHILD_POLL_INTERVAL).await,
            }
        }
    }

    /// DOM `textContent`, including text hidden behind "see more" folds.
    pub async fn text_content(&self) -> Result<String> {
        let text = self
            .element
            .prop("textContent")
            .await
            .map_err(anyhow::Error::from)?;
        Ok(text.unwrap_or_default())
    }

    /// Read an attribute value.
    pub async fn attribute(&self, attribute: &str) -> Result<Option<String>> {
        self.element
            .attr(attribute)
            .await
            .map_err(anyhow::Error::from)
    }
}
