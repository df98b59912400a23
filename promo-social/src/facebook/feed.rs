use std::collections::VecDeque;

use anyhow::{Context, Result};
use async_trait::async_trait;
use promo_common::retry::{RetryPolicy, retry_fixed};
use promo_drivers::browser::{PageElement, PageSession};

use crate::source::FragmentSource;

const DISMISS_SELECTOR: &str = r#"[aria-label="閉じる"]"#;
const POST_SELECTOR_TEMPLATE: &str = r#"[aria-posinset="{i}"]"#;
const MESSAGE_SELECTOR: &str = r#"[data-ad-preview="message"]"#;

/// CSS selectors for one page's feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSelectors {
    pub dismiss: String,
    pub post_template: String,
    pub timestamp_link: String,
    pub message: String,
}

impl FeedSelectors {
    /// Selectors for a page whose permalinks start with `post_link_prefix`.
    pub fn for_page(post_link_prefix: &str) -> Self {
        let prefix = post_link_prefix.replace('\\', "\\\\").replace('"', "\\\"");
        Self {
            dismiss: DISMISS_SELECTOR.to_string(),
            post_template: POST_SELECTOR_TEMPLATE.to_string(),
            timestamp_link: format!(
                r#":not({MESSAGE_SELECTOR}) a[aria-label][href^="{prefix}"]"#
            ),
            message: MESSAGE_SELECTOR.to_string(),
        }
    }

    pub fn post(&self, index: usize) -> String {
        self.post_template.replace("{i}", &index.to_string())
    }
}

/// Yields `timestamp, message` pairs for posts `1..=max_posts`.
pub struct FacebookFeed {
    page: PageSession,
    selectors: FeedSelectors,
    max_posts: usize,
    next_index: usize,
    pending: VecDeque<String>,
    retry: RetryPolicy,
    prepared: bool,
}

impl FacebookFeed {
    pub fn new(page: PageSession, selectors: FeedSelectors, max_posts: usize, retry: RetryPolicy) -> Self {
        Self {
            page,
            selectors,
            max_posts,
            next_index: 1,
            pending: VecDeque::new(),
            retry,
            prepared: false,
        }
    }

    /// Close the login prompt shown to anonymous visitors, if any.
    async fn prepare(&mut self) -> Result<()> {
        let dismissed = self.page.click_if_present(&self.selectors.dismiss).await?;
        tracing::debug!(dismissed, "facebook.dialog");
        self.prepared = true;
        Ok(())
    }

    async fn find_post(&self, index: usize) -> Result<PageElement> {
        let page = &self.page;
        let selector = self.selectors.post(index);
        let selector = selector.as_str();
        retry_fixed("facebook.post", self.retry, |_| async move {
            page.wait_for(selector).await
        })
        .await
    }

    async fn read_post(&mut self, index: usize) -> Result<()> {
        let post = self
            .find_post(index)
            .await
            .with_context(|| format!("post {index} did not render"))?;

        let link_selector = self.selectors.timestamp_link.as_str();
        let post_ref = &post;
        let link = retry_fixed("facebook.timestamp", self.retry, |_| async move {
            post_ref.wait_for_child(link_selector).await
        })
        .await
        .with_context(|| format!("post {index} has no timestamp link"))?;
        let timestamp = link.text_content().await?;
        let href = link.attribute("href").await.ok().flatten().unwrap_or_default();
        tracing::debug!(index, %timestamp, %href, "facebook.post.timestamp");
        self.pending.push_back(timestamp);

        // Photo-only posts have no message block.
        match post.wait_for_child(&self.selectors.message).await {
            Ok(message) => self.pending.push_back(message.text_content().await?),
            Err(err) => tracing::debug!(index, error = %err, "facebook.post.no_message"),
        }

        self.page.scroll_into_view(&post).await?;
        Ok(())
    }
}

#[async_trait]
impl FragmentSource for FacebookFeed {
    async fn next_fragment(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Ok(Some(fragment));
            }
            if self.next_index > self.max_posts {
                return Ok(None);
            }
            if !self.prepared {
                self.prepare().await?;
            }
            let index = self.next_index;
            self.next_index += 1;
            self.read_post(index).await?;
        }
    }

    fn name(&self) -> &str {
        "facebook"
    }
}
