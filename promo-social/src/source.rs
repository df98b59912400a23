//! Where fragments come from.
use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

/// A finite, lazily-read stream of text fragments in on-page order.
#[async_trait]
pub trait FragmentSource: Send {
    /// Next fragment, or `None` once the source is exhausted.
    async fn next_fragment(&mut self) -> Result<Option<String>>;

    /// Short label used in logs.
    fn name(&self) -> &str;
}

/// Replays fragments captured earlier, one per line.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    label: String,
    fragments: VecDeque<String>,
}

impl ReplaySource {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: "replay".to_string(),
            fragments: fragments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(text.lines())
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        let mut source = Self::from_text(&text);
        source.label = format!("replay:{}", path.display());
        Ok(source)
    }
}

#[async_trait]
impl FragmentSource for ReplaySource {
    async fn next_fragment(&mut self) -> Result<Option<String>> {
        Ok(self.fragments.pop_front())
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn yields_lines_in_order_then_ends() {
        let mut source = ReplaySource::from_text("3時間前\nbody\n");
        assert_eq!(source.next_fragment().await.unwrap().as_deref(), Some("3時間前"));
        assert_eq!(source.next_fragment().await.unwrap().as_deref(), Some("body"));
        assert_eq!(source.next_fragment().await.unwrap(), None);
        assert_eq!(source.next_fragment().await.unwrap(), None);
    }

    #[tokio::test]
    async fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1日前").unwrap();
        writeln!(file, "12月25日 室料半額").unwrap();

        let mut source = ReplaySource::from_file(file.path()).await.unwrap();
        assert!(source.name().starts_with("replay:"));
        assert_eq!(source.next_fragment().await.unwrap().as_deref(), Some("1日前"));
        assert_eq!(
            source.next_fragment().await.unwrap().as_deref(),
            Some("12月25日 室料半額")
        );
        assert_eq!(source.next_fragment().await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReplaySource::from_file(dir.path().join("nope.txt")).await.unwrap_err();
        assert!(err.to_string().contains("nope.txt"));
    }
}
