//! Content sources.
//!
//! A content source supplies raw items. It may return fewer items than
//! requested or fail transiently; callers treat a failure as "nothing new".

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use herald_core::types::{normalize_author, Category, RawItem};

use crate::error::SourceError;

/// Supplies raw mentions and authored posts.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Up to `count` recent mentions of the account, newest first.
    async fn fetch_mentions(&self, count: usize) -> Result<Vec<RawItem>, SourceError>;

    /// Up to `count` recent posts by `author`, newest first.
    async fn fetch_authored(&self, author: &str, count: usize)
        -> Result<Vec<RawItem>, SourceError>;
}

/// Newest-first selection shared by the in-tree sources.
fn select_recent(
    items: &[RawItem],
    category: Category,
    author: Option<&str>,
    count: usize,
) -> Vec<RawItem> {
    let wanted = author.map(normalize_author);
    let mut matching: Vec<RawItem> = items
        .iter()
        .filter(|item| item.category == category)
        .filter(|item| {
            wanted
                .as_deref()
                .map_or(true, |a| normalize_author(&item.author) == a)
        })
        .cloned()
        .collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    matching.truncate(count);
    matching
}

/// In-memory source, filled by the caller.
#[derive(Debug, Default)]
pub struct MemorySource {
    items: Mutex<Vec<RawItem>>,
    failure: Mutex<Option<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<RawItem>) -> Self {
        Self {
            items: Mutex::new(items),
            failure: Mutex::new(None),
        }
    }

    pub fn push(&self, item: RawItem) {
        if let Ok(mut items) = self.items.lock() {
            items.push(item);
        }
    }

    /// Make every subsequent fetch fail with `message`, or succeed again with
    /// `None`.
    pub fn set_failure(&self, message: Option<String>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = message;
        }
    }

    fn snapshot(&self) -> Result<Vec<RawItem>, SourceError> {
        let failure = self
            .failure
            .lock()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        if let Some(message) = failure.as_ref() {
            return Err(SourceError::Unavailable(message.clone()));
        }
        let items = self
            .items
            .lock()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        Ok(items.clone())
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn fetch_mentions(&self, count: usize) -> Result<Vec<RawItem>, SourceError> {
        let items = self.snapshot()?;
        Ok(select_recent(&items, Category::Mention, None, count))
    }

    async fn fetch_authored(
        &self,
        author: &str,
        count: usize,
    ) -> Result<Vec<RawItem>, SourceError> {
        let items = self.snapshot()?;
        Ok(select_recent(&items, Category::AuthoredPost, Some(author), count))
    }
}

/// Reads a JSON array of raw items from disk on every fetch.
#[derive(Debug, Clone)]
pub struct FeedFileSource {
    path: PathBuf,
}

impl FeedFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<RawItem>, SourceError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::Unavailable(format!(
                    "feed file {} not found",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let items: Vec<RawItem> = serde_json::from_str(&content)?;
        tracing::debug!(path = %self.path.display(), items = items.len(), "Loaded feed file");
        Ok(items)
    }
}

#[async_trait]
impl ContentSource for FeedFileSource {
    async fn fetch_mentions(&self, count: usize) -> Result<Vec<RawItem>, SourceError> {
        let items = self.load().await?;
        Ok(select_recent(&items, Category::Mention, None, count))
    }

    async fn fetch_authored(
        &self,
        author: &str,
        count: usize,
    ) -> Result<Vec<RawItem>, SourceError> {
        let items = self.load().await?;
        Ok(select_recent(&items, Category::AuthoredPost, Some(author), count))
    }
}
