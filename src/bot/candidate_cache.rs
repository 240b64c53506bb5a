//! Recently offered search results per chat.
//!
//! Only used to name the track in the "Downloading..." notice after a menu
//! selection. Callback tokens carry everything needed for the download, so a
//! missing or expired entry just means a plainer notice.

use crate::media::search::VideoCandidate;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// TTL cache of the last candidate list shown in each chat
#[derive(Clone)]
pub struct CandidateCache {
    /// chat_id -> candidates of the latest menu
    cache: Cache<i64, Arc<Vec<VideoCandidate>>>,
}

impl CandidateCache {
    /// Creates a cache whose entries live for `ttl`
    ///
    /// # Examples
    ///
    /// ```
    /// use oxide_tunes::bot::CandidateCache;
    /// use std::time::Duration;
    ///
    /// let cache = CandidateCache::new(Duration::from_secs(3600), 10_000);
    /// ```
    #[must_use]
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Remember the candidates offered to a chat, replacing older ones
    pub async fn store(&self, chat_id: i64, candidates: Vec<VideoCandidate>) {
        debug!(chat_id, count = candidates.len(), "Caching search candidates");
        self.cache.insert(chat_id, Arc::new(candidates)).await;
    }

    /// Title of `reference` if it was offered to `chat_id` recently
    pub async fn title_for(&self, chat_id: i64, reference: &str) -> Option<String> {
        let candidates = self.cache.get(&chat_id).await?;
        candidates
            .iter()
            .find(|c| c.reference == reference)
            .map(|c| c.title.clone())
    }

    /// Returns the current number of entries in the cache
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, reference: &str) -> VideoCandidate {
        VideoCandidate {
            title: title.to_string(),
            reference: reference.to_string(),
        }
    }

    #[tokio::test]
    async fn test_title_lookup() {
        let cache = CandidateCache::new(Duration::from_secs(60), 100);
        cache
            .store(42, vec![candidate("First", "aaa"), candidate("Second", "bbb")])
            .await;

        assert_eq!(cache.title_for(42, "bbb").await.as_deref(), Some("Second"));
        assert_eq!(cache.title_for(42, "zzz").await, None);
    }

    #[tokio::test]
    async fn test_chats_are_independent() {
        let cache = CandidateCache::new(Duration::from_secs(60), 100);
        cache.store(1, vec![candidate("Mine", "aaa")]).await;

        assert_eq!(cache.title_for(2, "aaa").await, None);
    }

    #[tokio::test]
    async fn test_newer_menu_replaces_older() {
        let cache = CandidateCache::new(Duration::from_secs(60), 100);
        cache.store(42, vec![candidate("Old", "aaa")]).await;
        cache.store(42, vec![candidate("New", "bbb")]).await;

        assert_eq!(cache.title_for(42, "aaa").await, None);
        assert_eq!(cache.title_for(42, "bbb").await.as_deref(), Some("New"));

        cache.cache.run_pending_tasks().await;
        assert_eq!(cache.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = CandidateCache::new(Duration::from_millis(50), 100);
        cache.store(42, vec![candidate("Song", "aaa")]).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.title_for(42, "aaa").await, None);
    }
}
