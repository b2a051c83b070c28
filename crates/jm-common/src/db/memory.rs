use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::store::{MatchStore, PostingStore, StoreError, UpsertOutcome};
use crate::{Match, Posting};

/// In-process store used by `--dry-run` and the test suite. Applies the
/// same merge rules as the Postgres upsert.
#[derive(Default)]
pub struct MemoryStore {
    postings: Mutex<HashMap<String, Posting>>,
    matches: Mutex<HashMap<(String, String), Match>>,
    failing_hashes: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    write_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_postings(postings: impl IntoIterator<Item = Posting>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.postings.lock().await;
            for posting in postings {
                guard.insert(posting.hash.clone(), posting);
            }
        }
        store
    }

    /// Make every posting/match write touching `hash` fail.
    pub async fn fail_writes_for(&self, hash: impl Into<String>) {
        self.failing_hashes.lock().await.insert(hash.into());
    }

    /// Simulate an unreachable database for every operation.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay each posting write, to exercise write timeouts.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn posting(&self, hash: &str) -> Option<Posting> {
        self.postings.lock().await.get(hash).cloned()
    }

    pub async fn all_postings(&self) -> Vec<Posting> {
        let mut postings: Vec<Posting> = self.postings.lock().await.values().cloned().collect();
        postings.sort_by(|a, b| a.hash.cmp(&b.hash));
        postings
    }

    pub async fn all_matches(&self) -> Vec<Match> {
        let mut matches: Vec<Match> = self.matches.lock().await.values().cloned().collect();
        matches.sort_by(|a, b| {
            (a.user_key.as_str(), a.posting_hash.as_str())
                .cmp(&(b.user_key.as_str(), b.posting_hash.as_str()))
        });
        matches
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }

    async fn check_writable(&self, hash: &str) -> Result<(), StoreError> {
        self.check_available()?;
        if self.failing_hashes.lock().await.contains(hash) {
            return Err(StoreError::Unavailable(format!("injected write failure for {hash}")));
        }
        Ok(())
    }
}

impl PostingStore for MemoryStore {
    async fn upsert_posting(&self, posting: &Posting) -> Result<UpsertOutcome, StoreError> {
        let delay_ms = self.write_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        self.check_writable(&posting.hash).await?;

        let mut guard = self.postings.lock().await;
        match guard.get_mut(&posting.hash) {
            Some(stored) => {
                stored.merge_from(posting);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                guard.insert(posting.hash.clone(), posting.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn save_classification(&self, posting: &Posting) -> Result<(), StoreError> {
        self.check_writable(&posting.hash).await?;

        let mut guard = self.postings.lock().await;
        if let Some(stored) = guard.get_mut(&posting.hash) {
            stored.active = posting.active;
            stored.filtered_reason = posting.filtered_reason;
            stored.employer_display = posting.employer_display.clone();
            stored.categories = posting.categories.clone();
            if posting.visa_friendly.is_definite() {
                stored.visa_friendly = posting.visa_friendly;
            }
        }
        Ok(())
    }

    async fn load_active_pool(&self) -> Result<Vec<Posting>, StoreError> {
        self.check_available()?;

        let mut pool: Vec<Posting> = self
            .postings
            .lock()
            .await
            .values()
            .filter(|p| p.active)
            .cloned()
            .collect();
        pool.sort_by(|a, b| {
            b.recency_anchor()
                .cmp(&a.recency_anchor())
                .then_with(|| a.hash.cmp(&b.hash))
        });
        Ok(pool)
    }

    async fn deactivate_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check_available()?;

        let mut affected = 0;
        for posting in self.postings.lock().await.values_mut() {
            if posting.active && posting.last_seen_at < cutoff {
                posting.active = false;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn count_postings(&self) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self.postings.lock().await.len() as u64)
    }
}

impl MatchStore for MemoryStore {
    async fn upsert_match(&self, record: &Match) -> Result<(), StoreError> {
        self.check_writable(&record.posting_hash).await?;
        self.matches.lock().await.insert(
            (record.user_key.clone(), record.posting_hash.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn matches_for_user(&self, user_key: &str) -> Result<Vec<Match>, StoreError> {
        self.check_available()?;

        let mut matches: Vec<Match> = self
            .matches
            .lock()
            .await
            .values()
            .filter(|m| m.user_key == user_key)
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.posting_hash.cmp(&b.posting_hash))
        });
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{Category, VisaFriendly};
    use crate::test_support::posting;

    #[tokio::test]
    async fn second_write_updates_instead_of_inserting() {
        let store = MemoryStore::new();
        let first = posting("Graduate Analyst", "Acme", "London, GB");
        let mut second = first.clone();
        second.origin_source = "board-b".into();
        second.last_seen_at = first.last_seen_at + chrono::Duration::hours(6);

        assert_eq!(store.upsert_posting(&first).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert_posting(&second).await.unwrap(), UpsertOutcome::Updated);

        assert_eq!(store.count_postings().await.unwrap(), 1);
        let stored = store.posting(&first.hash).await.unwrap();
        assert_eq!(stored.last_seen_at, second.last_seen_at);
        assert_eq!(stored.created_at, first.created_at);
    }

    #[tokio::test]
    async fn classification_write_keeps_last_seen() {
        let original = posting("Analyst", "Acme", "London, GB");
        let store = MemoryStore::with_postings([original.clone()]).await;

        let mut classified = original.clone();
        classified.categories.insert(Category::DataAnalytics);
        classified.visa_friendly = VisaFriendly::No;
        classified.last_seen_at = original.last_seen_at + chrono::Duration::days(3);
        store.save_classification(&classified).await.unwrap();

        let stored = store.posting(&original.hash).await.unwrap();
        assert!(stored.categories.contains(&Category::DataAnalytics));
        assert_eq!(stored.visa_friendly, VisaFriendly::No);
        assert_eq!(stored.last_seen_at, original.last_seen_at);
    }

    #[tokio::test]
    async fn stale_postings_lose_active_without_reason() {
        let mut old = posting("Old Analyst", "Acme", "London, GB");
        old.last_seen_at = old.last_seen_at - chrono::Duration::days(40);
        let fresh = posting("Fresh Analyst", "Acme", "London, GB");
        let cutoff = fresh.last_seen_at - chrono::Duration::days(30);
        let store = MemoryStore::with_postings([old.clone(), fresh]).await;

        assert_eq!(store.deactivate_stale(cutoff).await.unwrap(), 1);
        let stored = store.posting(&old.hash).await.unwrap();
        assert!(!stored.active);
        assert_eq!(stored.filtered_reason, None);
        assert_eq!(store.load_active_pool().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_reads() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.load_active_pool().await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
