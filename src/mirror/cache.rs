use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Signature dedup with TTL aging. Entries are pruned by the engine's
/// periodic cleanup task.
#[derive(Clone)]
pub struct DedupCache {
    cache: Arc<DashMap<String, Instant>>,
    ttl: Duration,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self { cache: Arc::new(DashMap::new()), ttl }
    }

    /// Returns true if the signature is new and was recorded; false if it
    /// was already seen within the TTL.
    pub fn check_and_insert(&self, signature: &str) -> bool {
        match self.cache.entry(signature.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if entry.get().elapsed() >= self.ttl {
                    // Aged out; treat as new.
                    entry.insert(Instant::now());
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                true
            }
        }
    }

    pub fn cleanup(&self) {
        self.cache.retain(|_, seen_at| seen_at.elapsed() < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_within_ttl() {
        let cache = DedupCache::new(Duration::from_secs(300));

        assert!(cache.check_and_insert("sig1"));
        assert!(!cache.check_and_insert("sig1"));
        assert!(cache.check_and_insert("sig2"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_entries_age_out() {
        let cache = DedupCache::new(Duration::from_millis(10));

        assert!(cache.check_and_insert("sig1"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.check_and_insert("sig1"));

        std::thread::sleep(Duration::from_millis(20));
        cache.cleanup();
        assert!(cache.is_empty());
    }
}
