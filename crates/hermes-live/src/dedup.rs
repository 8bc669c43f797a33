//! # Delivery Dedup Cache
//!
//! During the catch-up episode the same message can arrive twice, once over
//! the hub and once over the push channel. The cache remembers which message
//! ids have been seen so the second copy is dropped.
//!
//! Bounding policy: a hard capacity with reset-to-empty on overflow. After a
//! reset an id seen before the reset counts as unseen again, so a duplicate
//! arriving right then is delivered twice. Known tradeoff.

use std::collections::HashSet;
use std::sync::Mutex;

use uuid::Uuid;

/// Default number of ids remembered before the cache resets.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1024;

/// Bounded set of already-delivered message ids.
///
/// `check_and_insert` is atomic: of two concurrent calls with the same id,
/// exactly one observes it as fresh.
#[derive(Debug)]
pub struct DedupCache {
    seen: Mutex<HashSet<Uuid>>,
    capacity: usize,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Self {
        DedupCache {
            seen: Mutex::new(HashSet::new()),
            capacity: capacity.max(1),
        }
    }

    /// Returns true if the id was already seen. A fresh id is recorded.
    /// The nil id is never a duplicate and never recorded.
    pub fn check_and_insert(&self, id: Uuid) -> bool {
        if id.is_nil() {
            return false;
        }

        let Ok(mut seen) = self.seen.lock() else {
            return false;
        };
        if seen.contains(&id) {
            return true;
        }
        if seen.len() >= self.capacity {
            seen.clear();
        }
        seen.insert(id);
        false
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets everything. Called when the catch-up episode ends.
    pub fn clear(&self) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.clear();
        }
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        DedupCache::new(DEFAULT_DEDUP_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_sighting_is_duplicate() {
        let cache = DedupCache::new(8);
        let id = Uuid::new_v4();
        assert!(!cache.check_and_insert(id));
        assert!(cache.check_and_insert(id));
        assert!(cache.check_and_insert(id));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_ids_are_fresh() {
        let cache = DedupCache::new(8);
        assert!(!cache.check_and_insert(Uuid::new_v4()));
        assert!(!cache.check_and_insert(Uuid::new_v4()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_nil_id_never_duplicate() {
        let cache = DedupCache::new(8);
        assert!(!cache.check_and_insert(Uuid::nil()));
        assert!(!cache.check_and_insert(Uuid::nil()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overflow_resets_to_empty() {
        let cache = DedupCache::new(4);
        let first = Uuid::new_v4();
        assert!(!cache.check_and_insert(first));
        for _ in 0..3 {
            cache.check_and_insert(Uuid::new_v4());
        }
        assert_eq!(cache.len(), 4);

        // the fifth id clears the cache and is recorded alone
        let overflow = Uuid::new_v4();
        assert!(!cache.check_and_insert(overflow));
        assert_eq!(cache.len(), 1);

        // a pre-reset id now counts as unseen again
        assert!(!cache.check_and_insert(first));
    }

    #[test]
    fn test_clear_forgets_everything() {
        let cache = DedupCache::new(8);
        let id = Uuid::new_v4();
        cache.check_and_insert(id);
        cache.clear();
        assert!(!cache.check_and_insert(id));
    }

    #[test]
    fn test_concurrent_check_and_insert_is_exclusive() {
        use std::sync::Arc;

        let cache = Arc::new(DedupCache::new(64));
        let id = Uuid::new_v4();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || cache.check_and_insert(id)));
        }

        let fresh = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|duplicate| !duplicate)
            .count();
        assert_eq!(fresh, 1);
    }
}
