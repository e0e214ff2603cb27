//! Bounded recency set of processed message IDs.

use gossip_proto::MessageId;
use parking_lot::RwLock;
use std::collections::{HashSet, VecDeque};

/// FIFO-bounded set of message IDs already handled by this node.
///
/// Once an ID is evicted it may be processed again; that costs a redundant
/// relay, never unbounded growth.
#[derive(Debug)]
pub struct DuplicateCache {
    capacity: usize,
    inner: RwLock<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    seen: HashSet<MessageId>,
    order: VecDeque<MessageId>,
}

impl DuplicateCache {
    /// Creates a cache holding at most `capacity` IDs (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(CacheInner::default()),
        }
    }

    /// Records `id`, returning `true` if it was not already present.
    ///
    /// Check and insert happen under one write lock, so two concurrent
    /// arrivals of the same ID cannot both observe it as new.
    pub fn check_and_insert(&self, id: MessageId) -> bool {
        let mut inner = self.inner.write();
        if !inner.seen.insert(id) {
            return false;
        }
        inner.order.push_back(id);
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        true
    }

    /// Returns true if `id` is currently cached.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.inner.read().seen.contains(id)
    }

    /// Returns the number of cached IDs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// Returns true if nothing has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(raw: u64) -> MessageId {
        MessageId::from_u64(raw)
    }

    #[test]
    fn first_insert_is_new_second_is_duplicate() {
        let cache = DuplicateCache::new(4);
        assert!(cache.check_and_insert(id(1)));
        assert!(!cache.check_and_insert(id(1)));
        assert!(cache.contains(&id(1)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let cache = DuplicateCache::new(2);
        cache.check_and_insert(id(1));
        cache.check_and_insert(id(2));
        cache.check_and_insert(id(3));

        assert!(!cache.contains(&id(1)));
        assert!(cache.contains(&id(2)));
        assert!(cache.contains(&id(3)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn evicted_id_is_new_again() {
        let cache = DuplicateCache::new(1);
        cache.check_and_insert(id(1));
        cache.check_and_insert(id(2));
        assert!(cache.check_and_insert(id(1)));
    }

    #[test]
    fn duplicate_does_not_refresh_position() {
        let cache = DuplicateCache::new(2);
        cache.check_and_insert(id(1));
        cache.check_and_insert(id(2));
        cache.check_and_insert(id(1));
        cache.check_and_insert(id(3));
        assert!(!cache.contains(&id(1)));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache = DuplicateCache::new(0);
        assert_eq!(cache.capacity(), 1);
        assert!(cache.check_and_insert(id(9)));
        assert!(!cache.check_and_insert(id(9)));
    }

    #[test]
    fn concurrent_inserts_admit_each_id_once() {
        let cache = Arc::new(DuplicateCache::new(1_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || (0..100).filter(|i| cache.check_and_insert(id(*i))).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn size_never_exceeds_capacity(
                capacity in 1usize..32,
                ids in prop::collection::vec(0u64..64, 0..200)
            ) {
                let cache = DuplicateCache::new(capacity);
                for raw in ids {
                    cache.check_and_insert(id(raw));
                    prop_assert!(cache.len() <= capacity);
                }
            }

            #[test]
            fn most_recent_id_is_always_cached(
                capacity in 1usize..16,
                ids in prop::collection::vec(any::<u64>(), 1..100)
            ) {
                let cache = DuplicateCache::new(capacity);
                for raw in &ids {
                    cache.check_and_insert(id(*raw));
                }
                prop_assert!(cache.contains(&id(*ids.last().unwrap())));
            }
        }
    }
}
