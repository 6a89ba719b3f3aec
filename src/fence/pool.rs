//! Fence object pooling.
//!
//! Generation contexts are allocated per admitted unit of work; at steady
//! throughput that is one allocation per fence. The pool recycles objects
//! whose only remaining holder is the pool itself, bounding allocation churn
//! without any destructor hooks: reclaim eligibility is purely the holder
//! count.

use super::object::FenceObject;
use crate::options::OptionStore;
use parking_lot::Mutex;
use std::sync::Arc;

/// Pool of recyclable [`FenceObject`]s.
///
/// The scan-and-reuse step is mutex-guarded: two concurrent `acquire` calls
/// must never hand out the same reclaimable object.
pub struct FencePool {
    entries: Mutex<Vec<Arc<FenceObject>>>,
    options: Arc<OptionStore>,
    max_idle: usize,
}

impl FencePool {
    /// Creates an empty pool whose objects reference `options`.
    pub(crate) fn new(options: Arc<OptionStore>, max_idle: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            options,
            max_idle,
        }
    }

    /// Returns a fence object with an empty payload.
    ///
    /// Reuses a pooled object if the pool holds its only reference,
    /// otherwise allocates. Idle objects beyond the configured cap are
    /// released during the scan.
    pub fn acquire(&self) -> Arc<FenceObject> {
        let mut entries = self.entries.lock();

        let mut idle = 0usize;
        let mut reusable: Option<usize> = None;
        for (i, entry) in entries.iter().enumerate() {
            if Arc::strong_count(entry) == 1 {
                idle += 1;
                if reusable.is_none() {
                    reusable = Some(i);
                }
            }
        }

        if idle > self.max_idle {
            let mut excess = idle - self.max_idle;
            entries.retain(|entry| {
                if excess > 0 && Arc::strong_count(entry) == 1 {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
            reusable = entries.iter().position(|e| Arc::strong_count(e) == 1);
        }

        if let Some(i) = reusable {
            let obj = Arc::clone(&entries[i]);
            obj.clear();
            return obj;
        }

        let obj = Arc::new(FenceObject::new(Arc::clone(&self.options)));
        entries.push(Arc::clone(&obj));
        obj
    }

    /// Number of objects currently tracked by the pool (in use or idle).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the pool tracks no objects.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FENCE_POOL_MAX_IDLE;

    fn pool() -> FencePool {
        FencePool::new(Arc::new(OptionStore::new()), DEFAULT_FENCE_POOL_MAX_IDLE)
    }

    #[test]
    fn test_acquire_allocates_when_empty() {
        let pool = pool();
        let obj = pool.acquire();
        assert_eq!(pool.len(), 1);
        drop(obj);
    }

    #[test]
    fn test_acquire_reuses_released_object() {
        let pool = pool();
        let obj = pool.acquire();
        obj.set("frame", 7u64);
        drop(obj);

        let recycled = pool.acquire();
        assert_eq!(pool.len(), 1);
        // Payload cleared on reuse.
        assert!(!recycled.contains("frame"));
    }

    #[test]
    fn test_acquire_does_not_reuse_held_object() {
        let pool = pool();
        let held = pool.acquire();
        let second = pool.acquire();
        assert_eq!(pool.len(), 2);
        drop(held);
        drop(second);
    }

    #[test]
    fn test_idle_objects_trimmed_beyond_cap() {
        let pool = FencePool::new(Arc::new(OptionStore::new()), 2);
        let held: Vec<_> = (0..6).map(|_| pool.acquire()).collect();
        assert_eq!(pool.len(), 6);
        drop(held);

        // All 6 idle; the next acquire trims down to the cap and reuses one.
        let obj = pool.acquire();
        assert!(pool.len() <= 3);
        drop(obj);
    }
}
