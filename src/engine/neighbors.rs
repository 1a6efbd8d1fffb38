//! In-memory neighbor cache over entry keys.
//!
//! General identifiers sort chronologically in their text form, so a sorted
//! set of recently seen keys answers "the newest entry older than X" without
//! touching the store. The engine's insert path feeds it and tombstoning
//! evicts; `FeedEngine::neighbor_before` is the lookup. Purely advisory: a
//! miss only costs the caller a chain walk, so eviction is unceremonious.

use parking_lot::RwLock;

/// Sorted, bounded cache of entry keys.
pub struct NeighborCache {
    keys: RwLock<Vec<String>>,
    cap: usize,
}

impl NeighborCache {
    /// A cache holding at most `cap` keys. The smallest (oldest) keys are
    /// evicted first.
    pub fn new(cap: usize) -> NeighborCache {
        NeighborCache {
            keys: RwLock::new(Vec::new()),
            cap: cap.max(1),
        }
    }

    /// Records a key. Duplicates are ignored.
    pub fn add(&self, key: &str) {
        let mut keys = self.keys.write();
        if let Err(pos) = keys.binary_search_by(|k| k.as_str().cmp(key)) {
            keys.insert(pos, key.to_owned());
            if keys.len() > self.cap {
                keys.remove(0);
            }
        }
    }

    /// Drops a key, e.g. after its entry is tombstoned.
    pub fn remove(&self, key: &str) {
        let mut keys = self.keys.write();
        if let Ok(pos) = keys.binary_search_by(|k| k.as_str().cmp(key)) {
            keys.remove(pos);
        }
    }

    /// The largest cached key strictly smaller than `key`: the
    /// chronological predecessor under the identifier text ordering.
    pub fn find_prev(&self, key: &str) -> Option<String> {
        let keys = self.keys.read();
        let pos = match keys.binary_search_by(|k| k.as_str().cmp(key)) {
            Ok(pos) | Err(pos) => pos,
        };
        pos.checked_sub(1).map(|p| keys[p].clone())
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl Default for NeighborCache {
    fn default() -> NeighborCache {
        NeighborCache::new(1024)
    }
}
