//! Embedded key-value store abstraction.
//!
//! The engine needs only synchronous point reads and writes against one
//! logical table; ordering, transactions and durability belong to the
//! backing store. [`MemStore`] is the in-memory default used by tests and
//! embedders that bring their own persistence elsewhere.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::Result;

/// Point-read/point-write view of the backing ordered store.
pub trait KvStore: Send + Sync + 'static {
    /// Fetches the value stored under `key`, `None` when absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Ordered in-memory store.
#[derive(Default)]
pub struct MemStore {
    map: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> MemStore {
        MemStore::default()
    }

    /// Removes a key outright. Not part of [`KvStore`]: the engine never
    /// hard-deletes, but tests use this to punch holes into chains.
    pub fn remove(&self, key: &str) -> bool {
        self.map.write().remove(key).is_some()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.map.write().insert(key.to_owned(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_remove() {
        let store = MemStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", b"v1").unwrap();
        store.set("k", b"v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"v2"[..]));
        assert_eq!(store.len(), 1);
        assert!(store.remove("k"));
        assert!(store.is_empty());
    }
}
