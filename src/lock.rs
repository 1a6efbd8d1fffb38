//! Striped key locks.
//!
//! Mutations lock the affected root through a fixed-size table of mutexes
//! keyed by a stable hash of the key. The table is owned by the engine, not
//! a process-wide singleton, so every test gets an isolated one. The engine
//! holds at most one stripe guard at a time; operations spanning two roots
//! run two sequential critical sections instead of nesting, which is what
//! keeps the scheme deadlock-free without a lock-ordering protocol.

use parking_lot::{Mutex, MutexGuard};

/// Default number of stripes.
pub const DEFAULT_STRIPES: usize = 256;

fn fnv32(key: &str) -> u32 {
    let mut h: u32 = 2_166_136_261;
    for b in key.bytes() {
        h = h.wrapping_mul(16_777_619);
        h ^= u32::from(b);
    }
    h
}

/// A fixed table of key-striped mutexes.
pub struct KeyLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyLocks {
    /// Creates a table with `stripes` mutexes (at least one).
    pub fn new(stripes: usize) -> KeyLocks {
        let stripes = stripes.max(1);
        KeyLocks {
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
        }
    }

    /// The stripe index a key hashes to. Two keys on the same stripe
    /// contend on (and would self-deadlock on) the same mutex.
    pub fn stripe_of(&self, key: &str) -> usize {
        fnv32(key) as usize % self.stripes.len()
    }

    /// Locks the stripe owning `key`.
    pub fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(key)].lock()
    }
}

impl Default for KeyLocks {
    fn default() -> KeyLocks {
        KeyLocks::new(DEFAULT_STRIPES)
    }
}
