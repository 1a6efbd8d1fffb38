//! The feed engine: append-only feed logs over a flat key-value store.
//!
//! Every logical list (a timeline, an inbox, a tag feed, a reply thread) is
//! a push-front singly linked chain of [`Entry`] records hanging off one
//! root entry. Writers lock exactly one stripe at a time; readers take no
//! locks and degrade failed dereferences to end-of-chain.

mod checkpoint;
mod neighbors;
mod publish;
mod relation;
mod walk;

pub use checkpoint::checkpoint_key;
pub use neighbors::NeighborCache;
pub use publish::{announce_root, author_root, inbox_root, tag_root, Actor, Draft};
pub use relation::{bucket_of, RelationKind, RelationState};
pub use walk::Chain;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::entry::Entry;
use crate::error::{FeedError, Result};
use crate::id::{Id, IdKind};
use crate::lock::KeyLocks;
use crate::store::{KvStore, MemStore};
use crate::task::{Dispatcher, ThreadDispatcher};

/// Refer indirections are expected to be one hop (checkpoint or announce
/// copy to content); anything deeper than this is treated as corruption.
const MAX_REFER_DEPTH: usize = 8;

/// How an entry is spliced into its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Push-front onto the root's main chain (and media sub-chain when the
    /// entry carries media).
    Post,
    /// Push-front onto the root's reply-thread chain; the root must already
    /// exist.
    Reply,
    /// No chain at all: the entry is a relationship bucket and the root only
    /// records its presence bit.
    RelationSlot,
}

/// One insert operation against a root.
#[derive(Debug, Clone)]
pub struct InsertRequest {
    /// Key of the root to splice into.
    pub root_id: String,
    /// The entry to store. An empty `id` is minted under the root lock.
    pub entry: Entry,
    /// Splice mode.
    pub mode: InsertMode,
    /// Skips the stripe lock; only for callers that already hold the stripe
    /// this root hashes to.
    pub no_lock: bool,
}

impl InsertRequest {
    /// A plain post insert under `root_id`.
    pub fn post(root_id: impl Into<String>, entry: Entry) -> InsertRequest {
        InsertRequest {
            root_id: root_id.into(),
            entry,
            mode: InsertMode::Post,
            no_lock: false,
        }
    }

    /// A reply insert under `root_id`.
    pub fn reply(root_id: impl Into<String>, entry: Entry) -> InsertRequest {
        InsertRequest {
            root_id: root_id.into(),
            entry,
            mode: InsertMode::Reply,
            no_lock: false,
        }
    }
}

/// The feed/timeline storage engine.
///
/// Generic over the backing store; clock and background dispatcher are trait
/// objects so tests control time and side-effect ordering.
pub struct FeedEngine<S: KvStore> {
    store: Arc<S>,
    locks: KeyLocks,
    clock: Arc<dyn Clock>,
    tasks: Arc<dyn Dispatcher>,
    neighbors: NeighborCache,
}

impl FeedEngine<MemStore> {
    /// An engine over a fresh in-memory store with production defaults.
    pub fn in_memory() -> Arc<FeedEngine<MemStore>> {
        FeedEngine::new(MemStore::new())
    }
}

impl<S: KvStore> FeedEngine<S> {
    /// Builds an engine with the system clock, threaded dispatch and the
    /// default lock table.
    pub fn new(store: S) -> Arc<FeedEngine<S>> {
        FeedEngine::with_parts(
            store,
            Arc::new(SystemClock),
            Arc::new(ThreadDispatcher),
            KeyLocks::default(),
        )
    }

    /// Builds an engine from explicit parts.
    pub fn with_parts(
        store: S,
        clock: Arc<dyn Clock>,
        tasks: Arc<dyn Dispatcher>,
        locks: KeyLocks,
    ) -> Arc<FeedEngine<S>> {
        Arc::new(FeedEngine {
            store: Arc::new(store),
            locks,
            clock,
            tasks,
            neighbors: NeighborCache::default(),
        })
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current unix seconds from the engine clock.
    pub fn now(&self) -> i64 {
        self.clock.now_unix()
    }

    /// Loads an entry without resolving refer indirection.
    pub fn get_entry_raw(&self, id: &str) -> Result<Entry> {
        if id.is_empty() {
            return Err(FeedError::NotFound);
        }
        match self.store.get(id)? {
            None => Err(FeedError::NotFound),
            Some(raw) => Entry::unmarshal(&raw),
        }
    }

    /// Loads an entry, following `refer_id` indirection.
    ///
    /// The referring record's chain pointers override the referent's, so a
    /// refer stub sitting in a chain (an announce copy, a tag-feed copy)
    /// reads as the real content while keeping its own position in the
    /// chain.
    pub fn get_entry(&self, id: &str) -> Result<Entry> {
        let mut entry = self.get_entry_raw(id)?;
        let mut hops = 0;
        while !entry.refer_id.is_empty() {
            if hops >= MAX_REFER_DEPTH {
                return Err(FeedError::Corruption(format!(
                    "refer chain deeper than {MAX_REFER_DEPTH} at {id}"
                )));
            }
            let mut target = self.get_entry_raw(&entry.refer_id)?;
            target.next_id = entry.next_id;
            target.next_media_id = entry.next_media_id;
            entry = target;
            hops += 1;
        }
        Ok(entry)
    }

    /// Inserts an entry into a root's feed log.
    ///
    /// The root is created lazily on first post; a reply into a missing root
    /// is `NotFound` (a reply must target an existing thread). The entry is
    /// persisted before the root so that a crash between the two writes
    /// orphans the entry instead of corrupting the root. Returns the stored
    /// entry and the updated root.
    pub fn insert(&self, req: InsertRequest) -> Result<(Entry, Entry)> {
        let InsertRequest {
            root_id,
            mut entry,
            mode,
            no_lock,
        } = req;
        let now = self.clock.now_unix();
        if entry.create_time == 0 {
            entry.create_time = now;
        }

        let guard = if no_lock {
            None
        } else {
            Some(self.locks.lock(&root_id))
        };
        let mut deferred: Option<Box<dyn FnOnce() + Send>> = None;

        let mut root = match self.get_entry_raw(&root_id) {
            Ok(root) => root,
            Err(FeedError::NotFound) => {
                if mode == InsertMode::Reply {
                    return Err(FeedError::NotFound);
                }
                Entry {
                    id: root_id.clone(),
                    eoc: entry.id.clone(),
                    create_time: now,
                    ..Entry::default()
                }
            }
            Err(e) => return Err(e),
        };
        root.replies += 1;

        if entry.id.is_empty() {
            // The primary key always carries the entry's own creation time;
            // merge walks order sources by the timestamp embedded here.
            entry.id = Id::general(now).to_string();
            if root.eoc.is_empty() && root.replies == 1 {
                root.eoc = entry.id.clone();
            }
        }

        if Id::parse(&root_id).kind() == IdKind::Author {
            if entry.stick_on_top {
                root.extras
                    .insert("stick_on_top".to_owned(), entry.id.clone());
            }
            deferred = self.checkpoint_on_rollover(&root_id, &root, now);
        }

        match mode {
            InsertMode::Reply => {
                self.address_reply(&mut entry, &root);
                entry.next_reply_id = std::mem::replace(&mut root.reply_chain, entry.id.clone());
            }
            InsertMode::RelationSlot => {
                let slot = entry.id.rsplit('/').next().unwrap_or("").to_owned();
                root.extras.insert(slot, "1".to_owned());
            }
            InsertMode::Post => {
                entry.next_id = std::mem::replace(&mut root.next_id, entry.id.clone());
                if !entry.media.is_empty() {
                    entry.next_media_id =
                        std::mem::replace(&mut root.next_media_id, entry.id.clone());
                }
            }
        }

        self.store.set(&entry.id, &entry.marshal())?;
        self.store.set(&root.id, &root.marshal())?;

        if mode == InsertMode::Post && Id::parse(&entry.id).kind() == IdKind::General {
            self.neighbors.add(&entry.id);
        }

        drop(guard);
        if let Some(job) = deferred {
            self.tasks.dispatch(job);
        }
        Ok((entry, root))
    }

    /// The newest known entry key strictly older than `key`.
    ///
    /// Served from the in-memory neighbor cache, which the insert path feeds;
    /// purely advisory, a miss only costs the caller a chain walk. Used to
    /// land a long-range jump near a point in time without scanning.
    pub fn neighbor_before(&self, key: &str) -> Option<String> {
        self.neighbors.find_prev(key)
    }

    /// Mutates one entry in place under its stripe lock: tombstoning,
    /// moderation flag toggles, advisory counter bumps.
    pub fn update_entry<F>(&self, id: &str, f: F) -> Result<Entry>
    where
        F: FnOnce(&mut Entry) -> Result<()>,
    {
        let _guard = self.locks.lock(id);
        let mut entry = self.get_entry_raw(id)?;
        f(&mut entry)?;
        self.store.set(&entry.id, &entry.marshal())?;
        Ok(entry)
    }

    /// Records the reply's hierarchical thread address: the parent's address
    /// extended by this reply's slot (the root's reply counter, race-free
    /// under the root lock). Descendant checks then work by identifier
    /// prefix alone. Degrades silently past the maximum nesting depth.
    fn address_reply(&self, entry: &mut Entry, root: &Entry) {
        if entry.extras.contains_key("thread") {
            return;
        }
        let base = root
            .extras
            .get("thread")
            .map(|s| Id::parse(s))
            .filter(|id| id.is_valid())
            .unwrap_or_else(|| Id::parse(&root.id));
        if root.replies <= u32::from(u16::MAX) {
            if let Ok(addr) = base.child(root.replies as u16) {
                entry.extras.insert("thread".to_owned(), addr.to_string());
            }
        }
    }

    /// When the timeline head predates the current calendar month, schedule
    /// a checkpoint for the superseded head. Best-effort and
    /// duplicate-tolerant; runs outside the critical section.
    fn checkpoint_on_rollover(
        &self,
        root_id: &str,
        root: &Entry,
        now: i64,
    ) -> Option<Box<dyn FnOnce() + Send>> {
        let head = Id::parse(&root.next_id);
        if !head.is_valid() || head.is_root() {
            return None;
        }
        let head_ts = head.timestamp();
        if checkpoint::year_month(now)? == checkpoint::year_month(head_ts)? {
            return None;
        }
        let author = Id::parse(root_id).tag();
        let key = checkpoint::checkpoint_key_at(&author, head_ts)?;
        let refer = root.next_id.clone();
        let store = Arc::clone(&self.store);
        Some(Box::new(move || {
            let ck = Entry {
                id: key,
                refer_id: refer,
                create_time: now,
                ..Entry::default()
            };
            if let Err(e) = store.set(&ck.id, &ck.marshal()) {
                warn!(id = %ck.id, "checkpoint not persisted: {e}");
            }
        }))
    }

    pub(crate) fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        self.tasks.dispatch(job);
    }

    pub(crate) fn locks(&self) -> &KeyLocks {
        &self.locks
    }

    pub(crate) fn extras_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }
}
