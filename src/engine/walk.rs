//! Chain walks: single-source and k-way chronological merge.
//!
//! Walks take no locks. A missing or undecodable entry ends that chain; a
//! store failure ends the walk early with a cursor that has not advanced
//! past the failure point. Every walk carries a wall-clock budget — the only
//! cancellation mechanism — and returns a resumable cursor on expiry.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::entry::Entry;
use crate::error::Result;
use crate::id::{combine, Id, IdKind};
use crate::store::KvStore;

use super::FeedEngine;

/// Which forward pointer a single-source walk follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    /// The root's main chronological chain (`next_id`).
    Timeline,
    /// The media-only sub-chain (`next_media_id`).
    Media,
    /// The reply-thread chain (`reply_chain` head, then `next_reply_id`).
    Replies,
}

impl Chain {
    fn head<'a>(&self, root: &'a Entry) -> &'a str {
        match self {
            Chain::Timeline => &root.next_id,
            Chain::Media => &root.next_media_id,
            Chain::Replies => &root.reply_chain,
        }
    }

    fn next<'a>(&self, entry: &'a Entry) -> &'a str {
        match self {
            Chain::Timeline => &entry.next_id,
            Chain::Media => &entry.next_media_id,
            Chain::Replies => &entry.next_reply_id,
        }
    }
}

impl<S: KvStore> FeedEngine<S> {
    /// Walks one chain starting at entry key `cursor`.
    ///
    /// Collects up to `n` non-tombstoned entries, stopping early when
    /// `budget` expires. Returns the page and the cursor to resume from; an
    /// empty cursor means the chain is exhausted.
    pub fn walk(
        &self,
        chain: Chain,
        cursor: &str,
        n: usize,
        budget: Duration,
    ) -> (Vec<Entry>, String) {
        let start = Instant::now();
        let mut out = Vec::new();
        let mut cursor = cursor.to_owned();

        while out.len() < n && !cursor.is_empty() {
            if start.elapsed() > budget {
                debug!(%cursor, "chain walk out of budget");
                break;
            }
            match self.get_entry(&cursor) {
                Ok(entry) => {
                    let next = chain.next(&entry).to_owned();
                    if !entry.is_deleted() {
                        out.push(entry);
                    }
                    cursor = next;
                }
                Err(e) if e.is_end_of_chain() => {
                    // A hole in the chain reads as its end.
                    cursor.clear();
                }
                Err(e) => {
                    warn!(%cursor, "chain walk aborted: {e}");
                    break;
                }
            }
        }
        (out, cursor)
    }

    /// Walks a root's chain from its head. A missing root is an empty,
    /// exhausted page: the root is the only entry required to exist before
    /// readers can distinguish "empty" from "unknown".
    pub fn walk_root(
        &self,
        root_id: &str,
        chain: Chain,
        n: usize,
        budget: Duration,
    ) -> Result<(Vec<Entry>, String)> {
        let root = match self.get_entry_raw(root_id) {
            Ok(root) => root,
            Err(e) if e.is_end_of_chain() => return Ok((Vec::new(), String::new())),
            Err(e) => return Err(e),
        };
        Ok(self.walk(chain, chain.head(&root), n, budget))
    }

    /// The reply-thread walk under one parent entry.
    pub fn walk_replies(
        &self,
        parent_id: &str,
        n: usize,
        budget: Duration,
    ) -> Result<(Vec<Entry>, String)> {
        self.walk_root(parent_id, Chain::Replies, n, budget)
    }

    /// K-way chronological merge across an arbitrary set of feed-log
    /// cursors: the aggregated "everything I follow" page.
    ///
    /// Each cursor is either a root id (the source starts from its head) or
    /// the id of the next entry to read from that source. Output is ordered
    /// strictly by entry timestamp descending, independent of cursor input
    /// order. The returned cursor vector — exhausted sources marked by the
    /// invalid id — is the opaque resumption token for the next page.
    pub fn walk_multi(
        &self,
        cursors: &[Id],
        n: usize,
        media_only: bool,
        budget: Duration,
    ) -> (Vec<Entry>, Vec<Id>) {
        let mut cursors = cursors.to_vec();
        if cursors.is_empty() {
            return (Vec::new(), cursors);
        }

        // Pinned entries only make sense on a single author timeline.
        let show_pinned = cursors.len() == 1 && cursors[0].kind() == IdKind::Author;

        let start = Instant::now();
        let mut out: Vec<Entry> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut seen_parents: HashSet<String> = HashSet::new();

        while out.len() < n {
            if start.elapsed() > budget {
                if cursors.len() < 20 {
                    warn!(?cursors, "merge walk out of budget");
                } else {
                    warn!(sources = cursors.len(), "merge walk out of budget");
                }
                break;
            }

            // Overlapping follow sets can hand us the same root twice.
            let mut dedup = HashSet::with_capacity(cursors.len());
            cursors.retain(|c| dedup.insert(*c));

            // Most recent last. Roots sort as most recent (they still need
            // their head resolved); exhausted/invalid cursors carry
            // timestamp zero and sink to the front.
            cursors.sort_by(|a, b| {
                if a.timestamp() == b.timestamp() {
                    a.tag_bytes().cmp(b.tag_bytes())
                } else if a.is_root() {
                    std::cmp::Ordering::Greater
                } else if b.is_root() {
                    std::cmp::Ordering::Less
                } else {
                    a.timestamp().cmp(&b.timestamp())
                }
            });

            let last = cursors.len() - 1;
            let latest = cursors[last];
            if !latest.is_valid() {
                break;
            }

            match self.get_entry(&latest.to_string()) {
                Ok(entry) => {
                    if show_pinned && latest.is_root() {
                        if let Some(top_id) = entry.extras.get("stick_on_top") {
                            self.emit_pinned(top_id, &mut out, &mut seen);
                        }
                    }

                    let mut ok = !seen.contains(&entry.id)
                        && !entry.is_deleted()
                        && !latest.is_root();
                    // A top-level entry already surfaced as some emitted
                    // reply's parent would only repeat the thread.
                    if entry.parent.is_empty() && seen_parents.contains(&entry.id) {
                        ok = false;
                    }

                    let next = Id::parse(entry.pick_next(media_only));
                    if ok {
                        seen.insert(entry.id.clone());
                        if !entry.parent.is_empty() {
                            seen_parents.insert(entry.parent.clone());
                        }
                        out.push(entry);
                    }
                    cursors[last] = next;
                }
                Err(e) => {
                    if e.is_end_of_chain() {
                        debug!(cursor = %latest, "merge source exhausted");
                    } else {
                        warn!(cursor = %latest, "merge source failed: {e}");
                    }
                    cursors[last] = Id::default();
                }
            }
        }

        (out, cursors)
    }

    /// [`walk_multi`](Self::walk_multi) behind an opaque string token.
    ///
    /// The token packs the cursor vector via
    /// [`combine_ids`](crate::id::combine::combine_ids); callers round-trip
    /// it unmodified between pages. Any trailing payload (relationship-driven
    /// feeds append their bucket cursor there) is carried through untouched
    /// for as long as the walk survives. An undecodable token reads as an
    /// exhausted walk.
    pub fn walk_multi_token(
        &self,
        token: &str,
        n: usize,
        media_only: bool,
        budget: Duration,
    ) -> (Vec<Entry>, String) {
        let (cursors, payload) = combine::split_ids(token);
        if cursors.is_empty() {
            return (Vec::new(), String::new());
        }
        let (out, next) = self.walk_multi(&cursors, n, media_only, budget);
        if next.iter().all(|c| !c.is_valid()) {
            return (out, String::new());
        }
        (out, combine::combine_ids(&payload, &next))
    }

    fn emit_pinned(&self, top_id: &str, out: &mut Vec<Entry>, seen: &mut HashSet<String>) {
        if seen.contains(top_id) {
            return;
        }
        match self.get_entry(top_id) {
            Ok(mut top) if !top.is_deleted() => {
                top.stick_on_top = true;
                seen.insert(top.id.clone());
                out.push(top);
            }
            Ok(_) => {}
            Err(e) => debug!(id = top_id, "pinned entry unavailable: {e}"),
        }
    }
}
