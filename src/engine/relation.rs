//! Sharded relationship sets: follow, follower, block, like.
//!
//! One root per `(kind, subject)` fans out into up to 256 bucket entries
//! keyed by a stable hash of the target, so membership is a point read and
//! no single record grows with the relationship's fan-out. The root's extras
//! carry a presence bit per non-empty bucket; enumeration walks present
//! buckets in index order behind a resumable `(bucket, bitmap)` cursor.

use std::time::{Duration, Instant};

use tracing::{debug, warn};
use xxhash_rust::xxh64::xxh64;

use crate::bitmap::Bitmap256;
use crate::entry::{Cmd, Entry};
use crate::error::{FeedError, Result};
use crate::id::{Id, IdKind};
use crate::store::KvStore;

use super::{FeedEngine, InsertMode, InsertRequest};

/// The relationship kinds backed by sharded bucket sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Subjects this user follows.
    Follow,
    /// Users following this subject (the reverse edge).
    Follower,
    /// Subjects this user blocks.
    Block,
    /// Entries this user likes.
    Like,
}

impl RelationKind {
    /// The identifier kind of this relation's root.
    pub fn root_kind(&self) -> IdKind {
        match self {
            RelationKind::Follow => IdKind::Following,
            RelationKind::Follower => IdKind::Follower,
            RelationKind::Block => IdKind::Blacklist,
            RelationKind::Like => IdKind::Like,
        }
    }

    /// The bucket variant tag.
    pub fn cmd(&self) -> Cmd {
        match self {
            RelationKind::Follow => Cmd::Follow,
            RelationKind::Follower => Cmd::Followed,
            RelationKind::Block => Cmd::Block,
            RelationKind::Like => Cmd::Like,
        }
    }

    fn segment(&self) -> &'static str {
        match self {
            RelationKind::Follow => "follow",
            RelationKind::Follower => "followed",
            RelationKind::Block => "block",
            RelationKind::Like => "like",
        }
    }

    /// The root entry key for `subject`.
    pub fn root_id(&self, subject: &str) -> String {
        Id::new(self.root_kind(), subject).to_string()
    }
}

/// The bucket a target shards into: a pure function of the target id, so
/// membership queries never scan.
pub fn bucket_of(target: &str) -> u8 {
    (xxh64(target.as_bytes(), 0) & 0xff) as u8
}

fn bucket_key(kind: RelationKind, subject: &str, bucket: u8) -> String {
    format!("u/{subject}/{}/{bucket}", kind.segment())
}

/// One membership record: active flag plus since-when, both recovered from
/// the single stored `"state,timestamp"` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationState {
    /// The target (a user id, or an entry id for likes).
    pub id: String,
    /// Whether the relationship currently holds.
    pub active: bool,
    /// Unix seconds of the last state change.
    pub since: i64,
}

fn parse_state(id: &str, value: &str) -> Option<RelationState> {
    let (flag, ts) = value.split_once(',')?;
    Some(RelationState {
        id: id.to_owned(),
        active: flag == "true",
        since: ts.parse().ok()?,
    })
}

impl<S: KvStore> FeedEngine<S> {
    /// Sets the `(subject, target)` state under `kind`. Returns whether the
    /// stored state actually changed, which is what drives advisory counters
    /// and notifications at call sites.
    pub fn set_state(
        &self,
        kind: RelationKind,
        subject: &str,
        target: &str,
        active: bool,
    ) -> Result<bool> {
        let root_id = kind.root_id(subject);
        let bkey = bucket_key(kind, subject, bucket_of(target));
        let _guard = self.locks().lock(&root_id);
        let now = self.now();
        let state = format!("{active},{now}");

        match self.get_entry_raw(&bkey) {
            Ok(mut bucket) => {
                let changed = bucket
                    .extras
                    .get(target)
                    .map_or(true, |v| !v.starts_with(if active { "true" } else { "false" }));
                bucket.extras.insert(target.to_owned(), state);
                self.store().set(&bkey, &bucket.marshal())?;
                Ok(changed)
            }
            Err(FeedError::NotFound) => {
                // First target in this bucket: create it through a slot
                // insert so the root's presence bit flips with it. The root
                // stripe is already held.
                let entry = Entry {
                    id: bkey,
                    cmd: kind.cmd(),
                    create_time: now,
                    extras: Self::extras_map(&[(target, state.as_str())]),
                    ..Entry::default()
                };
                self.insert(InsertRequest {
                    root_id,
                    entry,
                    mode: InsertMode::RelationSlot,
                    no_lock: true,
                })?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Point lookup of one `(subject, target)` state.
    pub fn state_of(
        &self,
        kind: RelationKind,
        subject: &str,
        target: &str,
    ) -> Result<Option<RelationState>> {
        let bkey = bucket_key(kind, subject, bucket_of(target));
        match self.get_entry_raw(&bkey) {
            Ok(bucket) => Ok(bucket
                .extras
                .get(target)
                .and_then(|v| parse_state(target, v))),
            Err(FeedError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// True when the relationship currently holds; errors and absence both
    /// read as false.
    pub fn is_active(&self, kind: RelationKind, subject: &str, target: &str) -> bool {
        matches!(
            self.state_of(kind, subject, target),
            Ok(Some(RelationState { active: true, .. }))
        )
    }

    /// Paginated, resumable enumeration of a relationship set.
    ///
    /// An empty `cursor` starts at bucket 0 with the root's full presence
    /// bitmap; otherwise the cursor is the `"<bucket>~<bitmap>"` pair a
    /// previous page returned. Buckets are walked in index order under the
    /// time budget. The returned page is ordered most recent first; the
    /// returned cursor is empty once the set is exhausted.
    pub fn enumerate(
        &self,
        kind: RelationKind,
        subject: &str,
        cursor: &str,
        n: usize,
        budget: Duration,
    ) -> Result<(Vec<RelationState>, String)> {
        let (mut idx, bitmap) = if cursor.is_empty() {
            match self.get_entry_raw(&kind.root_id(subject)) {
                Ok(root) => (0usize, presence_of(&root)),
                Err(FeedError::NotFound) => return Ok((Vec::new(), String::new())),
                Err(e) => return Err(e),
            }
        } else {
            match decode_cursor(cursor) {
                Some(parsed) => parsed,
                None => {
                    debug!(cursor, "undecodable relation cursor");
                    return Ok((Vec::new(), String::new()));
                }
            }
        };

        let start = Instant::now();
        let mut out = Vec::new();

        while out.len() < n && idx < 256 {
            if !bitmap.contains(idx as u8) {
                idx += 1;
                continue;
            }
            if start.elapsed() > budget {
                break;
            }
            match self.get_entry_raw(&bucket_key(kind, subject, idx as u8)) {
                Ok(bucket) => {
                    for (target, value) in &bucket.extras {
                        if let Some(state) = parse_state(target, value) {
                            out.push(state);
                        }
                    }
                }
                Err(e) if e.is_end_of_chain() => {
                    // Presence bit without a bucket: tolerate the hole.
                    debug!(subject, bucket = idx, "missing relation bucket");
                }
                Err(e) => {
                    warn!(subject, bucket = idx, "relation enumeration aborted: {e}");
                    break;
                }
            }
            idx += 1;
        }

        out.sort_by(|a, b| b.since.cmp(&a.since));
        let next = if idx > 255 {
            String::new()
        } else {
            encode_cursor(idx, &bitmap)
        };
        Ok((out, next))
    }
}

fn presence_of(root: &Entry) -> Bitmap256 {
    root.extras
        .iter()
        .filter(|(_, v)| v.as_str() == "1")
        .filter_map(|(k, _)| k.parse::<u8>().ok())
        .collect()
}

fn encode_cursor(idx: usize, bitmap: &Bitmap256) -> String {
    format!("{idx}~{}", bitmap.encode())
}

fn decode_cursor(cursor: &str) -> Option<(usize, Bitmap256)> {
    let (idx, bitmap) = cursor.split_once('~')?;
    let idx: usize = idx.parse().ok()?;
    if idx > 255 {
        return None;
    }
    Some((idx, Bitmap256::decode(bitmap)?))
}
