//! Stored entry records.
//!
//! One record type covers everything the store holds: ordinary posts,
//! replies, roots (list heads), relationship buckets, checkpoints and
//! synthetic notification entries. Records marshal to compact JSON with
//! short field names; absent fields are omitted entirely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, Result};

/// Sentinel content marking a logically deleted entry. Deleted entries stay
/// linked forever and are filtered out of every walk.
pub const DELETION_MARKER: &str = "[[c9d5a1f0-5c55-4e2f-9d5b-2f3a6a1f8b47]]";

/// Variant tag for synthetic entries injected into feeds, e.g. a
/// "liked your post" notice rendered inside an inbox timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cmd {
    /// Ordinary content entry.
    #[default]
    #[serde(rename = "")]
    None,
    /// Someone replied to the recipient's entry.
    #[serde(rename = "inbox-reply")]
    InboxReply,
    /// Someone mentioned the recipient.
    #[serde(rename = "inbox-mention")]
    InboxMention,
    /// Someone liked the recipient's entry.
    #[serde(rename = "inbox-like")]
    InboxLike,
    /// Relationship bucket: following states.
    #[serde(rename = "follow")]
    Follow,
    /// Relationship bucket: follower states.
    #[serde(rename = "followed")]
    Followed,
    /// Relationship bucket: block states.
    #[serde(rename = "block")]
    Block,
    /// Relationship bucket: like states.
    #[serde(rename = "like")]
    Like,
}

impl Cmd {
    fn is_none(&self) -> bool {
        *self == Cmd::None
    }
}

/// Who may reply to an entry. Violations are rejected before any mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplyLock {
    /// No restriction.
    #[default]
    Anyone,
    /// Only the author (and moderators).
    Nobody,
    /// Only users the author follows (and moderators).
    FollowedOnly,
}

impl ReplyLock {
    fn is_anyone(&self) -> bool {
        *self == ReplyLock::Anyone
    }
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// A stored entry.
///
/// Chain pointers: `next_id` links the home feed log, `next_media_id` the
/// parallel media-only sub-chain, `next_reply_id` the reply-thread chain
/// rooted at `parent`. `reply_chain` and `eoc` are meaningful on roots only:
/// the thread-chain head and the tail entry recorded at root creation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entry {
    /// Primary key: the text form of an [`Id`](crate::id::Id) for chained
    /// entries, or a deterministic path key for buckets and checkpoints.
    #[serde(rename = "id")]
    pub id: String,
    /// Author namespace; empty on synthetic entries.
    #[serde(rename = "author", default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    /// Body text; [`DELETION_MARKER`] once tombstoned.
    #[serde(rename = "content", default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    /// Attached media reference; empty when none.
    #[serde(rename = "M", default, skip_serializing_if = "String::is_empty")]
    pub media: String,
    /// Creation time, unix seconds.
    #[serde(rename = "create", default)]
    pub create_time: i64,
    /// Reply target; empty for top-level entries.
    #[serde(rename = "P", default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
    /// Forward pointer within the home feed log.
    #[serde(rename = "N", default, skip_serializing_if = "String::is_empty")]
    pub next_id: String,
    /// Forward pointer within the media-only sub-chain.
    #[serde(rename = "MN", default, skip_serializing_if = "String::is_empty")]
    pub next_media_id: String,
    /// Forward pointer within the reply-thread chain.
    #[serde(rename = "R", default, skip_serializing_if = "String::is_empty")]
    pub next_reply_id: String,
    /// Head of the reply-thread chain (roots and reply targets only).
    #[serde(rename = "Rc", default, skip_serializing_if = "String::is_empty")]
    pub reply_chain: String,
    /// Tail marker recorded when a root is materialized.
    #[serde(rename = "EO", default, skip_serializing_if = "String::is_empty")]
    pub eoc: String,
    /// Indirection to another entry; checkpoints and announce copies point
    /// at the real content through this.
    #[serde(rename = "ref", default, skip_serializing_if = "String::is_empty")]
    pub refer_id: String,
    /// Advisory reply count; drifts under racing decrements by design.
    #[serde(rename = "rs", default, skip_serializing_if = "is_zero")]
    pub replies: u32,
    /// Advisory like count.
    #[serde(rename = "like", default, skip_serializing_if = "is_zero")]
    pub likes: u32,
    /// Synthetic-entry variant tag.
    #[serde(rename = "K", default, skip_serializing_if = "Cmd::is_none")]
    pub cmd: Cmd,
    /// Reply restriction.
    #[serde(rename = "lm", default, skip_serializing_if = "ReplyLock::is_anyone")]
    pub reply_lock: ReplyLock,
    /// Marked not-safe-for-work.
    #[serde(rename = "nsfw", default, skip_serializing_if = "std::ops::Not::not")]
    pub nsfw: bool,
    /// Open key-value payload: variant data on synthetic entries,
    /// `target -> "state,timestamp"` pairs on relationship buckets,
    /// bucket-presence flags on relationship roots.
    #[serde(rename = "X", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, String>,
    /// Append-only audit log of moderation actions.
    #[serde(rename = "his", default, skip_serializing_if = "String::is_empty")]
    pub history: String,
    /// Insert-time request to pin this entry on its author root.
    #[serde(skip)]
    pub stick_on_top: bool,
}

impl Entry {
    /// True once the entry has been tombstoned.
    pub fn is_deleted(&self) -> bool {
        self.content == DELETION_MARKER
    }

    /// Replaces content with the deletion sentinel and drops media. The
    /// entry stays linked; every walk filters it from now on.
    pub fn tombstone(&mut self) {
        self.content = DELETION_MARKER.to_owned();
        self.media.clear();
    }

    /// Selects the forward pointer for the requested sub-chain.
    pub fn pick_next(&self, media_only: bool) -> &str {
        if media_only {
            &self.next_media_id
        } else {
            &self.next_id
        }
    }

    /// Serializes to the stored JSON form.
    pub fn marshal(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("entry serialization cannot fail")
    }

    /// Deserializes a stored record, rejecting records without an id.
    pub fn unmarshal(raw: &[u8]) -> Result<Entry> {
        let entry: Entry = serde_json::from_slice(raw)
            .map_err(|e| FeedError::Corruption(format!("undecodable entry: {e}")))?;
        if entry.id.is_empty() {
            return Err(FeedError::Corruption("entry without id".into()));
        }
        Ok(entry)
    }
}
