//! Monthly checkpoint index for O(1) long-range pagination jumps.
//!
//! A checkpoint is a synthetic entry keyed deterministically by
//! `(author, year-month)` whose `refer_id` is the timeline head that existed
//! when the author's first post of a newer month arrived. Jumping to month M
//! is a single point read followed by an ordinary walk. Checkpoints are
//! created lazily and may be missing for any month; callers fall back to an
//! earlier month or a full walk.

use time::OffsetDateTime;

use crate::entry::Entry;
use crate::error::{FeedError, Result};
use crate::id::Id;
use crate::store::KvStore;

use super::FeedEngine;

/// `(year, month)` of a unix timestamp; `None` outside the representable
/// range.
pub(super) fn year_month(ts: i64) -> Option<(i32, u8)> {
    let dt = OffsetDateTime::from_unix_timestamp(ts).ok()?;
    Some((dt.year(), u8::from(dt.month())))
}

/// The deterministic store key of one author-month checkpoint.
pub fn checkpoint_key(author: &str, year: i32, month: u8) -> String {
    format!("u/{author}/checkpoint/{year:04}-{month:02}")
}

/// [`checkpoint_key`] for the month containing `ts`.
pub(super) fn checkpoint_key_at(author: &str, ts: i64) -> Option<String> {
    let (year, month) = year_month(ts)?;
    Some(checkpoint_key(author, year, month))
}

impl<S: KvStore> FeedEngine<S> {
    /// Looks up the checkpoint for `(author, year, month)`. `Ok(None)` when
    /// that month never got one.
    pub fn find_checkpoint(&self, author: &str, year: i32, month: u8) -> Result<Option<Entry>> {
        match self.get_entry_raw(&checkpoint_key(author, year, month)) {
            Ok(ck) => Ok(Some(ck)),
            Err(FeedError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replaces a timeline cursor with the checkpoint's referent, from which
    /// an ordinary walk proceeds. `None` when the month has no checkpoint —
    /// the caller falls back to the nearest earlier one or a full walk.
    pub fn resume_from_checkpoint(
        &self,
        author: &str,
        year: i32,
        month: u8,
    ) -> Result<Option<Id>> {
        Ok(self
            .find_checkpoint(author, year, month)?
            .map(|ck| Id::parse(&ck.refer_id))
            .filter(|id| id.is_valid()))
    }
}
