//! Crate-wide error type and result alias.

use std::io;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors surfaced by the feed engine.
///
/// `NotFound` is expected and load-bearing: walks treat it as "end of this
/// source" and never abort on it. `Io`/`Store` abort an in-progress walk
/// early, returning whatever was accumulated plus a cursor that has not
/// advanced past the failure point, so retry is safe.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Underlying I/O failure from the store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The embedded store rejected or failed an operation.
    #[error("store unavailable: {0}")]
    Store(String),
    /// The requested entry does not exist.
    #[error("entry not found")]
    NotFound,
    /// A stored record could not be decoded.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// Identifier construction would overflow a fixed field,
    /// e.g. appending a reply index past the maximum nesting depth.
    #[error("identifier overflow: {0}")]
    IdOverflow(String),
    /// Replying to an entry whose reply lock excludes the author.
    #[error("locked parent")]
    LockedParent,
    /// The target author blocks the acting user.
    #[error("author blocked")]
    Blocked,
    /// The acting user may not perform this mutation.
    #[error("permission denied")]
    PermissionDenied,
    /// A caller-supplied argument is out of domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl FeedError {
    /// True when a chain walk should treat this error as end-of-chain
    /// rather than aborting: the pointed-to entry is missing or
    /// undecodable, which is how holes left by out-of-band repair
    /// tolerate reader traffic.
    pub fn is_end_of_chain(&self) -> bool {
        matches!(self, FeedError::NotFound | FeedError::Corruption(_))
    }
}
