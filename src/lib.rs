//! Tideline is an embedded feed/timeline storage engine over a flat
//! key-value store.
//!
//! Every logical list — a user timeline, an inbox, a tag feed, a reply
//! thread — is a push-front singly linked chain of JSON entry records
//! hanging off one root entry, keyed by compact chronologically sortable
//! binary identifiers. Aggregated home feeds are produced on read by a
//! k-way chronological merge over any set of chains; relationship sets
//! (follow, follower, block, like) shard into 256 hash buckets per user.
//!
//! ```
//! use tideline::engine::{Draft, FeedEngine};
//!
//! let engine = FeedEngine::in_memory();
//! let post = engine.post(Draft::new("alice", "hello")).unwrap();
//! assert_eq!(post.author, "alice");
//! ```

pub mod bitmap;
pub mod clock;
pub mod engine;
pub mod entry;
pub mod error;
pub mod id;
pub mod lock;
pub mod logging;
pub mod store;
pub mod task;

pub use engine::{Actor, Chain, Draft, FeedEngine, InsertMode, InsertRequest, RelationKind};
pub use entry::{Entry, DELETION_MARKER};
pub use error::{FeedError, Result};
pub use id::{Id, IdKind};
pub use store::{KvStore, MemStore};
