//! Binary identifier format.
//!
//! An [`Id`] is a compact, self-describing binary record that serves three
//! jobs at once: a chronologically sortable primary key for feed entries, a
//! namespace root key (one per timeline/inbox/relationship set), and, in the
//! threaded variant, a hierarchical thread-reply address.
//!
//! Wire form is fixed-budget: one header byte (kind nibble plus a
//! length-or-depth nibble), then either a compressed namespace (root ids) or
//! a big-endian timestamp, counter and random bytes (general ids), optionally
//! followed by up to [`MAX_REPLY_DEPTH`] two-byte reply-index slots. The text
//! form is base64 over a URL-safe custom alphabet, so identifiers are both
//! store keys and link fragments.

pub mod combine;
pub mod compress;

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use base64::alphabet::Alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};
use base64::Engine;

use crate::error::{FeedError, Result};

/// Maximum nesting depth of the reply-index array.
pub const MAX_REPLY_DEPTH: usize = 4;

/// Alphabet of the text encoding. Digits sort first so that encoded
/// identifiers stay roughly chronological under lexicographic order.
const ID_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz~";

fn text_engine() -> &'static GeneralPurpose {
    static ENGINE: OnceLock<GeneralPurpose> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let alphabet = Alphabet::new(ID_ALPHABET).expect("fixed id alphabet is valid");
        GeneralPurpose::new(&alphabet, NO_PAD)
    })
}

fn counter() -> &'static AtomicU32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    COUNTER.get_or_init(|| AtomicU32::new(rand::random()))
}

/// Type tag of an identifier. Every kind except [`IdKind::General`] names a
/// root: the head entry of one logical list.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum IdKind {
    /// Sentinel for undecodable or exhausted identifiers.
    #[default]
    Invalid = 0x00,
    /// Site-wide announce/firehose root.
    Announce = 0x03,
    /// Per-user inbox root (notifications rendered as feed entries).
    Inbox = 0x04,
    /// Per-user timeline root.
    Author = 0x05,
    /// Per-tag feed root.
    Tag = 0x06,
    /// Ordinary content entry.
    General = 0x07,
    /// Per-user follower relationship root.
    Follower = 0x0A,
    /// Per-user following relationship root.
    Following = 0x0B,
    /// Per-user blacklist relationship root.
    Blacklist = 0x0C,
    /// Per-user like relationship root.
    Like = 0x0D,
}

impl IdKind {
    fn from_nibble(b: u8) -> IdKind {
        match b {
            0x03 => IdKind::Announce,
            0x04 => IdKind::Inbox,
            0x05 => IdKind::Author,
            0x06 => IdKind::Tag,
            0x07 => IdKind::General,
            0x0A => IdKind::Follower,
            0x0B => IdKind::Following,
            0x0C => IdKind::Blacklist,
            0x0D => IdKind::Like,
            _ => IdKind::Invalid,
        }
    }
}

/// A decoded identifier. `Id::default()` is the invalid sentinel used by
/// walkers to mark an exhausted cursor.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Id {
    kind: IdKind,
    taglen: u8,
    ts: u32,
    tag: [u8; 16],
    depth: u8,
    path: [u16; MAX_REPLY_DEPTH],
}

impl Id {
    /// Builds a root identifier for `kind` over `namespace`.
    ///
    /// The namespace is compressed into the fixed budget (overlong input is
    /// truncated, unsupported characters degrade to `'_'`). Passing
    /// [`IdKind::General`] or [`IdKind::Invalid`] yields the invalid id.
    pub fn new(kind: IdKind, namespace: &str) -> Id {
        if matches!(kind, IdKind::General | IdKind::Invalid) {
            return Id::default();
        }
        let packed = compress::compress(namespace);
        let mut tag = [0u8; 16];
        tag[..packed.len()].copy_from_slice(&packed);
        Id {
            kind,
            taglen: packed.len() as u8,
            ts: 0,
            tag,
            depth: 0,
            path: [0; MAX_REPLY_DEPTH],
        }
    }

    /// Mints a fresh general identifier stamped with `ts` (unix seconds).
    ///
    /// Uniqueness within the same second comes from a process-wide counter
    /// plus two random bytes.
    pub fn general(ts: i64) -> Id {
        let ctr = counter().fetch_add(1, Ordering::Relaxed) as u16;
        let r: u16 = rand::random();
        let mut tag = [0u8; 16];
        tag[0] = (ctr >> 8) as u8;
        tag[1] = ctr as u8;
        tag[2] = (r >> 8) as u8;
        tag[3] = r as u8;
        Id {
            kind: IdKind::General,
            taglen: 4,
            ts: ts.clamp(0, u32::MAX as i64) as u32,
            tag,
            depth: 0,
            path: [0; MAX_REPLY_DEPTH],
        }
    }

    /// Appends one reply-index slot, producing the address of the `slot`-th
    /// reply under this identifier.
    ///
    /// Fails with [`FeedError::IdOverflow`] past [`MAX_REPLY_DEPTH`] and with
    /// [`FeedError::InvalidArgument`] on non-general identifiers; it never
    /// wraps or truncates.
    pub fn child(&self, slot: u16) -> Result<Id> {
        if self.kind != IdKind::General {
            return Err(FeedError::InvalidArgument(
                "reply index requires a general identifier".into(),
            ));
        }
        if usize::from(self.depth) >= MAX_REPLY_DEPTH {
            return Err(FeedError::IdOverflow(format!(
                "reply depth exceeds {MAX_REPLY_DEPTH}"
            )));
        }
        let mut id = *self;
        id.path[usize::from(id.depth)] = slot;
        id.depth += 1;
        Ok(id)
    }

    /// The reply-index slots, outermost first.
    pub fn reply_path(&self) -> &[u16] {
        &self.path[..usize::from(self.depth)]
    }

    /// True when `self` addresses a reply nested (at any depth) under
    /// `ancestor`: same stem, strictly longer path, matching prefix.
    pub fn is_descendant_of(&self, ancestor: &Id) -> bool {
        self.kind == IdKind::General
            && ancestor.kind == IdKind::General
            && self.ts == ancestor.ts
            && self.tag[..4] == ancestor.tag[..4]
            && self.depth > ancestor.depth
            && self.path[..usize::from(ancestor.depth)] == ancestor.path[..usize::from(ancestor.depth)]
    }

    /// True unless this is the invalid sentinel.
    pub fn is_valid(&self) -> bool {
        self.kind != IdKind::Invalid
    }

    /// True for root identifiers (namespace keys, timestamp zero).
    pub fn is_root(&self) -> bool {
        self.ts == 0 && self.is_valid()
    }

    /// The type tag.
    pub fn kind(&self) -> IdKind {
        self.kind
    }

    /// Embedded coarse timestamp in unix seconds (zero on roots).
    pub fn timestamp(&self) -> i64 {
        i64::from(self.ts)
    }

    /// Decompressed namespace of a root identifier.
    pub fn tag(&self) -> String {
        compress::decompress(&self.tag[..usize::from(self.taglen)])
    }

    /// Raw tag bytes, used as the ordering tie-breaker between cursors.
    pub fn tag_bytes(&self) -> &[u8] {
        &self.tag[..usize::from(self.taglen)]
    }

    /// Encoded size in bytes; zero for the invalid sentinel.
    pub fn size(&self) -> usize {
        if !self.is_valid() {
            return 0;
        }
        if self.kind == IdKind::General {
            9 + 2 * usize::from(self.depth)
        } else {
            1 + usize::from(self.taglen)
        }
    }

    /// Encodes into the fixed wire form.
    pub fn marshal(&self) -> Vec<u8> {
        let size = self.size();
        let mut buf = Vec::with_capacity(size);
        if size == 0 {
            return buf;
        }
        if self.kind == IdKind::General {
            buf.push((self.kind as u8) << 4 | self.depth);
            buf.extend_from_slice(&self.ts.to_be_bytes());
            buf.extend_from_slice(&self.tag[..4]);
            for slot in self.reply_path() {
                buf.extend_from_slice(&slot.to_be_bytes());
            }
        } else {
            buf.push((self.kind as u8) << 4 | (self.taglen & 0xf));
            buf.extend_from_slice(&self.tag[..usize::from(self.taglen)]);
        }
        buf
    }

    /// Decodes the wire form; anything undecodable yields the invalid id.
    pub fn unmarshal(p: &[u8]) -> Id {
        let Some(&header) = p.first() else {
            return Id::default();
        };
        let kind = IdKind::from_nibble(header >> 4);
        if kind == IdKind::Invalid {
            return Id::default();
        }

        if kind == IdKind::General {
            let depth = header & 0xf;
            if usize::from(depth) > MAX_REPLY_DEPTH || p.len() != 9 + 2 * usize::from(depth) {
                return Id::default();
            }
            let ts = u32::from_be_bytes([p[1], p[2], p[3], p[4]]);
            let mut tag = [0u8; 16];
            tag[..4].copy_from_slice(&p[5..9]);
            let mut path = [0u16; MAX_REPLY_DEPTH];
            for (i, slot) in path.iter_mut().take(usize::from(depth)).enumerate() {
                *slot = u16::from_be_bytes([p[9 + 2 * i], p[10 + 2 * i]]);
            }
            return Id {
                kind,
                taglen: 4,
                ts,
                tag,
                depth,
                path,
            };
        }

        let taglen = header & 0xf;
        if p.len() != 1 + usize::from(taglen) {
            return Id::default();
        }
        let mut tag = [0u8; 16];
        tag[..usize::from(taglen)].copy_from_slice(&p[1..]);
        Id {
            kind,
            taglen,
            ts: 0,
            tag,
            depth: 0,
            path: [0; MAX_REPLY_DEPTH],
        }
    }

    /// Decodes the text form; anything undecodable yields the invalid id.
    pub fn parse(s: &str) -> Id {
        match text_engine().decode(s) {
            Ok(raw) => Id::unmarshal(&raw),
            Err(_) => Id::default(),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&text_engine().encode(self.marshal()))
    }
}
