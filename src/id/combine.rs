//! Opaque multi-cursor pagination tokens.
//!
//! A merge walk resumes from one identifier per source, plus an optional
//! free-form payload (relationship feeds append their bucket cursor there).
//! The token packs all of that into a single URL-safe string: marshaled ids
//! back to back, a zero terminator, the payload, snappy-compressed and
//! base64-encoded. Callers must treat the token as opaque and round-trip it
//! unmodified.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::debug;

use crate::id::{Id, IdKind, MAX_REPLY_DEPTH};

/// Packs cursors and payload into an opaque token. Empty input yields the
/// empty token.
pub fn combine_ids(payload: &[u8], ids: &[Id]) -> String {
    let mut buf = Vec::with_capacity(ids.len() * 9 + payload.len() + 1);
    for id in ids {
        buf.extend_from_slice(&id.marshal());
    }
    if !payload.is_empty() {
        buf.push(0);
        buf.extend_from_slice(payload);
    }
    if buf.is_empty() {
        return String::new();
    }
    let packed = snap::raw::Encoder::new()
        .compress_vec(&buf)
        .expect("snappy compression of an in-memory buffer cannot fail");
    URL_SAFE_NO_PAD.encode(packed)
}

/// Reverses [`combine_ids`]. Undecodable tokens yield no cursors and no
/// payload; a truncated id stream is cut at the last whole identifier.
pub fn split_ids(token: &str) -> (Vec<Id>, Vec<u8>) {
    if token.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let Ok(packed) = URL_SAFE_NO_PAD.decode(token) else {
        debug!(token, "undecodable cursor token");
        return (Vec::new(), Vec::new());
    };
    let Ok(buf) = snap::raw::Decoder::new().decompress_vec(&packed) else {
        debug!(token, "corrupt cursor token");
        return (Vec::new(), Vec::new());
    };

    let mut ids = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        let header = buf[i];
        if header >> 4 == 0 {
            // Zero terminator: the rest is payload.
            return (ids, buf[i + 1..].to_vec());
        }
        let size = if header >> 4 == IdKind::General as u8 {
            let depth = usize::from(header & 0xf);
            if depth > MAX_REPLY_DEPTH {
                break;
            }
            9 + 2 * depth
        } else {
            1 + usize::from(header & 0xf)
        };
        if i + size > buf.len() {
            break;
        }
        let id = Id::unmarshal(&buf[i..i + size]);
        if !id.is_valid() {
            break;
        }
        ids.push(id);
        i += size;
    }
    (ids, Vec::new())
}
