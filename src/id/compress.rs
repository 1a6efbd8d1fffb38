//! Namespace string compression.
//!
//! Namespaces (user names, tag names) are packed into a fixed 15-byte budget
//! so they fit inside an identifier. ASCII-safe characters map 1:1, a broad
//! Unicode range packs as two bytes with a marker bit, everything else
//! degrades to `'_'`. The scheme is order-preserving enough that two
//! identifiers sharing a namespace visibly share its compressed bytes.

/// Maximum compressed namespace length in bytes.
pub const COMPRESSED_LEN: usize = 15;

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '~' | '!')
}

/// Compresses a namespace string into at most [`COMPRESSED_LEN`] bytes.
///
/// Characters in U+2000..=U+9FFF take two bytes and are never split across
/// the budget boundary; the output is truncated early instead.
pub fn compress(ns: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ns.len().min(COMPRESSED_LEN));
    for c in ns.chars() {
        if is_safe(c) {
            buf.push(c as u8);
        } else if ('\u{2000}'..='\u{9fff}').contains(&c) {
            if buf.len() > COMPRESSED_LEN - 2 {
                return buf;
            }
            let packed = (c as u16 - 0x2000) | 0x8000;
            buf.push((packed >> 8) as u8);
            buf.push(packed as u8);
        } else {
            buf.push(b'_');
        }
        if buf.len() == COMPRESSED_LEN {
            break;
        }
    }
    buf
}

/// Recovers the namespace string from its compressed form.
///
/// A truncated two-byte pair yields an empty string rather than garbage.
pub fn decompress(buf: &[u8]) -> String {
    let mut out = String::with_capacity(buf.len());
    let mut i = 0;
    while i < buf.len() {
        let c = buf[i];
        if c < 0x80 {
            out.push(c as char);
            i += 1;
            continue;
        }
        if i == buf.len() - 1 {
            return String::new();
        }
        let packed = ((c as u16) << 8 | buf[i + 1] as u16) & 0x7fff;
        match char::from_u32(packed as u32 + 0x2000) {
            Some(ch) => out.push(ch),
            None => return String::new(),
        }
        i += 2;
    }
    out
}

/// Rewrites a namespace into the exact string [`compress`] will preserve,
/// used at the write boundary to show callers what will actually be stored.
pub fn safe_namespace(ns: &str) -> String {
    let mut buf = String::new();
    let mut count = 0;
    for c in ns.chars() {
        if is_safe(c) {
            buf.push(c);
            count += 1;
        } else if ('\u{2000}'..='\u{9fff}').contains(&c) {
            if count > COMPRESSED_LEN - 2 {
                return buf;
            }
            buf.push(c);
            count += 2;
        } else {
            buf.push('_');
            count += 1;
        }
        if count == COMPRESSED_LEN {
            break;
        }
    }
    buf
}
