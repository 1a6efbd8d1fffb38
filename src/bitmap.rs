//! Fixed 256-slot presence bitmap.
//!
//! Relationship roots record which of their 256 hash buckets are non-empty.
//! The bitmap travels inside enumeration cursors, so it has a compact text
//! form: 32 packed bytes, base64-encoded.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

/// A subset of `0..=255` packed into 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bitmap256([u8; 32]);

impl Bitmap256 {
    /// The empty set.
    pub fn new() -> Bitmap256 {
        Bitmap256::default()
    }

    /// Marks `slot` present.
    pub fn set(&mut self, slot: u8) {
        self.0[usize::from(slot) / 8] |= 1 << (slot % 8);
    }

    /// Clears `slot`.
    pub fn clear(&mut self, slot: u8) {
        self.0[usize::from(slot) / 8] &= !(1 << (slot % 8));
    }

    /// Membership test.
    pub fn contains(&self, slot: u8) -> bool {
        self.0[usize::from(slot) / 8] >> (slot % 8) & 1 == 1
    }

    /// Number of present slots.
    pub fn len(&self) -> usize {
        self.0.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// True when no slot is present.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Iterates present slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0u16..256).filter_map(|s| self.contains(s as u8).then_some(s as u8))
    }

    /// Text form used inside enumeration cursors.
    pub fn encode(&self) -> String {
        STANDARD_NO_PAD.encode(self.0)
    }

    /// Parses the text form; `None` on anything that is not exactly a packed
    /// 32-byte set.
    pub fn decode(s: &str) -> Option<Bitmap256> {
        let raw = STANDARD_NO_PAD.decode(s).ok()?;
        let bytes: [u8; 32] = raw.try_into().ok()?;
        Some(Bitmap256(bytes))
    }
}

impl FromIterator<u8> for Bitmap256 {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Bitmap256 {
        let mut bm = Bitmap256::new();
        for slot in iter {
            bm.set(slot);
        }
        bm
    }
}
