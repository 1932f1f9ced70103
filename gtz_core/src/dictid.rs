//! 64-bit column identifier (C2).
//!
//! Grounded on `examples/original_source/dict_id.{h,c}`: a short ASCII tag is
//! folded into 8 bytes, and the top 2 bits of the first byte carry a type
//! tag (`00` primary field, `11` type-1 subfield, anything else type-2 /
//! printable). We keep the byte-oriented representation rather than genozip's
//! raw `uint64_t` so the tag-bit operations read the same as the C source,
//! and expose `to_bytes`/`from_bytes` for the little-endian on-disk form
//! spec §6 requires.

use std::fmt;

/// Top 2 bits of byte 0 == `00`: one of a fixed enum of primary fields
/// (CHROM, POS, ID, ...).
const MASK_CLEAR_FIELD: u8 = 0x3f;
/// Top 2 bits of byte 0 == `11`: a type-1 subfield (FORMAT/sample, sequence
/// description token).
const MASK_TYPE1: u8 = 0xc0;
/// Printable form: top 2 bits become `01`.
const MASK_PRINTABLE_CLEAR: u8 = 0x7f;
const MASK_PRINTABLE_SET: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictIdTag {
    /// `00` — primary field.
    Field,
    /// `11` — type-1 subfield (FORMAT subfield, sequence description token).
    Type1,
    /// anything else (conventionally `01`) — type-2 subfield (INFO attribute).
    Type2,
}

/// A 64-bit canonical column identifier. Equality is exact 8-byte equality,
/// i.e. 64-bit integer equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DictId {
    bytes: [u8; 8],
}

impl DictId {
    pub const NONE: DictId = DictId { bytes: [0; 8] };

    /// Fold up to 8 ASCII bytes of `tag` into a DictId.
    ///
    /// Tags shorter than 8 bytes are padded with the tag's second character
    /// repeated (first character if the tag is a single byte) — this odd
    /// padding rule is retained verbatim from genozip's `dict_id_make` for
    /// on-disk compatibility with the fold it performs.
    pub fn make(tag: &[u8]) -> Self {
        let mut bytes = [0u8; 8];
        let n = tag.len().min(8);
        bytes[..n].copy_from_slice(&tag[..n]);
        if n < 8 {
            let pad = if n >= 2 {
                tag[1]
            } else if n == 1 {
                tag[0]
            } else {
                0
            };
            for b in bytes.iter_mut().skip(n) {
                *b = pad;
            }
        }
        DictId { bytes }
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        DictId { bytes }
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.bytes
    }

    pub fn to_u64(self) -> u64 {
        u64::from_le_bytes(self.bytes)
    }

    pub fn from_u64(v: u64) -> Self {
        DictId {
            bytes: v.to_le_bytes(),
        }
    }

    /// Clear the top 2 bits of byte 0 — marks this as a primary field.
    pub fn tag_field(self) -> Self {
        let mut b = self.bytes;
        b[0] &= MASK_CLEAR_FIELD;
        DictId { bytes: b }
    }

    /// Set the top 2 bits of byte 0 to `11` — marks this as a type-1 subfield.
    pub fn tag_type1(self) -> Self {
        let mut b = self.bytes;
        b[0] |= MASK_TYPE1;
        DictId { bytes: b }
    }

    /// No-op: type-2 subfields are created with the top 2 bits already at
    /// `01` by convention and are never otherwise touched, matching
    /// `dict_id_type_2` in the original source.
    pub fn tag_type2(self) -> Self {
        self
    }

    /// Human-readable form: top 2 bits forced to `01` regardless of the
    /// original tag, so printing a field/type1/type2 dict_id never produces
    /// control characters in byte 0.
    pub fn printable(self) -> Self {
        let mut b = self.bytes;
        b[0] = (b[0] & MASK_PRINTABLE_CLEAR) | MASK_PRINTABLE_SET;
        DictId { bytes: b }
    }

    pub fn kind(self) -> DictIdTag {
        match self.bytes[0] >> 6 {
            0 => DictIdTag::Field,
            3 => DictIdTag::Type1,
            _ => DictIdTag::Type2,
        }
    }

    /// Render as a short ASCII string for diagnostics (`list`, error
    /// messages). Non-printable / trailing pad bytes are trimmed.
    pub fn printable_string(self) -> String {
        let p = self.printable();
        let mut s = String::with_capacity(8);
        for &b in &p.bytes {
            if b == 0 {
                break;
            }
            if b.is_ascii_graphic() || b == b' ' {
                s.push(b as char);
            } else {
                s.push('.');
            }
        }
        s
    }
}

impl fmt::Debug for DictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DictId({:#018x} \"{}\")", self.to_u64(), self.printable_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_pads_short_tags_with_second_char() {
        let d = DictId::make(b"AC");
        let bytes = d.to_bytes();
        assert_eq!(&bytes[0..2], b"AC");
        assert!(bytes[2..].iter().all(|&b| b == b'C'));
    }

    #[test]
    fn make_truncates_long_tags() {
        let d = DictId::make(b"ABCDEFGHIJ");
        assert_eq!(&d.to_bytes(), b"ABCDEFGH");
    }

    #[test]
    fn tag_bits_roundtrip() {
        let base = DictId::make(b"POS");
        let field = base.tag_field();
        assert_eq!(field.kind(), DictIdTag::Field);
        let t1 = base.tag_type1();
        assert_eq!(t1.kind(), DictIdTag::Type1);
    }

    #[test]
    fn equality_is_64bit_integer_equality() {
        let a = DictId::make(b"CHROM");
        let b = DictId::from_u64(a.to_u64());
        assert_eq!(a, b);
    }

    #[test]
    fn printable_never_emits_control_byte0() {
        let weird = DictId::from_bytes([0xff, b'A', b'C', 0, 0, 0, 0, 0]);
        let p = weird.printable();
        assert_eq!(p.to_bytes()[0] & 0xc0, 0x40);
    }
}
