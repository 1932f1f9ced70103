//! On-disk section framing (C6, §4.7/§6). Grounded on
//! `ancf_core::format::{Ancf1Header, BlockEntry}` — a fixed-size header
//! struct with `to_bytes`/`from_bytes` pinned to an exact byte count,
//! generalized from the teacher's one-shape-fits-all block entry to the
//! handful of section kinds a container actually carries.
//!
//! Container layout (little-endian throughout):
//! ```text
//! [TXT_HEADER section]
//! [ (VB_HEADER, {B250|LOCAL}*) per vblock, in vblock_i order ]
//! [ DICT fragments, one per context ]
//! [ RANDOM_ACCESS section ]
//! [ ALIASES section ]
//! [ CONTAINER_HEADER (fixed-size) ]
//! [ SECTION_LIST (trailing) ]
//! ```

use crate::codec::CodecId;
use crate::context::LType;
use crate::dictid::DictId;

pub const MAGIC: u32 = u32::from_le_bytes(*b"GTZ1");
pub const SECTION_HEADER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    TxtHeader,
    VbHeader,
    B250,
    Local,
    Dict,
    RandomAccess,
    Aliases,
    ContainerHeader,
    SectionList,
}

impl SectionType {
    pub fn as_u8(self) -> u8 {
        match self {
            SectionType::TxtHeader => 1,
            SectionType::VbHeader => 2,
            SectionType::B250 => 3,
            SectionType::Local => 4,
            SectionType::Dict => 5,
            SectionType::RandomAccess => 6,
            SectionType::Aliases => 7,
            SectionType::ContainerHeader => 8,
            SectionType::SectionList => 9,
        }
    }

    pub fn from_u8(v: u8) -> anyhow::Result<Self> {
        Ok(match v {
            1 => SectionType::TxtHeader,
            2 => SectionType::VbHeader,
            3 => SectionType::B250,
            4 => SectionType::Local,
            5 => SectionType::Dict,
            6 => SectionType::RandomAccess,
            7 => SectionType::Aliases,
            8 => SectionType::ContainerHeader,
            9 => SectionType::SectionList,
            other => anyhow::bail!("unknown section_type {other}"),
        })
    }
}

/// Per-section flags. Only one bit is defined today; the byte exists so
/// future flags don't force a header format bump. Plain bit-twiddling
/// wrapper, matching the teacher's `Ancf1Header::has_flag` convention
/// rather than pulling in a bitflags crate for one bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionFlags(u8);

impl SectionFlags {
    pub const DICT_SORTED: SectionFlags = SectionFlags(1 << 0);

    pub const fn empty() -> Self {
        SectionFlags(0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits_truncate(bits: u8) -> Self {
        SectionFlags(bits)
    }

    pub fn contains(self, other: SectionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SectionFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for SectionFlags {
    type Output = SectionFlags;
    fn bitor(self, rhs: SectionFlags) -> SectionFlags {
        SectionFlags(self.0 | rhs.0)
    }
}

/// The fixed 32-byte prefix that precedes every section's payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub section_type: SectionType,
    pub codec: CodecId,
    pub ltype: Option<LType>,
    pub flags: SectionFlags,
    pub compressed_offset: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub vblock_i: u32,
    pub dict_id: DictId,
}

impl SectionHeader {
    pub fn to_bytes(&self) -> [u8; SECTION_HEADER_SIZE] {
        let mut buf = [0u8; SECTION_HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4] = self.section_type.as_u8();
        buf[5] = self.codec.as_u8();
        buf[6] = self.ltype.map(LType::as_u8).unwrap_or(0xff);
        buf[7] = self.flags.bits();
        buf[8..12].copy_from_slice(&self.compressed_offset.to_le_bytes());
        buf[12..16].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf[20..24].copy_from_slice(&self.vblock_i.to_le_bytes());
        buf[24..32].copy_from_slice(&self.dict_id.to_u64().to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; SECTION_HEADER_SIZE]) -> anyhow::Result<Self> {
        let magic = u32::from_le_bytes(buf[0..4].try_into()?);
        if magic != MAGIC {
            anyhow::bail!("section magic mismatch: expected {MAGIC:#x}, got {magic:#x}");
        }
        let ltype_byte = buf[6];
        Ok(SectionHeader {
            section_type: SectionType::from_u8(buf[4])?,
            codec: CodecId::from_u8(buf[5])?,
            ltype: if ltype_byte == 0xff { None } else { Some(LType::from_u8(ltype_byte)?) },
            flags: SectionFlags::from_bits_truncate(buf[7]),
            compressed_offset: u32::from_le_bytes(buf[8..12].try_into()?),
            compressed_size: u32::from_le_bytes(buf[12..16].try_into()?),
            uncompressed_size: u32::from_le_bytes(buf[16..20].try_into()?),
            vblock_i: u32::from_le_bytes(buf[20..24].try_into()?),
            dict_id: DictId::from_u64(u64::from_le_bytes(buf[24..32].try_into()?)),
        })
    }
}

/// One entry in the trailing section-offset table, letting a reader locate
/// any section with a single seek to the tail (§4.7 "A table of section
/// offsets is appended last").
#[derive(Debug, Clone, Copy)]
pub struct SectionListEntry {
    pub section_type: SectionType,
    pub vblock_i: u32,
    pub dict_id: DictId,
    pub offset: u64,
}

impl SectionListEntry {
    pub const SIZE: usize = 1 + 4 + 8 + 8; // type + vblock_i + dict_id + offset

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.section_type.as_u8();
        buf[1..5].copy_from_slice(&self.vblock_i.to_le_bytes());
        buf[5..13].copy_from_slice(&self.dict_id.to_u64().to_le_bytes());
        buf[13..21].copy_from_slice(&self.offset.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> anyhow::Result<Self> {
        Ok(SectionListEntry {
            section_type: SectionType::from_u8(buf[0])?,
            vblock_i: u32::from_le_bytes(buf[1..5].try_into()?),
            dict_id: DictId::from_u64(u64::from_le_bytes(buf[5..13].try_into()?)),
            offset: u64::from_le_bytes(buf[13..21].try_into()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_header_roundtrip() {
        let h = SectionHeader {
            section_type: SectionType::B250,
            codec: CodecId::Bzip2,
            ltype: None,
            flags: SectionFlags::DICT_SORTED,
            compressed_offset: SECTION_HEADER_SIZE as u32,
            compressed_size: 1234,
            uncompressed_size: 5678,
            vblock_i: 7,
            dict_id: DictId::make(b"POS"),
        };
        let bytes = h.to_bytes();
        let back = SectionHeader::from_bytes(&bytes).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = [0u8; SECTION_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&0u32.to_le_bytes());
        assert!(SectionHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn section_list_entry_roundtrip() {
        let e = SectionListEntry {
            section_type: SectionType::Dict,
            vblock_i: 0,
            dict_id: DictId::make(b"CHROM"),
            offset: 999_999,
        };
        let back = SectionListEntry::from_bytes(&e.to_bytes()).unwrap();
        assert_eq!(back.offset, e.offset);
        assert_eq!(back.dict_id, e.dict_id);
    }
}
