//! Container header (C13, §4.12): the fixed-size trailer that anchors the
//! whole file. Grounded on `ancf_core::format::Ancf1Header` — a fixed byte
//! count, `to_bytes`/`from_bytes` pinned to that count, magic-checked on
//! read — generalized to the genomic container's field set (data type,
//! per-component vs. whole-concatenation MD5, creation time).
//!
//! Written last, at a fixed 56-byte size, so a reader can always find it by
//! seeking `HEADER_SIZE` bytes back from EOF... except the true trailer is
//! [`crate::section::SectionType::SectionList`], appended *after* this
//! header (§6 layout). Readers therefore seek to the section list's known
//! offset (itself found via a final 8-byte footer, teacher-style) rather
//! than assuming this header is the last bytes in the file.

pub const CONTAINER_MAGIC: u64 = u64::from_le_bytes(*b"GTZCNTR1");
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 56;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Vcf,
    Sam,
    Fastq,
    Fasta,
    Gff3,
    TwentyThreeAndMe,
}

impl DataType {
    pub fn as_u8(self) -> u8 {
        match self {
            DataType::Vcf => 0,
            DataType::Sam => 1,
            DataType::Fastq => 2,
            DataType::Fasta => 3,
            DataType::Gff3 => 4,
            DataType::TwentyThreeAndMe => 5,
        }
    }

    pub fn from_u8(v: u8) -> anyhow::Result<Self> {
        Ok(match v {
            0 => DataType::Vcf,
            1 => DataType::Sam,
            2 => DataType::Fastq,
            3 => DataType::Fasta,
            4 => DataType::Gff3,
            5 => DataType::TwentyThreeAndMe,
            other => anyhow::bail!("unknown data_type tag {other}"),
        })
    }
}

/// The fixed 56-byte global header (§4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub format_version: u16,
    pub data_type: DataType,
    pub encrypted: bool,
    /// Number of concatenated input components (one `TXT_HEADER` + run of
    /// vblocks each).
    pub component_count: u32,
    pub total_plaintext_size: u64,
    pub total_line_count: u64,
    /// MD5 of all components' plaintext concatenated in file order.
    /// Meaningless (all-zero) when `--split` was used at compress time
    /// (§9 Open Question: `--split` is mutually exclusive with whole-concat
    /// MD5 verification).
    pub whole_concat_md5: [u8; 16],
    pub created_unix_time: u64,
}

impl ContainerHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&CONTAINER_MAGIC.to_le_bytes());
        buf[8..10].copy_from_slice(&self.format_version.to_le_bytes());
        buf[10] = self.data_type.as_u8();
        buf[11] = self.encrypted as u8;
        buf[12..16].copy_from_slice(&self.component_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.total_plaintext_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.total_line_count.to_le_bytes());
        buf[32..48].copy_from_slice(&self.whole_concat_md5);
        buf[48..56].copy_from_slice(&self.created_unix_time.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> anyhow::Result<Self> {
        let magic = u64::from_le_bytes(buf[0..8].try_into()?);
        if magic != CONTAINER_MAGIC {
            anyhow::bail!("not a gtz container (bad magic)");
        }
        let format_version = u16::from_le_bytes(buf[8..10].try_into()?);
        if format_version != FORMAT_VERSION {
            anyhow::bail!(
                "unsupported container version {format_version}: this build only supports version {FORMAT_VERSION}"
            );
        }
        let mut whole_concat_md5 = [0u8; 16];
        whole_concat_md5.copy_from_slice(&buf[32..48]);
        Ok(ContainerHeader {
            format_version,
            data_type: DataType::from_u8(buf[10])?,
            encrypted: buf[11] != 0,
            component_count: u32::from_le_bytes(buf[12..16].try_into()?),
            total_plaintext_size: u64::from_le_bytes(buf[16..24].try_into()?),
            total_line_count: u64::from_le_bytes(buf[24..32].try_into()?),
            whole_concat_md5,
            created_unix_time: u64::from_le_bytes(buf[48..56].try_into()?),
        })
    }
}

/// Per-component metadata, stored in that component's `TXT_HEADER` section
/// payload (variable length, since the original banner text is carried
/// verbatim for reconstruction — VCF `##` lines, SAM `@` lines, etc.).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtHeaderInfo {
    pub banner: Vec<u8>,
    pub plaintext_size: u64,
    pub line_count: u64,
    pub md5: [u8; 16],
    /// Number of vblocks immediately following this component's `TXT_HEADER`
    /// before the next component's (or end of file). Lets a reader carve a
    /// multi-component container (§4.8 "pause/resume" concatenated input)
    /// back into its original per-component text without a side index.
    pub vblock_count: u32,
}

impl TxtHeaderInfo {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.banner.len() + 8 + 8 + 16 + 4);
        out.extend_from_slice(&(self.banner.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.banner);
        out.extend_from_slice(&self.plaintext_size.to_le_bytes());
        out.extend_from_slice(&self.line_count.to_le_bytes());
        out.extend_from_slice(&self.md5);
        out.extend_from_slice(&self.vblock_count.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() < 4 {
            anyhow::bail!("TXT_HEADER truncated (missing banner length)");
        }
        let banner_len = u32::from_le_bytes(bytes[0..4].try_into()?) as usize;
        let mut pos = 4;
        if bytes.len() < pos + banner_len + 8 + 8 + 16 + 4 {
            anyhow::bail!("TXT_HEADER truncated");
        }
        let banner = bytes[pos..pos + banner_len].to_vec();
        pos += banner_len;
        let plaintext_size = u64::from_le_bytes(bytes[pos..pos + 8].try_into()?);
        pos += 8;
        let line_count = u64::from_le_bytes(bytes[pos..pos + 8].try_into()?);
        pos += 8;
        let mut md5 = [0u8; 16];
        md5.copy_from_slice(&bytes[pos..pos + 16]);
        pos += 16;
        let vblock_count = u32::from_le_bytes(bytes[pos..pos + 4].try_into()?);
        Ok(TxtHeaderInfo {
            banner,
            plaintext_size,
            line_count,
            md5,
            vblock_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_header_roundtrip() {
        let h = ContainerHeader {
            format_version: FORMAT_VERSION,
            data_type: DataType::Vcf,
            encrypted: false,
            component_count: 2,
            total_plaintext_size: 123_456,
            total_line_count: 900,
            whole_concat_md5: [7u8; 16],
            created_unix_time: 1_700_000_000,
        };
        let back = ContainerHeader::from_bytes(&h.to_bytes()).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = [0u8; HEADER_SIZE];
        assert!(ContainerHeader::from_bytes(&buf).is_err());
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut h = ContainerHeader {
            format_version: FORMAT_VERSION,
            data_type: DataType::Sam,
            encrypted: false,
            component_count: 1,
            total_plaintext_size: 0,
            total_line_count: 0,
            whole_concat_md5: [0; 16],
            created_unix_time: 0,
        };
        let mut bytes = h.to_bytes();
        h.format_version = 99;
        bytes[8..10].copy_from_slice(&99u16.to_le_bytes());
        let err = ContainerHeader::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }

    #[test]
    fn txt_header_info_roundtrip() {
        let info = TxtHeaderInfo {
            banner: b"##fileformat=VCFv4.2\n".to_vec(),
            plaintext_size: 42,
            line_count: 1,
            md5: [9u8; 16],
            vblock_count: 3,
        };
        let back = TxtHeaderInfo::from_bytes(&info.to_bytes()).unwrap();
        assert_eq!(back, info);
    }
}
