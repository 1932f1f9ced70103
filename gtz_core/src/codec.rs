//! Codec dispatch contract (C5). `gtz_core` only defines the trait and the
//! stable on-disk algorithm tag; concrete implementations (`none`, `bzip2`,
//! `lzma`, `bsc`) live in `gtz_codecs`, mirroring the teacher's
//! `ancf_core::codec` (trait) / `ancf_codecs` (implementations) split.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    None,
    Bzip2,
    Lzma,
    Bsc,
}

impl CodecId {
    pub fn as_u8(self) -> u8 {
        match self {
            CodecId::None => 0,
            CodecId::Bzip2 => 1,
            CodecId::Lzma => 2,
            CodecId::Bsc => 3,
        }
    }

    pub fn from_u8(v: u8) -> anyhow::Result<Self> {
        Ok(match v {
            0 => CodecId::None,
            1 => CodecId::Bzip2,
            2 => CodecId::Lzma,
            3 => CodecId::Bsc,
            other => anyhow::bail!("unknown codec id {other}"),
        })
    }
}

/// Uniform compress/decompress surface over one section's bytes (§4.6).
/// Each section is compressed independently — no cross-section state —
/// which is what keeps random access and per-vblock parallelism possible.
pub trait Codec: Send + Sync {
    fn id(&self) -> CodecId;
    fn name(&self) -> &'static str;
    fn compress(&self, input: &[u8]) -> anyhow::Result<Vec<u8>>;
    fn decompress(&self, input: &[u8], expected_size: usize) -> anyhow::Result<Vec<u8>>;
}

/// Extends [`Codec`] with a chunked-input entry point so the compressor can
/// feed per-line slices (SEQ/QUAL local streams) without first
/// concatenating them into one buffer. The default implementation just
/// concatenates; codecs that can genuinely stream may override it.
pub trait CodecStream: Codec {
    fn compress_chunks(&self, chunks: &mut dyn Iterator<Item = &[u8]>) -> anyhow::Result<Vec<u8>> {
        let mut buf = Vec::new();
        for c in chunks {
            buf.extend_from_slice(c);
        }
        self.compress(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_id_roundtrip() {
        for id in [CodecId::None, CodecId::Bzip2, CodecId::Lzma, CodecId::Bsc] {
            assert_eq!(CodecId::from_u8(id.as_u8()).unwrap(), id);
        }
    }
}
