use std::io::{Read, Write};

use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use gtz_core::codec::{Codec, CodecId};

/// LZMA/XZ general-purpose codec (spec §4.6 algorithm `lzma`) — a higher
/// compression ratio / slower alternative to `bzip2`, typically chosen for
/// `local` streams of large, highly-redundant sequence data.
pub struct LzmaCodec {
    preset: u32,
}

impl Default for LzmaCodec {
    fn default() -> Self {
        LzmaCodec { preset: 6 }
    }
}

impl LzmaCodec {
    pub fn with_preset(preset: u32) -> Self {
        LzmaCodec { preset }
    }
}

impl Codec for LzmaCodec {
    fn id(&self) -> CodecId {
        CodecId::Lzma
    }

    fn name(&self) -> &'static str {
        "lzma"
    }

    fn compress(&self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = XzEncoder::new(Vec::new(), self.preset);
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, input: &[u8], expected_size: usize) -> anyhow::Result<Vec<u8>> {
        let mut decoder = XzDecoder::new(input);
        let mut out = Vec::with_capacity(expected_size);
        decoder.read_to_end(&mut out)?;
        if out.len() != expected_size {
            anyhow::bail!(
                "lzma codec: expected {expected_size} bytes, decompressed {}",
                out.len()
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_arbitrary_text() {
        let codec = LzmaCodec::default();
        let data = b"ACGTACGTACGTACGTNNNNACGT".repeat(100);
        let compressed = codec.compress(&data).unwrap();
        let back = codec.decompress(&compressed, data.len()).unwrap();
        assert_eq!(back, data);
    }
}
