use std::io::{Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;

use gtz_core::codec::{Codec, CodecId};

/// BZIP2 general-purpose codec (spec §4.6 algorithm `bzip2`) — the default
/// for most text-like local/b250 streams.
pub struct Bzip2Codec {
    level: Compression,
}

impl Default for Bzip2Codec {
    fn default() -> Self {
        Bzip2Codec {
            level: Compression::best(),
        }
    }
}

impl Bzip2Codec {
    pub fn with_level(level: u32) -> Self {
        Bzip2Codec {
            level: Compression::new(level),
        }
    }
}

impl Codec for Bzip2Codec {
    fn id(&self) -> CodecId {
        CodecId::Bzip2
    }

    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn compress(&self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = BzEncoder::new(Vec::new(), self.level);
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, input: &[u8], expected_size: usize) -> anyhow::Result<Vec<u8>> {
        let mut decoder = BzDecoder::new(input);
        let mut out = Vec::with_capacity(expected_size);
        decoder.read_to_end(&mut out)?;
        if out.len() != expected_size {
            anyhow::bail!(
                "bzip2 codec: expected {expected_size} bytes, decompressed {}",
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
        let codec = Bzip2Codec::default();
        let data = b"chr1\t100\t.\nchr1\t103\t.\nchr2\t50\t.\n".repeat(50);
        let compressed = codec.compress(&data).unwrap();
        let back = codec.decompress(&compressed, data.len()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn decompress_rejects_size_mismatch() {
        let codec = Bzip2Codec::default();
        let compressed = codec.compress(b"hello world").unwrap();
        assert!(codec.decompress(&compressed, 3).is_err());
    }
}
