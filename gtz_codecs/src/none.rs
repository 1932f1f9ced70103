use gtz_core::codec::{Codec, CodecId};

/// No-op codec: stores a section verbatim. Used for sections too small to
/// benefit from compression and as a round-trip sanity baseline (spec
/// §4.6 algorithm `none`).
pub struct NoneCodec;

impl Codec for NoneCodec {
    fn id(&self) -> CodecId {
        CodecId::None
    }

    fn name(&self) -> &'static str {
        "none"
    }

    fn compress(&self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn decompress(&self, input: &[u8], expected_size: usize) -> anyhow::Result<Vec<u8>> {
        if input.len() != expected_size {
            anyhow::bail!(
                "none codec: expected {expected_size} bytes, section holds {}",
                input.len()
            );
        }
        Ok(input.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_is_identity() {
        let codec = NoneCodec;
        let data = b"chr1\tchr2\tchr3\n";
        let compressed = codec.compress(data).unwrap();
        assert_eq!(compressed, data);
        let back = codec.decompress(&compressed, data.len()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn decompress_rejects_size_mismatch() {
        let codec = NoneCodec;
        assert!(codec.decompress(b"abc", 10).is_err());
    }
}
