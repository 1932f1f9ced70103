use gtz_core::codec::{Codec, CodecId};

use crate::stream::Stream;

/// BSC general-purpose codec (spec §4.6 algorithm `bsc`) — invoked as an
/// external process via [`Stream`] since no maintained pure-Rust binding
/// for libbsc exists (DESIGN.md "Dropped teacher dependencies"/"Added
/// teacher-absent dependencies" records this choice). Expects a `bsc`
/// binary on `PATH`.
pub struct BscCodec;

impl Codec for BscCodec {
    fn id(&self) -> CodecId {
        CodecId::Bsc
    }

    fn name(&self) -> &'static str {
        "bsc"
    }

    fn compress(&self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
        let stream = Stream::spawn("bsc", &["e", "-", "-"])?;
        stream.run(input)
    }

    fn decompress(&self, input: &[u8], expected_size: usize) -> anyhow::Result<Vec<u8>> {
        let stream = Stream::spawn("bsc", &["d", "-", "-"])?;
        let out = stream.run(input)?;
        if out.len() != expected_size {
            anyhow::bail!(
                "bsc codec: expected {expected_size} bytes, decompressed {}",
                out.len()
            );
        }
        Ok(out)
    }
}
