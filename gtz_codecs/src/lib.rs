mod bsc_codec;
mod bzip2_codec;
mod lzma_codec;
mod none;
mod stream;

pub use bsc_codec::BscCodec;
pub use bzip2_codec::Bzip2Codec;
pub use lzma_codec::LzmaCodec;
pub use none::NoneCodec;
pub use stream::Stream;

use std::sync::Arc;

use gtz_core::codec::{Codec, CodecId};

/// Resolve a codec from its on-disk `codec_id` (spec §4.6's `{none, bzip2,
/// lzma, bsc}` algorithm set).
pub fn codec_by_id(id: CodecId) -> Arc<dyn Codec> {
    match id {
        CodecId::None => Arc::new(NoneCodec),
        CodecId::Bzip2 => Arc::new(Bzip2Codec::default()),
        CodecId::Lzma => Arc::new(LzmaCodec::default()),
        CodecId::Bsc => Arc::new(BscCodec),
    }
}
