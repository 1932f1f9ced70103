//! Format, context model, and codec contract for the genomic container
//! format: `DictId`, per-column `Ctx`/overlay, base-250 node-index coding,
//! the snip/PIZ reconstruction engine, and on-disk section framing.
//!
//! Segmentation, the parallel dispatcher, and merge live in `gtz_engine`;
//! concrete codecs live in `gtz_codecs`. This crate is the shared format
//! both depend on, mirroring how `ancf_core` anchors `ancf_codecs` and
//! `ancf_cli` in the teacher repo.

pub mod b250;
pub mod buffer;
pub mod codec;
pub mod context;
pub mod dictid;
pub mod error;
pub mod hashtable;
pub mod header;
pub mod piz;
pub mod random_access;
pub mod section;
pub mod snip;

pub use codec::{Codec, CodecId, CodecStream};
pub use context::{Ctx, CtxFlags, CtxOverlay, ContextTable, LType};
pub use dictid::{DictId, DictIdTag};
pub use error::GtzError;
pub use header::{ContainerHeader, DataType, TxtHeaderInfo};
pub use random_access::{Region, RandomAccessEntry, RandomAccessIndex};
pub use section::{SectionFlags, SectionHeader, SectionListEntry, SectionType};
pub use snip::{Snip, Structured, StructuredItem};
