//! Segmentation, parallel vblock dispatch, dictionary merge, and container
//! orchestration (§3-§4, §6): everything that turns a `gtz_core` context
//! table into a compressed file and back, wired up for one process to run
//! across many threads.

pub mod alias;
pub mod container;
pub mod dispatcher;
pub mod md5;
pub mod merge;
pub mod segment;
pub mod vblock;

pub use container::{compress, compress_components, decompress, decompress_components, decompress_grep, decompress_region};
pub use segment::{format_for, Format};
pub use vblock::{Vblock, VblockPool, VblockState};
