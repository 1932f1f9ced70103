//! Vblock: the unit of parallel work (§3 "Vblock", §3 "Lifecycles").
//!
//! Grounded on `original_source/vblock.c`'s pool-allocated runtime
//! container, replacing its pointer-graph-of-contexts with the arena +
//! stable-handle design from spec §9: a vblock owns one [`CtxOverlay`] per
//! context it touches, keyed by `dict_id`, and never mutates the
//! file-global `Ctx` directly — that's [`crate::merge`]'s job alone.

use std::collections::HashMap;

use gtz_core::context::{CtxFlags, CtxOverlay, LType};
use gtz_core::dictid::DictId;
use gtz_core::random_access::RandomAccessIndex;

/// One `(dict_id, base_dict_id)` pair this vblock's segmentation recorded
/// (VCF `INFO/END` delta-aliased against `POS`, §4.4 scenario #5), folded
/// into the file-level [`crate::alias::AliasTable`] alongside every other
/// vblock's once segmentation finishes.
pub type AliasPair = (DictId, DictId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VblockState {
    Free,
    Assigned,
    Reading,
    Ready,
    Computing,
    Processed,
    Written,
}

/// One batch of input lines, carried through reading → segmentation →
/// merge → b250/codec compression → writing.
pub struct Vblock {
    pub vblock_i: u32,
    pub state: VblockState,
    /// The text window this vblock is responsible for (§4.8 reader loop).
    pub txt_data: Vec<u8>,
    pub overlays: HashMap<DictId, CtxOverlay>,
    pub random_access: RandomAccessIndex,
    pub line_count: u64,
    pub longest_line: usize,
    /// Set by the SEQ segmenter, read by QUAL's so quality strings inherit
    /// their sequence's length without re-encoding it (§4.4).
    pub seq_len: usize,
    /// Current vblock-wide ploidy for genotype matrices (§4.4).
    pub ploidy: u32,
    /// Aliases this vblock's segmentation recorded, folded into the
    /// file-level alias table by the caller once all vblocks finish.
    pub aliases: Vec<AliasPair>,
    /// Compressed, framed section bytes ready for the writer.
    pub z_data: Vec<u8>,
}

impl Vblock {
    fn new(vblock_i: u32) -> Self {
        Vblock {
            vblock_i,
            state: VblockState::Assigned,
            txt_data: Vec::new(),
            overlays: HashMap::new(),
            random_access: RandomAccessIndex::new(),
            line_count: 0,
            longest_line: 0,
            seq_len: 0,
            ploidy: 1,
            aliases: Vec::new(),
            z_data: Vec::new(),
        }
    }

    fn reset(&mut self, vblock_i: u32) {
        self.vblock_i = vblock_i;
        self.state = VblockState::Assigned;
        self.txt_data.clear();
        self.overlays.clear();
        self.random_access = RandomAccessIndex::new();
        self.line_count = 0;
        self.longest_line = 0;
        self.seq_len = 0;
        self.ploidy = 1;
        self.aliases.clear();
        self.z_data.clear();
    }

    /// Lazily create (or fetch) this vblock's overlay for `dict_id`.
    pub fn overlay_mut(&mut self, dict_id: DictId, ltype: LType, flags: CtxFlags) -> &mut CtxOverlay {
        self.overlays
            .entry(dict_id)
            .or_insert_with(|| CtxOverlay::new(dict_id, 0, ltype, flags))
    }
}

/// Pool of vblocks cycling free → assigned → ... → free (§3 "Lifecycles"),
/// so a long-running compression avoids reallocating each vblock's
/// contexts and buffers from scratch.
#[derive(Default)]
pub struct VblockPool {
    free: Vec<Vblock>,
}

impl VblockPool {
    pub fn new() -> Self {
        VblockPool { free: Vec::new() }
    }

    pub fn acquire(&mut self, vblock_i: u32) -> Vblock {
        match self.free.pop() {
            Some(mut vb) => {
                vb.reset(vblock_i);
                vb
            }
            None => Vblock::new(vblock_i),
        }
    }

    pub fn release(&mut self, vb: Vblock) {
        self.free.push(vb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reuses_released_vblocks() {
        let mut pool = VblockPool::new();
        let mut vb = pool.acquire(1);
        vb.txt_data.extend_from_slice(b"chr1\t100\n");
        vb.line_count = 1;
        pool.release(vb);

        let vb2 = pool.acquire(2);
        assert_eq!(vb2.vblock_i, 2);
        assert!(vb2.txt_data.is_empty(), "released vblock's buffers must be cleared on reuse");
        assert_eq!(vb2.line_count, 0);
    }
}
