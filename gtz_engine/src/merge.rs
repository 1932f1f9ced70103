//! Per-vblock merge (§4.9): promote a vblock's tentative dictionary
//! additions into the file-global, canonical dictionary, then rewrite that
//! vblock's b250 streams to use the canonical indices.
//!
//! 1. For each context the vblock touched, look up (or append) each
//!    tentatively-added word in the global `Ctx` under its write lock —
//!    this is where two vblocks racing to invent the same new word
//!    converge on one canonical index (§5 "merge-time hash probing").
//! 2. Rewrite the vblock's own b250 stream, resolving `ONE_UP` to a
//!    concrete index first (tentative adjacency does not imply canonical
//!    adjacency) and re-applying it afterward.
//! 3. For the file's first vblock only, additionally sort each touched
//!    context by descending frequency-within-that-vblock and rewrite its
//!    b250 a second time (§4.9 step 4, the "vblock #1 sort-and-promote
//!    barrier": every other vblock's segmentation blocks on this
//!    completing so no one ever observes pre-sort indices).

use gtz_core::b250::{self, B250Code};
use gtz_core::context::{ContextTable, TENTATIVE_BASE};
use gtz_core::random_access::RandomAccessIndex;

use crate::vblock::{Vblock, VblockPool};

/// Resolve every entry in a b250 stream to either a concrete word_index or
/// a sentinel, with `ONE_UP` already expanded.
enum Resolved {
    Word(u32),
    Empty,
    Missing,
}

fn resolve_all(bytes: &[u8]) -> Vec<Resolved> {
    let mut out = Vec::new();
    let mut pos = 0;
    let mut prev: Option<u32> = None;
    while let Some(code) = b250::decode_one(bytes, &mut pos) {
        match code {
            B250Code::Index(v) => {
                out.push(Resolved::Word(v));
                prev = Some(v);
            }
            B250Code::OneUp => {
                let v = prev.expect("ONE_UP with no preceding index").wrapping_add(1);
                out.push(Resolved::Word(v));
                prev = Some(v);
            }
            B250Code::EmptySf => out.push(Resolved::Empty),
            B250Code::MissingSf => out.push(Resolved::Missing),
        }
    }
    out
}

fn reencode(resolved: &[Resolved], allow_one_up: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(resolved.len());
    let mut prev: Option<u32> = None;
    for r in resolved {
        match r {
            Resolved::Word(v) => {
                if allow_one_up && prev == Some(v.wrapping_sub(1)) {
                    b250::encode_one(B250Code::OneUp, &mut out);
                } else {
                    b250::encode_one(B250Code::Index(*v), &mut out);
                }
                prev = Some(*v);
            }
            Resolved::Empty => b250::encode_one(B250Code::EmptySf, &mut out),
            Resolved::Missing => b250::encode_one(B250Code::MissingSf, &mut out),
        }
    }
    out
}

fn remap_b250(bytes: &[u8], allow_one_up: bool, map: impl Fn(u32) -> u32) -> Vec<u8> {
    let mut resolved = resolve_all(bytes);
    for r in &mut resolved {
        if let Resolved::Word(v) = r {
            *v = map(*v);
        }
    }
    reencode(&resolved, allow_one_up)
}

fn frequency(bytes: &[u8], node_count: usize) -> Vec<u32> {
    let mut freq = vec![0u32; node_count];
    for r in resolve_all(bytes) {
        if let Resolved::Word(v) = r {
            if (v as usize) < freq.len() {
                freq[v as usize] += 1;
            }
        }
    }
    freq
}

/// Merge one vblock's overlays into the global context table, rewriting
/// its b250 streams in place to use canonical word indices. `is_first`
/// additionally triggers the one-time frequency sort (§4.9 step 4).
pub fn merge_vblock(contexts: &ContextTable, vb: &mut Vblock, is_first: bool) {
    for (&dict_id, overlay) in vb.overlays.iter_mut() {
        let ctx_arc = contexts
            .get(dict_id)
            .expect("context must already exist: created via get_or_create during segmentation");
        let mut global = ctx_arc.write().unwrap();

        let local_to_canonical: Vec<u32> = overlay
            .added_words()
            .map(|w| match global.find(w) {
                Some(existing) => existing,
                None => global.append_global(w),
            })
            .collect();

        let allow_one_up = overlay.flags.allow_one_up;
        overlay.b250 = remap_b250(&overlay.b250, allow_one_up, |v| {
            if v >= TENTATIVE_BASE {
                local_to_canonical[(v - TENTATIVE_BASE) as usize]
            } else {
                v
            }
        });

        if is_first {
            let freq = frequency(&overlay.b250, global.nodes.len());
            let remap = global.sort_by_frequency(&freq);
            overlay.b250 = remap_b250(&overlay.b250, allow_one_up, |v| remap[v as usize]);
        }
    }
}

/// Remap a vblock's random-access entries' `chrom_word_index` through the
/// same canonicalization merge just performed on the primary dict_id
/// context (CHROM/RNAME/seqid), since those entries were recorded against
/// tentative indices during segmentation.
pub fn canonicalize_random_access(contexts: &ContextTable, vb: &Vblock, primary_dict_id: gtz_core::dictid::DictId) -> RandomAccessIndex {
    let ctx_arc = contexts.get(primary_dict_id).expect("primary context must exist after merge");
    let global = ctx_arc.read().unwrap();
    let mut out = RandomAccessIndex::new();
    for e in vb.random_access.entries() {
        let resolved = if e.chrom_word_index >= TENTATIVE_BASE {
            // Tentative indices are only ever resolvable against this
            // vblock's own overlay, which merge has already consumed; by
            // the time this runs, the overlay for primary_dict_id has
            // already rewritten its b250 with canonical indices, but the
            // random-access index was captured separately at segmentation
            // time and needs the same translation the overlay's own words
            // received. Re-resolve by looking up the word's bytes.
            let overlay = vb.overlays.get(&primary_dict_id).expect("primary context must have been segmented");
            let bytes_for = overlay
                .added_words()
                .nth((e.chrom_word_index - TENTATIVE_BASE) as usize)
                .expect("tentative random-access index out of range");
            global.find(bytes_for).expect("word must be promoted to global by now")
        } else {
            e.chrom_word_index
        };
        out.record(e.vblock_i, resolved, e.start_pos);
        out.record(e.vblock_i, resolved, e.end_pos);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtz_core::context::{CtxFlags, LType};
    use gtz_core::dictid::DictId;

    #[test]
    fn merge_promotes_tentative_words_and_rewrites_b250() {
        let contexts = ContextTable::new();
        let dict_id = DictId::make(b"CHROM");
        contexts.get_or_create(dict_id, LType::Text, CtxFlags::new());

        let mut pool = VblockPool::new();
        let mut vb = pool.acquire(7);
        {
            let ctx_arc = contexts.get(dict_id).unwrap();
            let overlay = vb.overlay_mut(dict_id, LType::Text, CtxFlags::new());
            let guard = ctx_arc.read().unwrap();
            let (wi1, _) = overlay.evaluate(&guard, b"chr1");
            drop(guard);
            overlay.emit_b250(wi1);
            let guard = ctx_arc.read().unwrap();
            let (wi2, _) = overlay.evaluate(&guard, b"chr2");
            drop(guard);
            overlay.emit_b250(wi2);
        }

        merge_vblock(&contexts, &mut vb, true);

        let overlay = vb.overlays.get(&dict_id).unwrap();
        let decoded = b250::decode_sequence(&overlay.b250);
        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].unwrap() < TENTATIVE_BASE);
        assert!(decoded[1].unwrap() < TENTATIVE_BASE);
    }
}
