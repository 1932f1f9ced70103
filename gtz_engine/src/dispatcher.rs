//! Parallel vblock dispatcher (§4.8). Grounded on `jafreck-lz4r`'s
//! `threadpool.rs`: a bounded `crossbeam_channel` carries completed vblocks
//! back to the caller, while `rayon::scope` supplies the worker threads
//! themselves, so segmentation and per-context merge locks (already
//! concurrency-safe, §5) run genuinely in parallel across vblocks.
//!
//! The one ordering rule the pool itself must enforce (beyond rayon's own
//! scheduling) is the vblock #1 barrier (§4.9 step 4): the first vblock's
//! segment-merge-sort must finish before any other vblock's segmentation
//! starts, since that sort is what fixes the frequency-ranked word order
//! every later vblock's tentative words get promoted against. We satisfy it
//! by simply running vblock #1 on the calling thread before handing the
//! rest to the pool.

use gtz_core::random_access::RandomAccessIndex;
use gtz_core::section::SectionType;
use gtz_core::{context::LType, dictid::DictId};

/// One context's segmentation output for one vblock, ready to frame and
/// compress as a B250 or LOCAL section.
pub struct EncodedSection {
    pub section_type: SectionType,
    pub dict_id: DictId,
    pub ltype: LType,
    pub bytes: Vec<u8>,
}

/// Everything one vblock contributed, handed back to the writer in
/// ascending `vblock_i` order.
pub struct VblockOutput {
    pub vblock_i: u32,
    pub line_count: u64,
    pub random_access: RandomAccessIndex,
    pub aliases: Vec<crate::vblock::AliasPair>,
    pub sections: Vec<EncodedSection>,
}

/// Run `process` over every `(vblock_i, txt)` job, enforcing the vblock #1
/// barrier and returning outputs sorted back into `vblock_i` order
/// regardless of completion order.
pub fn run<F>(jobs: Vec<(u32, Vec<u8>)>, process: F) -> anyhow::Result<Vec<VblockOutput>>
where
    F: Fn(u32, &[u8]) -> anyhow::Result<VblockOutput> + Sync,
{
    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    let mut iter = jobs.into_iter();
    let (first_i, first_txt) = iter.next().unwrap();
    let mut outputs = vec![process(first_i, &first_txt)?];

    let rest: Vec<(u32, Vec<u8>)> = iter.collect();
    if !rest.is_empty() {
        let (tx, rx) = crossbeam_channel::bounded::<anyhow::Result<VblockOutput>>(rest.len());
        rayon::scope(|scope| {
            for (vblock_i, txt) in &rest {
                let tx = tx.clone();
                let process = &process;
                scope.spawn(move |_| {
                    let result = process(*vblock_i, txt);
                    let _ = tx.send(result);
                });
            }
        });
        drop(tx);

        let mut tail = Vec::with_capacity(rest.len());
        for result in rx {
            tail.push(result?);
        }
        tail.sort_by_key(|o| o.vblock_i);
        outputs.extend(tail);
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn outputs_come_back_in_vblock_order() {
        let jobs: Vec<(u32, Vec<u8>)> = (0..8).map(|i| (i, vec![i as u8])).collect();
        let outputs = run(jobs, |vblock_i, txt| {
            Ok(VblockOutput {
                vblock_i,
                line_count: txt.len() as u64,
                random_access: RandomAccessIndex::new(),
                aliases: Vec::new(),
                sections: Vec::new(),
            })
        })
        .unwrap();
        let order: Vec<u32> = outputs.iter().map(|o| o.vblock_i).collect();
        assert_eq!(order, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn first_vblock_runs_before_pool_is_spawned() {
        let counter = AtomicU32::new(0);
        let first_seen = AtomicU32::new(u32::MAX);
        let jobs: Vec<(u32, Vec<u8>)> = (0..5).map(|i| (i, Vec::new())).collect();
        run(jobs, |vblock_i, _| {
            let seq = counter.fetch_add(1, Ordering::SeqCst);
            if vblock_i == 0 {
                first_seen.store(seq, Ordering::SeqCst);
            }
            Ok(VblockOutput {
                vblock_i,
                line_count: 0,
                random_access: RandomAccessIndex::new(),
                aliases: Vec::new(),
                sections: Vec::new(),
            })
        })
        .unwrap();
        assert_eq!(first_seen.load(Ordering::SeqCst), 0, "vblock 0 must be the first job to run");
    }
}
