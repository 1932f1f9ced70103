//! Random-access index (C12, §4.11): `(vblock_i, chrom) → [start_pos,
//! end_pos]`, letting `decompress --regions` skip vblocks that cannot
//! possibly contain a matching line without decompressing them.
//!
//! One entry is appended whenever the CHROM context's word_index changes
//! within a vblock (segmentation's job, in `gtz_engine`); this module only
//! owns storage, (de)serialization, and the region-intersection query.

use std::collections::BTreeSet;

/// One contiguous run of a single chromosome within one vblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomAccessEntry {
    pub vblock_i: u32,
    pub chrom_word_index: u32,
    pub start_pos: i64,
    pub end_pos: i64,
}

const ENTRY_SIZE: usize = 4 + 4 + 8 + 8;

impl RandomAccessEntry {
    fn to_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.vblock_i.to_le_bytes());
        out.extend_from_slice(&self.chrom_word_index.to_le_bytes());
        out.extend_from_slice(&self.start_pos.to_le_bytes());
        out.extend_from_slice(&self.end_pos.to_le_bytes());
    }

    fn from_bytes(b: &[u8]) -> Self {
        RandomAccessEntry {
            vblock_i: u32::from_le_bytes(b[0..4].try_into().unwrap()),
            chrom_word_index: u32::from_le_bytes(b[4..8].try_into().unwrap()),
            start_pos: i64::from_le_bytes(b[8..16].try_into().unwrap()),
            end_pos: i64::from_le_bytes(b[16..24].try_into().unwrap()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RandomAccessIndex {
    entries: Vec<RandomAccessEntry>,
}

impl RandomAccessIndex {
    pub fn new() -> Self {
        RandomAccessIndex { entries: Vec::new() }
    }

    /// Record a run, extending the previous entry in place if it is the
    /// same (vblock_i, chrom) pair immediately preceding this one —
    /// segmentation calls this once per line, so most calls just bump
    /// `end_pos`.
    pub fn record(&mut self, vblock_i: u32, chrom_word_index: u32, pos: i64) {
        if let Some(last) = self.entries.last_mut() {
            if last.vblock_i == vblock_i && last.chrom_word_index == chrom_word_index {
                last.end_pos = last.end_pos.max(pos);
                return;
            }
        }
        self.entries.push(RandomAccessEntry {
            vblock_i,
            chrom_word_index,
            start_pos: pos,
            end_pos: pos,
        });
    }

    pub fn entries(&self) -> &[RandomAccessEntry] {
        &self.entries
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.entries.len() * ENTRY_SIZE);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for e in &self.entries {
            e.to_bytes(&mut out);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() < 4 {
            anyhow::bail!("random access section truncated (missing count)");
        }
        let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let need = 4 + count * ENTRY_SIZE;
        if bytes.len() < need {
            anyhow::bail!("random access section truncated: need {need} bytes, have {}", bytes.len());
        }
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let start = 4 + i * ENTRY_SIZE;
            entries.push(RandomAccessEntry::from_bytes(&bytes[start..start + ENTRY_SIZE]));
        }
        Ok(RandomAccessIndex { entries })
    }

    /// vblock_i's whose recorded range for `chrom_word_index` intersects
    /// `[start, end]`.
    pub fn intersecting_vblocks(&self, chrom_word_index: u32, start: i64, end: i64) -> BTreeSet<u32> {
        self.entries
            .iter()
            .filter(|e| e.chrom_word_index == chrom_word_index && e.start_pos <= end && e.end_pos >= start)
            .map(|e| e.vblock_i)
            .collect()
    }
}

/// A user-supplied `--regions` spec, e.g. `chr2:100-200`. Chromosome name
/// resolution to a word_index is the caller's job (it needs the CHROM
/// context's dictionary); this module only parses the text and performs
/// the intersection once the caller has the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
}

impl Region {
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        let (chrom, range) = spec
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("region '{spec}' missing ':pos-pos'"))?;
        let (start_s, end_s) = range
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("region '{spec}' missing '-' in range"))?;
        let start: i64 = start_s
            .parse()
            .map_err(|_| anyhow::anyhow!("region '{spec}': invalid start position"))?;
        let end: i64 = end_s
            .parse()
            .map_err(|_| anyhow::anyhow!("region '{spec}': invalid end position"))?;
        if end < start {
            anyhow::bail!("region '{spec}': end < start");
        }
        Ok(Region {
            chrom: chrom.to_string(),
            start,
            end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_merges_consecutive_same_chrom_runs() {
        let mut idx = RandomAccessIndex::new();
        idx.record(1, 0, 100);
        idx.record(1, 0, 150);
        idx.record(1, 0, 200);
        assert_eq!(idx.entries().len(), 1);
        assert_eq!(idx.entries()[0].start_pos, 100);
        assert_eq!(idx.entries()[0].end_pos, 200);
    }

    #[test]
    fn record_starts_new_entry_on_chrom_change() {
        let mut idx = RandomAccessIndex::new();
        idx.record(1, 0, 100);
        idx.record(1, 1, 50);
        assert_eq!(idx.entries().len(), 2);
    }

    #[test]
    fn roundtrip_bytes() {
        let mut idx = RandomAccessIndex::new();
        idx.record(1, 0, 100);
        idx.record(2, 1, 5000);
        let bytes = idx.to_bytes();
        let back = RandomAccessIndex::from_bytes(&bytes).unwrap();
        assert_eq!(back.entries(), idx.entries());
    }

    #[test]
    fn intersecting_vblocks_filters_by_chrom_and_range() {
        let mut idx = RandomAccessIndex::new();
        idx.record(1, 0, 50);
        idx.record(1, 0, 150);
        idx.record(2, 0, 300);
        idx.record(3, 1, 150);

        let hits = idx.intersecting_vblocks(0, 100, 200);
        assert!(hits.contains(&1));
        assert!(!hits.contains(&2));
        assert!(!hits.contains(&3));
    }

    #[test]
    fn region_parses_chrom_colon_start_dash_end() {
        let r = Region::parse("chr2:100-200").unwrap();
        assert_eq!(r, Region { chrom: "chr2".into(), start: 100, end: 200 });
    }

    #[test]
    fn region_rejects_malformed_spec() {
        assert!(Region::parse("chr2-100").is_err());
        assert!(Region::parse("chr2:100").is_err());
        assert!(Region::parse("chr2:200-100").is_err());
    }
}
