//! Open-addressed string → word_index map backing a context's dictionary
//! (C4). spec §9's Design Notes replace genozip's pointer-laden mutable
//! node graph with an arena + stable handle; this hash table is the leaf of
//! that design — it never stores the string itself, only the probe slot for
//! a word_index whose bytes live in the owning `Ctx`'s `dict` buffer (or a
//! vblock overlay's `added_dict`), so callers pass the backing bytes in on
//! every lookup.

/// One bucket: `None` = empty, `Some(word_index)` otherwise. Word indices
/// are local to whatever `(dict, nodes)` pair the caller passes in — the
/// same table type backs both the file-global dictionary and a per-vblock
/// overlay's "added" set (§3 "overlay" / §4.9 merge).
pub struct StringHashTable {
    buckets: Vec<Option<u32>>,
    mask: usize,
    len: usize,
}

/// Looks up the byte range `[offset, offset+len)` of `dict` for node `i`.
/// Implemented as a closure-free trait so both `Ctx` (global) and
/// `CtxOverlay` (per-vblock "added" set) can supply their own node tables
/// without the hash table depending on either type.
pub trait NodeLookup {
    fn node_bytes<'a>(&self, dict: &'a [u8], word_index: u32) -> &'a [u8];
}

fn fnv1a(s: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in s {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

impl StringHashTable {
    pub fn with_capacity(min_capacity: usize) -> Self {
        let cap = min_capacity.max(8).next_power_of_two();
        StringHashTable {
            buckets: vec![None; cap],
            mask: cap - 1,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Find `s` among the entries whose bytes are resolved via `lookup`
    /// against `dict`/`nodes`. Returns the matching word_index, if any.
    pub fn find<L: NodeLookup>(&self, dict: &[u8], lookup: &L, s: &[u8]) -> Option<u32> {
        if self.buckets.is_empty() {
            return None;
        }
        let h = fnv1a(s) as usize;
        let mut i = h & self.mask;
        let mut probes = 0;
        loop {
            match self.buckets[i] {
                None => return None,
                Some(word_index) => {
                    if lookup.node_bytes(dict, word_index) == s {
                        return Some(word_index);
                    }
                }
            }
            i = (i + 1) & self.mask;
            probes += 1;
            if probes > self.buckets.len() {
                return None;
            }
        }
    }

    /// Insert `word_index` (whose string is `s`) into the table, growing
    /// (doubling + full rehash) if the load factor would exceed 70%.
    pub fn insert<L: NodeLookup>(&mut self, dict: &[u8], lookup: &L, s: &[u8], word_index: u32) {
        if (self.len + 1) * 10 >= self.buckets.len() * 7 {
            self.grow(dict, lookup);
        }
        self.insert_raw(s, word_index);
        self.len += 1;
    }

    fn insert_raw(&mut self, s: &[u8], word_index: u32) {
        let h = fnv1a(s) as usize;
        let mut i = h & self.mask;
        loop {
            if self.buckets[i].is_none() {
                self.buckets[i] = Some(word_index);
                return;
            }
            i = (i + 1) & self.mask;
        }
    }

    fn grow<L: NodeLookup>(&mut self, dict: &[u8], lookup: &L) {
        let old = std::mem::take(&mut self.buckets);
        let new_cap = (old.len() * 2).max(8);
        self.buckets = vec![None; new_cap];
        self.mask = new_cap - 1;
        for slot in old.into_iter().flatten() {
            let bytes = lookup.node_bytes(dict, slot);
            self.insert_raw(bytes, slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatNodes {
        spans: Vec<(u32, u32)>, // (offset, len) per word_index, separator-free for tests
    }
    impl NodeLookup for FlatNodes {
        fn node_bytes<'a>(&self, dict: &'a [u8], word_index: u32) -> &'a [u8] {
            let (off, len) = self.spans[word_index as usize];
            &dict[off as usize..(off + len) as usize]
        }
    }

    #[test]
    fn insert_then_find() {
        let mut dict = Vec::new();
        let mut spans = Vec::new();
        let words = ["chr1", "chr2", "chr10", "chrX"];
        for w in &words {
            spans.push((dict.len() as u32, w.len() as u32));
            dict.extend_from_slice(w.as_bytes());
        }
        let lookup = FlatNodes { spans };
        let mut table = StringHashTable::with_capacity(4);
        for (i, w) in words.iter().enumerate() {
            table.insert(&dict, &lookup, w.as_bytes(), i as u32);
        }
        for (i, w) in words.iter().enumerate() {
            assert_eq!(table.find(&dict, &lookup, w.as_bytes()), Some(i as u32));
        }
        assert_eq!(table.find(&dict, &lookup, b"chrY"), None);
    }

    #[test]
    fn grows_past_load_factor() {
        let mut dict = Vec::new();
        let mut spans = Vec::new();
        let mut table = StringHashTable::with_capacity(4);
        for i in 0..100u32 {
            let s = format!("word{i}");
            spans.push((dict.len() as u32, s.len() as u32));
            dict.extend_from_slice(s.as_bytes());
        }
        let lookup = FlatNodes { spans };
        for i in 0..100u32 {
            let bytes = lookup.node_bytes(&dict, i);
            table.insert(&dict, &lookup, bytes, i);
        }
        assert_eq!(table.len(), 100);
        for i in 0..100u32 {
            let bytes = lookup.node_bytes(&dict, i);
            assert_eq!(table.find(&dict, &lookup, bytes), Some(i));
        }
    }
}
