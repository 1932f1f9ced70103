//! Alias table (§4.4 "INFO/END alias sharing"): records that one context's
//! running value is a delta base borrowed from another context's, so a
//! subfield that appears only occasionally (VCF's `INFO/END`) doesn't need
//! its own independent absolute-value history.
//!
//! Stored on disk as the `ALIASES` section (§6), a flat list of
//! `(dict_id, base_dict_id)` pairs written once per container.

use std::collections::HashMap;

use gtz_core::dictid::DictId;

#[derive(Default)]
pub struct AliasTable {
    bases: HashMap<DictId, DictId>,
}

impl AliasTable {
    pub fn new() -> Self {
        AliasTable::default()
    }

    /// Record that `dict_id`'s self-delta base is `base_dict_id`'s running
    /// value (e.g. `INFO/END` aliasing `POS`).
    pub fn alias(&mut self, dict_id: DictId, base_dict_id: DictId) {
        self.bases.insert(dict_id, base_dict_id);
    }

    pub fn base_of(&self, dict_id: DictId) -> DictId {
        self.bases.get(&dict_id).copied().unwrap_or(dict_id)
    }

    /// Every recorded `(dict_id, base_dict_id)` pair, in no particular
    /// order.
    pub fn pairs(&self) -> impl Iterator<Item = (DictId, DictId)> + '_ {
        self.bases.iter().map(|(&dict_id, &base)| (dict_id, base))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.bases.len() * 16);
        out.extend_from_slice(&(self.bases.len() as u32).to_le_bytes());
        for (dict_id, base) in &self.bases {
            out.extend_from_slice(&dict_id.to_bytes());
            out.extend_from_slice(&base.to_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() < 4 {
            anyhow::bail!("ALIASES section truncated");
        }
        let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let mut bases = HashMap::with_capacity(count);
        let mut pos = 4;
        for _ in 0..count {
            if pos + 16 > bytes.len() {
                anyhow::bail!("ALIASES section truncated mid-entry");
            }
            let dict_id = DictId::from_bytes(bytes[pos..pos + 8].try_into().unwrap());
            let base = DictId::from_bytes(bytes[pos + 8..pos + 16].try_into().unwrap());
            bases.insert(dict_id, base);
            pos += 16;
        }
        Ok(AliasTable { bases })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_roundtrips_through_bytes() {
        let mut table = AliasTable::new();
        let end = DictId::make(b"END").tag_type2();
        let pos = DictId::make(b"POS").tag_field();
        table.alias(end, pos);

        let bytes = table.to_bytes();
        let restored = AliasTable::from_bytes(&bytes).unwrap();
        assert_eq!(restored.base_of(end), pos);
    }

    #[test]
    fn unaliased_dict_id_bases_on_itself() {
        let table = AliasTable::new();
        let chrom = DictId::make(b"CHROM");
        assert_eq!(table.base_of(chrom), chrom);
    }

    #[test]
    fn pairs_lists_every_recorded_alias() {
        let mut table = AliasTable::new();
        let end = DictId::make(b"END").tag_type2();
        let pos = DictId::make(b"POS").tag_field();
        table.alias(end, pos);
        let collected: Vec<(DictId, DictId)> = table.pairs().collect();
        assert_eq!(collected, vec![(end, pos)]);
    }
}
