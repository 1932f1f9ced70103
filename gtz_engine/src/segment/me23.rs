//! 23andMe raw-data segmenter (§4.4): `rsid\tchromosome\tposition\tgenotype`.
//! The simplest of the six formats. `rsid` (`rs12345`) is the one compound
//! column, split into a literal prefix plus trailing int by
//! [`super::seg_id_field`].

use gtz_core::context::{CtxFlags, LType};
use gtz_core::dictid::DictId;
use gtz_core::header::DataType;
use gtz_core::piz::ContextSet;

use super::{piz_field, seg_id_field, seg_self_delta_int, seg_text, seg_text_indexed, Format};
use crate::vblock::Vblock;
use gtz_core::context::ContextTable;

fn rsid_id() -> DictId {
    DictId::make(b"RSID").tag_field()
}
fn chrom_id() -> DictId {
    DictId::make(b"CHROM").tag_field()
}
fn pos_id() -> DictId {
    DictId::make(b"POS").tag_field()
}
fn genotype_id() -> DictId {
    DictId::make(b"GENOTYPE").tag_field()
}

pub struct Me23;

impl Format for Me23 {
    fn data_type(&self) -> DataType {
        DataType::TwentyThreeAndMe
    }

    fn is_header_line(&self, line: &[u8]) -> bool {
        line.starts_with(b"#")
    }

    fn primary_dict_id(&self) -> Option<DictId> {
        Some(chrom_id())
    }

    fn seg_line(&self, vb: &mut Vblock, contexts: &ContextTable, line: &[u8]) -> anyhow::Result<()> {
        let f: Vec<&[u8]> = line.split(|&b| b == b'\t').collect();
        if f.len() != 4 {
            anyhow::bail!("23andMe line must have exactly 4 columns, got {}", f.len());
        }
        seg_id_field(vb, contexts, rsid_id(), f[0]);
        let pos: i64 = std::str::from_utf8(f[2])?.parse().unwrap_or(0);
        let chrom_wi = seg_text_indexed(vb, contexts, chrom_id(), CtxFlags::new(), f[1]);
        vb.random_access.record(vb.vblock_i, chrom_wi, pos);
        seg_self_delta_int(vb, contexts, pos_id(), LType::Int64, pos);
        seg_text(vb, contexts, genotype_id(), CtxFlags::new(), f[3]);
        Ok(())
    }

    fn piz_reconstruct_line(&self, contexts: &mut ContextSet, out: &mut Vec<u8>) -> anyhow::Result<()> {
        let handlers = self.special_handlers();
        piz_field(rsid_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(chrom_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(pos_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(genotype_id(), contexts, handlers, out)?;
        Ok(())
    }

    fn primary_line_position<'a>(&self, line: &'a [u8]) -> Option<(&'a [u8], i64)> {
        let mut fields = line.splitn(4, |&b| b == b'\t');
        let _rsid = fields.next()?;
        let chrom = fields.next()?;
        let pos: i64 = std::str::from_utf8(fields.next()?).ok()?.parse().ok()?;
        Some((chrom, pos))
    }
}
