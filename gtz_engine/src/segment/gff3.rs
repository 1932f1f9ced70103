//! GFF3 segmenter (§4.4): `seqid source type start end score strand phase
//! attributes`. `attributes` reuses the same `key=value;...` splitter as
//! VCF `INFO`.

use gtz_core::context::{CtxFlags, LType};
use gtz_core::dictid::DictId;
use gtz_core::header::DataType;
use gtz_core::piz::ContextSet;

use super::{piz_field, seg_self_delta_int, seg_semicolon_kv, seg_text, seg_text_indexed, Format};
use crate::vblock::Vblock;
use gtz_core::context::ContextTable;

fn seqid_id() -> DictId {
    DictId::make(b"SEQID").tag_field()
}
fn source_id() -> DictId {
    DictId::make(b"SOURCE").tag_field()
}
fn type_id() -> DictId {
    DictId::make(b"TYPE").tag_field()
}
fn start_id() -> DictId {
    DictId::make(b"START").tag_field()
}
fn end_id() -> DictId {
    DictId::make(b"END").tag_field()
}
fn score_id() -> DictId {
    DictId::make(b"SCORE").tag_field()
}
fn strand_id() -> DictId {
    DictId::make(b"STRAND").tag_field()
}
fn phase_id() -> DictId {
    DictId::make(b"PHASE").tag_field()
}
fn attrs_id() -> DictId {
    DictId::make(b"ATTRS").tag_field()
}

pub struct Gff3;

impl Format for Gff3 {
    fn data_type(&self) -> DataType {
        DataType::Gff3
    }

    fn is_header_line(&self, line: &[u8]) -> bool {
        line.starts_with(b"#")
    }

    fn primary_dict_id(&self) -> Option<DictId> {
        Some(seqid_id())
    }

    fn seg_line(&self, vb: &mut Vblock, contexts: &ContextTable, line: &[u8]) -> anyhow::Result<()> {
        let f: Vec<&[u8]> = line.split(|&b| b == b'\t').collect();
        if f.len() != 9 {
            anyhow::bail!("GFF3 line must have exactly 9 columns, got {}", f.len());
        }
        let start: i64 = std::str::from_utf8(f[3])?.parse().unwrap_or(0);
        let seqid_wi = seg_text_indexed(vb, contexts, seqid_id(), CtxFlags::new(), f[0]);
        vb.random_access.record(vb.vblock_i, seqid_wi, start);

        seg_text(vb, contexts, source_id(), CtxFlags::new(), f[1]);
        seg_text(vb, contexts, type_id(), CtxFlags::new(), f[2]);
        seg_self_delta_int(vb, contexts, start_id(), LType::Int64, start);
        let end: i64 = std::str::from_utf8(f[4])?.parse().unwrap_or(0);
        seg_self_delta_int(vb, contexts, end_id(), LType::Int64, end);
        seg_text(vb, contexts, score_id(), CtxFlags::new(), f[5]);
        seg_text(vb, contexts, strand_id(), CtxFlags::new(), f[6]);
        seg_text(vb, contexts, phase_id(), CtxFlags::new(), f[7]);
        seg_semicolon_kv(vb, contexts, attrs_id(), f[8]);
        Ok(())
    }

    fn piz_reconstruct_line(&self, contexts: &mut ContextSet, out: &mut Vec<u8>) -> anyhow::Result<()> {
        let handlers = self.special_handlers();
        piz_field(seqid_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(source_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(type_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(start_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(end_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(score_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(strand_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(phase_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(attrs_id(), contexts, handlers, out)?;
        Ok(())
    }

    fn primary_line_position<'a>(&self, line: &'a [u8]) -> Option<(&'a [u8], i64)> {
        let mut fields = line.splitn(5, |&b| b == b'\t');
        let seqid = fields.next()?;
        let _source = fields.next()?;
        let _type = fields.next()?;
        let start: i64 = std::str::from_utf8(fields.next()?).ok()?.parse().ok()?;
        Some((seqid, start))
    }
}
