//! SAM segmenter (§4.4): `QNAME FLAG RNAME POS MAPQ CIGAR RNEXT PNEXT TLEN
//! SEQ QUAL [optional tags...]`.
//!
//! `RNEXT == "="` (mate on the same reference) is stored as a
//! [`gtz_core::snip::Snip::Redirection`] to `RNAME` instead of a repeated
//! literal, the one field in this format where that opcode earns its keep.

use gtz_core::context::{Ctx, CtxFlags, LType};
use gtz_core::dictid::DictId;
use gtz_core::header::DataType;
use gtz_core::piz::ContextSet;
use gtz_core::snip::Snip;

use super::{piz_field, seg_missing, seg_raw_text, seg_self_delta_int, seg_text, seg_text_indexed, Format};
use crate::vblock::Vblock;
use gtz_core::context::ContextTable;

fn qname_id() -> DictId {
    DictId::make(b"QNAME").tag_field()
}
fn flag_id() -> DictId {
    DictId::make(b"FLAG").tag_field()
}
fn rname_id() -> DictId {
    DictId::make(b"RNAME").tag_field()
}
fn pos_id() -> DictId {
    DictId::make(b"POS").tag_field()
}
fn mapq_id() -> DictId {
    DictId::make(b"MAPQ").tag_field()
}
fn cigar_id() -> DictId {
    DictId::make(b"CIGAR").tag_field()
}
fn rnext_id() -> DictId {
    DictId::make(b"RNEXT").tag_field()
}
fn pnext_id() -> DictId {
    DictId::make(b"PNEXT").tag_field()
}
fn tlen_id() -> DictId {
    DictId::make(b"TLEN").tag_field()
}
fn seq_id() -> DictId {
    DictId::make(b"SEQ").tag_field()
}
fn qual_id() -> DictId {
    DictId::make(b"QUAL").tag_field()
}
fn tags_id() -> DictId {
    DictId::make(b"OPTTAGS").tag_field()
}

pub struct Sam;

impl Format for Sam {
    fn data_type(&self) -> DataType {
        DataType::Sam
    }

    fn is_header_line(&self, line: &[u8]) -> bool {
        line.starts_with(b"@")
    }

    fn primary_dict_id(&self) -> Option<DictId> {
        Some(rname_id())
    }

    fn seg_line(&self, vb: &mut Vblock, contexts: &ContextTable, line: &[u8]) -> anyhow::Result<()> {
        let f: Vec<&[u8]> = line.split(|&b| b == b'\t').collect();
        if f.len() < 11 {
            anyhow::bail!("SAM line has fewer than 11 mandatory columns");
        }
        seg_text(vb, contexts, qname_id(), CtxFlags::new(), f[0]);
        seg_text(vb, contexts, flag_id(), CtxFlags::new(), f[1]);

        let pos: i64 = std::str::from_utf8(f[3])?.parse().unwrap_or(0);
        let rname_wi = seg_text_indexed(vb, contexts, rname_id(), CtxFlags::new(), f[2]);
        vb.random_access.record(vb.vblock_i, rname_wi, pos);
        seg_self_delta_int(vb, contexts, pos_id(), LType::Int64, pos);

        seg_text(vb, contexts, mapq_id(), CtxFlags::new(), f[4]);
        seg_text(vb, contexts, cigar_id(), CtxFlags::new(), f[5]);

        if f[6] == b"=" {
            let snip = Snip::Redirection { dict_id: rname_id() }.encode();
            let ctx_arc = contexts.get_or_create(rnext_id(), LType::Text, CtxFlags::new());
            let overlay = vb.overlay_mut(rnext_id(), LType::Text, CtxFlags::new());
            let guard = ctx_arc.read().unwrap();
            let (wi, _) = overlay.evaluate(&guard, &snip);
            drop(guard);
            overlay.emit_b250(wi);
        } else {
            seg_text(vb, contexts, rnext_id(), CtxFlags::new(), f[6]);
        }

        let pnext: i64 = std::str::from_utf8(f[7])?.parse().unwrap_or(0);
        seg_self_delta_int(vb, contexts, pnext_id(), LType::Int64, pnext);
        seg_text(vb, contexts, tlen_id(), CtxFlags::new(), f[8]);

        vb.seq_len = f[9].len();
        seg_raw_text(vb, contexts, seq_id(), f[9]);
        seg_raw_text(vb, contexts, qual_id(), f[10]);

        if f.len() > 11 {
            seg_text(vb, contexts, tags_id(), CtxFlags::new(), &f[11..].join(&b'\t'));
        } else {
            seg_missing(vb, tags_id(), LType::Text, CtxFlags::new());
        }
        Ok(())
    }

    fn piz_reconstruct_line(&self, contexts: &mut ContextSet, out: &mut Vec<u8>) -> anyhow::Result<()> {
        let handlers = self.special_handlers();
        piz_field(qname_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(flag_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(rname_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(pos_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(mapq_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(cigar_id(), contexts, handlers, out)?;
        out.push(b'\t');
        ensure_ctx(contexts, rnext_id());
        piz_field(rnext_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(pnext_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(tlen_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(seq_id(), contexts, handlers, out)?;
        out.push(b'\t');
        piz_field(qual_id(), contexts, handlers, out)?;
        let before = out.len();
        out.push(b'\t');
        if !piz_field(tags_id(), contexts, handlers, out)? {
            out.truncate(before);
        }
        Ok(())
    }

    fn primary_line_position<'a>(&self, line: &'a [u8]) -> Option<(&'a [u8], i64)> {
        let mut fields = line.splitn(5, |&b| b == b'\t');
        let _qname = fields.next()?;
        let _flag = fields.next()?;
        let rname = fields.next()?;
        let pos: i64 = std::str::from_utf8(fields.next()?).ok()?.parse().ok()?;
        Some((rname, pos))
    }
}

fn ensure_ctx(contexts: &mut ContextSet, dict_id: DictId) {
    contexts
        .entry(dict_id)
        .or_insert_with(|| Ctx::new(dict_id, 0, LType::Text, CtxFlags::new()));
}
