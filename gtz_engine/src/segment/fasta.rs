//! FASTA segmenter (§4.4): `>header` lines followed by wrapped residue
//! lines. A `LINEKIND` flag distinguishes header from residue lines so
//! reconstruction doesn't need to track each record's line-wrap width
//! explicitly — residue lines round-trip exactly regardless of how they
//! were wrapped on input.

use gtz_core::context::CtxFlags;
use gtz_core::dictid::DictId;
use gtz_core::header::DataType;
use gtz_core::piz::ContextSet;

use super::{for_each_line, piz_field, piz_reconstruct_eol, seg_eol, seg_raw_text, seg_text, Format};
use crate::vblock::Vblock;
use gtz_core::context::ContextTable;

fn header_id() -> DictId {
    DictId::make(b"FAHDR").tag_field()
}
fn seq_id() -> DictId {
    DictId::make(b"FASEQ").tag_field()
}
fn kind_id() -> DictId {
    DictId::make(b"FAKIND").tag_field()
}

pub struct Fasta;

impl Format for Fasta {
    fn data_type(&self) -> DataType {
        DataType::Fasta
    }

    fn seg_vblock(&self, vb: &mut Vblock, contexts: &ContextTable, text: &[u8]) -> anyhow::Result<u64> {
        let mut count = 0u64;
        for_each_line(text, |line, crlf| {
            if let Some(header) = line.strip_prefix(b">") {
                seg_text(vb, contexts, kind_id(), CtxFlags::new(), b"H");
                seg_text(vb, contexts, header_id(), CtxFlags::new(), header);
            } else {
                seg_text(vb, contexts, kind_id(), CtxFlags::new(), b"S");
                seg_raw_text(vb, contexts, seq_id(), line);
            }
            seg_eol(vb, contexts, crlf);
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    fn piz_reconstruct_vb(&self, contexts: &mut ContextSet, line_count: u64, out: &mut Vec<u8>) -> anyhow::Result<()> {
        let handlers = self.special_handlers();
        for _ in 0..line_count {
            let mut kind = Vec::new();
            piz_field(kind_id(), contexts, handlers, &mut kind)?;
            if kind == b"H" {
                out.push(b'>');
                piz_field(header_id(), contexts, handlers, out)?;
            } else {
                piz_field(seq_id(), contexts, handlers, out)?;
            }
            piz_reconstruct_eol(contexts, out)?;
        }
        Ok(())
    }
}
