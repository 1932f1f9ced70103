//! FASTQ segmenter (§4.4): 4-line records `@header`, `SEQ`, `+[header]`,
//! `QUAL`. `QUAL` inherits `SEQ`'s line length by construction (both are
//! NUL-terminated local-text runs, §4.4 "SEQ/QUAL... length inheritance").
//! Each of the 4 physical lines gets its own EOL entry, so a record can mix
//! `\n` and `\r\n` line endings and still round-trip exactly.

use gtz_core::context::{CtxFlags, LType};
use gtz_core::dictid::DictId;
use gtz_core::header::DataType;
use gtz_core::piz::ContextSet;

use super::{for_each_line, piz_field, piz_reconstruct_eol, seg_eol, seg_raw_text, seg_text, Format};
use crate::vblock::Vblock;
use gtz_core::context::ContextTable;

fn header_id() -> DictId {
    DictId::make(b"FQHDR").tag_field()
}
fn plus_id() -> DictId {
    DictId::make(b"FQPLUS").tag_field()
}
fn seq_id() -> DictId {
    DictId::make(b"SEQ").tag_field()
}
fn qual_id() -> DictId {
    DictId::make(b"QUAL").tag_field()
}

pub struct Fastq;

impl Format for Fastq {
    fn data_type(&self) -> DataType {
        DataType::Fastq
    }

    fn seg_vblock(&self, vb: &mut Vblock, contexts: &ContextTable, text: &[u8]) -> anyhow::Result<u64> {
        let mut slot = 0u8;
        let mut records = 0u64;
        for_each_line(text, |line, crlf| {
            match slot {
                0 => {
                    if !line.starts_with(b"@") {
                        anyhow::bail!("FASTQ record header must start with '@'");
                    }
                    seg_text(vb, contexts, header_id(), CtxFlags::new(), &line[1..]);
                }
                1 => {
                    vb.seq_len = line.len();
                    seg_raw_text(vb, contexts, seq_id(), line);
                }
                2 => {
                    if !line.starts_with(b"+") {
                        anyhow::bail!("FASTQ separator line must start with '+'");
                    }
                    seg_text(vb, contexts, plus_id(), CtxFlags::new(), &line[1..]);
                }
                _ => {
                    seg_raw_text(vb, contexts, qual_id(), line);
                    records += 1;
                }
            }
            seg_eol(vb, contexts, crlf);
            slot = (slot + 1) % 4;
            Ok(())
        })?;
        Ok(records)
    }

    fn piz_reconstruct_vb(&self, contexts: &mut ContextSet, line_count: u64, out: &mut Vec<u8>) -> anyhow::Result<()> {
        let handlers = self.special_handlers();
        for _ in 0..line_count {
            out.push(b'@');
            piz_field(header_id(), contexts, handlers, out)?;
            piz_reconstruct_eol(contexts, out)?;
            piz_field(seq_id(), contexts, handlers, out)?;
            piz_reconstruct_eol(contexts, out)?;
            out.push(b'+');
            piz_field(plus_id(), contexts, handlers, out)?;
            piz_reconstruct_eol(contexts, out)?;
            piz_field(qual_id(), contexts, handlers, out)?;
            piz_reconstruct_eol(contexts, out)?;
        }
        Ok(())
    }
}
