//! Segmentation: splitting one vblock's plaintext into per-column
//! contexts (§4.4). Each supported format implements [`Format`]; the
//! shared helpers below are the columnar-encoding primitives every
//! segmenter builds its fields out of.

pub mod fasta;
pub mod fastq;
pub mod gff3;
pub mod me23;
pub mod sam;
pub mod vcf;

use gtz_core::context::{Ctx, CtxFlags, LType};
use gtz_core::dictid::DictId;
use gtz_core::header::DataType;
use gtz_core::piz::{ContextSet, SpecialHandlers};
use gtz_core::snip::{DeltaPayload, Snip, Structured, StructuredItem};

use crate::vblock::Vblock;
use gtz_core::context::ContextTable;

/// `SPECIAL` handler id shared by every format: reconstruct by reading one
/// NUL-terminated run from this context's own local stream. Used for raw
/// sequence/quality data, whose dictionary then holds exactly one shared
/// node regardless of how many distinct reads occur (§4.4 SEQ/QUAL).
pub const SPECIAL_LOCAL_TEXT: u8 = 1;

pub struct CommonSpecials;

impl SpecialHandlers for CommonSpecials {
    fn invoke(
        &self,
        n: u8,
        dict_id: DictId,
        contexts: &mut ContextSet,
        _payload: &[u8],
        out: &mut Vec<u8>,
    ) -> anyhow::Result<()> {
        match n {
            SPECIAL_LOCAL_TEXT => {
                let ctx = contexts
                    .get_mut(&dict_id)
                    .ok_or_else(|| anyhow::anyhow!("SPECIAL local-text: unknown context {dict_id:?}"))?;
                let bytes = ctx.take_local_text()?.to_vec();
                out.extend_from_slice(&bytes);
                Ok(())
            }
            other => anyhow::bail!("no common SPECIAL handler for n={other}"),
        }
    }
}

/// A data-type-specific segmenter/reconstructor pair (§9 "Variant dispatch
/// via function-pointer vtables").
pub trait Format: Send + Sync {
    fn data_type(&self) -> DataType;

    fn special_handlers(&self) -> &dyn SpecialHandlers {
        &CommonSpecials
    }

    /// Lines the reader should fold into the component's `TxtHeaderInfo`
    /// banner instead of routing through segmentation (VCF/GFF3 `#` comment
    /// lines, SAM `@` header records). Default: no header convention.
    fn is_header_line(&self, _line: &[u8]) -> bool {
        false
    }

    /// The context random-access entries are keyed on (CHROM/RNAME/seqid),
    /// if this format has one. `None` for read-oriented formats (FASTQ,
    /// FASTA) with no notion of a mapped position.
    fn primary_dict_id(&self) -> Option<DictId> {
        None
    }

    /// Segment one already-split line (trailing `\n`/`\r` removed) into
    /// `vb`'s overlays. Only needed by formats using the default
    /// [`Format::seg_vblock`] (one record per physical line); formats that
    /// override `seg_vblock` directly (FASTQ's 4-line records, FASTA's
    /// header+residue pairs) don't implement this.
    fn seg_line(&self, _vb: &mut Vblock, _contexts: &ContextTable, _line: &[u8]) -> anyhow::Result<()> {
        anyhow::bail!("{}: seg_line not implemented (overrides seg_vblock)", self.data_type().as_u8())
    }

    /// Reconstruct exactly one line's worth of output, without its
    /// terminator. Counterpart to `seg_line`.
    fn piz_reconstruct_line(&self, _contexts: &mut ContextSet, _out: &mut Vec<u8>) -> anyhow::Result<()> {
        anyhow::bail!("{}: piz_reconstruct_line not implemented (overrides piz_reconstruct_vb)", self.data_type().as_u8())
    }

    /// Segment the vblock's entire plaintext (header lines already
    /// stripped by the caller). Returns the number of records segmented,
    /// stored as `vb.line_count` for the matching `piz_reconstruct_vb` pass
    /// to know how many records to reconstruct.
    fn seg_vblock(&self, vb: &mut Vblock, contexts: &ContextTable, text: &[u8]) -> anyhow::Result<u64> {
        let mut count = 0u64;
        for_each_line(text, |line, crlf| {
            self.seg_line(vb, contexts, line)?;
            seg_eol(vb, contexts, crlf);
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    /// Reconstruct the vblock's `line_count` records (as segmented by
    /// `seg_vblock`) into `out`.
    fn piz_reconstruct_vb(&self, contexts: &mut ContextSet, line_count: u64, out: &mut Vec<u8>) -> anyhow::Result<()> {
        for _ in 0..line_count {
            self.piz_reconstruct_line(contexts, out)?;
            piz_reconstruct_eol(contexts, out)?;
        }
        Ok(())
    }

    /// Pull `(chrom, position)` straight out of one already-reconstructed
    /// line, for formats with a [`Format::primary_dict_id`]. Region-filtered
    /// decompress (`--regions`, §4.11) uses this to keep only the lines
    /// inside the requested window once the random-access index has already
    /// narrowed candidate vblocks down to the ones that might contain a
    /// match. `None` for formats with no chromosome/position notion.
    fn primary_line_position<'a>(&self, _line: &'a [u8]) -> Option<(&'a [u8], i64)> {
        None
    }
}

pub fn format_for(dt: DataType) -> Box<dyn Format> {
    match dt {
        DataType::Vcf => Box::new(vcf::Vcf),
        DataType::Sam => Box::new(sam::Sam),
        DataType::Fastq => Box::new(fastq::Fastq),
        DataType::Fasta => Box::new(fasta::Fasta),
        DataType::Gff3 => Box::new(gff3::Gff3),
        DataType::TwentyThreeAndMe => Box::new(me23::Me23),
    }
}

/// The CRLF-per-line flag context (§4.4): literal `"1"`/`"0"` shared by
/// every format so mixed-EOL inputs round-trip exactly.
pub fn eol_dict_id() -> DictId {
    DictId::make(b"EOL").tag_field()
}

pub fn split_tab(line: &[u8]) -> Vec<&[u8]> {
    line.split(|&b| b == b'\t').collect()
}

/// Split `text` into lines, yielding `(line_without_terminator, had_crlf)`.
/// A trailing empty segment after the final `\n` (or a fully empty `text`)
/// is dropped, matching how text files normally end.
pub fn for_each_line<'a>(text: &'a [u8], mut f: impl FnMut(&'a [u8], bool) -> anyhow::Result<()>) -> anyhow::Result<()> {
    for raw in text.split(|&b| b == b'\n') {
        if raw.is_empty() {
            continue;
        }
        let (line, crlf) = if raw.ends_with(b"\r") {
            (&raw[..raw.len() - 1], true)
        } else {
            (raw, false)
        };
        f(line, crlf)?;
    }
    Ok(())
}

fn ctx_guard_evaluate(contexts: &ContextTable, vb: &mut Vblock, dict_id: DictId, ltype: LType, flags: CtxFlags, value: &[u8]) -> u32 {
    let ctx_arc = contexts.get_or_create(dict_id, ltype, flags);
    let overlay = vb.overlay_mut(dict_id, ltype, flags);
    let guard = ctx_arc.read().unwrap();
    let (wi, _) = overlay.evaluate(&guard, value);
    drop(guard);
    overlay.emit_b250(wi);
    wi
}

/// Record the CRLF flag for one line.
pub fn seg_eol(vb: &mut Vblock, contexts: &ContextTable, crlf: bool) {
    let v: &[u8] = if crlf { b"1" } else { b"0" };
    ctx_guard_evaluate(contexts, vb, eol_dict_id(), LType::Text, CtxFlags::new(), v);
}

pub fn piz_reconstruct_eol(contexts: &mut ContextSet, out: &mut Vec<u8>) -> anyhow::Result<()> {
    let consumed = gtz_core::piz::reconstruct_next(eol_dict_id(), contexts, &CommonSpecials, out)?;
    let crlf = consumed && out.pop() == Some(b'1');
    if crlf {
        out.push(b'\r');
    }
    out.push(b'\n');
    Ok(())
}

/// Plain literal text field: dictionary entries double as the reconstructed
/// bytes (no snip opcode byte collides with ordinary text, §3 "Snip").
pub fn seg_text(vb: &mut Vblock, contexts: &ContextTable, dict_id: DictId, flags: CtxFlags, value: &[u8]) {
    ctx_guard_evaluate(contexts, vb, dict_id, LType::Text, flags, value);
}

/// Like [`seg_text`] but returns the resolved word_index, so the caller can
/// feed a primary-context (CHROM/RNAME/seqid) index straight into the
/// random-access index alongside the line's position (§4.11).
pub fn seg_text_indexed(vb: &mut Vblock, contexts: &ContextTable, dict_id: DictId, flags: CtxFlags, value: &[u8]) -> u32 {
    ctx_guard_evaluate(contexts, vb, dict_id, LType::Text, flags, value)
}

pub fn seg_missing(vb: &mut Vblock, dict_id: DictId, ltype: LType, flags: CtxFlags) {
    vb.overlay_mut(dict_id, ltype, flags).emit_missing_sf();
}

/// Raw sequence/quality data (SEQ, QUAL, FASTA residues): the dictionary
/// holds one shared `SPECIAL(local-text)` node; each line's actual bytes
/// live in the context's own local stream, NUL-terminated.
pub fn seg_raw_text(vb: &mut Vblock, contexts: &ContextTable, dict_id: DictId, value: &[u8]) {
    let flags = CtxFlags::new();
    let snip = Snip::Special {
        n: SPECIAL_LOCAL_TEXT,
        payload: Vec::new(),
    }
    .encode();
    ctx_guard_evaluate(contexts, vb, dict_id, LType::Text, flags, &snip);
    vb.overlay_mut(dict_id, LType::Text, flags).append_local_text(value);
}

/// Integer field reconstructed as `last_value + delta`, where `delta` is
/// embedded directly in the dictionary node (so lines sharing a delta,
/// e.g. `POS` advancing by a fixed stride, share one node). Falls back
/// transparently for arbitrary deltas — the dictionary simply grows by one
/// node per never-before-seen delta value.
pub fn seg_self_delta_int(vb: &mut Vblock, contexts: &ContextTable, dict_id: DictId, ltype: LType, value: i64) {
    let mut flags = CtxFlags::new();
    flags.store_value = true;
    let ctx_arc = contexts.get_or_create(dict_id, ltype, flags);
    let overlay = vb.overlay_mut(dict_id, ltype, flags);
    let delta = if overlay.last_line_i >= 0 { value - overlay.last_value } else { value };
    let snip = Snip::SelfDelta {
        delta: DeltaPayload::Value(delta),
    }
    .encode();
    let guard = ctx_arc.read().unwrap();
    let (wi, _) = overlay.evaluate(&guard, &snip);
    drop(guard);
    overlay.emit_b250(wi);
    overlay.last_value = value;
    overlay.last_delta = delta;
    overlay.last_line_i += 1;
}

/// Integer field delta-based against another context's running value
/// (§4.4 "INFO/END alias sharing"). `base_last_value` is the base
/// context's current `last_value` as segmentation has observed it so far
/// this vblock.
pub fn seg_other_delta_int(
    vb: &mut Vblock,
    contexts: &ContextTable,
    dict_id: DictId,
    ltype: LType,
    base_dict_id: DictId,
    base_last_value: i64,
    value: i64,
) {
    let flags = CtxFlags::new();
    let delta = value - base_last_value;
    let snip = Snip::OtherDelta {
        dict_id: base_dict_id,
        delta: DeltaPayload::Value(delta),
    }
    .encode();
    ctx_guard_evaluate(contexts, vb, dict_id, ltype, flags, &snip);
}

/// Prefix + trailing-decimal compound field (VCF `ID`, 23andMe `RSID`,
/// e.g. `rs12345`): the non-digit prefix (`rs`) becomes a `LOOKUP` snip's
/// literal prefix, shared by every value with that prefix, while the
/// trailing digits are appended to the context's local stream as a plain
/// int, so `rs12345`/`rs12346`/... dedup on the one dictionary node and
/// differ only by a few local-stream bytes. Falls back to a plain literal
/// when there's no trailing digit run, or the digits carry a leading zero
/// a decimal round-trip would lose (`rs007` -> `7` is not reversible).
/// Grounded on `seg_id_field` (`original_source/vcf_seg.c`/`seg_me23.c`).
pub fn seg_id_field(vb: &mut Vblock, contexts: &ContextTable, dict_id: DictId, value: &[u8]) {
    match split_trailing_decimal(value) {
        Some((prefix, numeric)) => {
            let flags = CtxFlags::new();
            let snip = Snip::Lookup {
                base_ctx: None,
                prefix: prefix.to_vec(),
            }
            .encode();
            let ctx_arc = contexts.get_or_create(dict_id, LType::Int64, flags);
            let overlay = vb.overlay_mut(dict_id, LType::Int64, flags);
            let guard = ctx_arc.read().unwrap();
            let (wi, _) = overlay.evaluate(&guard, &snip);
            drop(guard);
            overlay.emit_b250(wi);
            overlay.append_local_int(numeric);
        }
        None => seg_text(vb, contexts, dict_id, CtxFlags::new(), value),
    }
}

fn split_trailing_decimal(value: &[u8]) -> Option<(&[u8], i64)> {
    let digit_start = value.iter().rposition(|b| !b.is_ascii_digit()).map(|p| p + 1).unwrap_or(0);
    let digits = &value[digit_start..];
    if digits.is_empty() || (digits.len() > 1 && digits[0] == b'0') {
        return None;
    }
    let numeric: i64 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some((&value[..digit_start], numeric))
}

/// Reconstruct one field from its context's next b250 entry, returning
/// whether a snip was actually evaluated (mirrors
/// [`gtz_core::piz::reconstruct_next`], re-exported so segmenters don't
/// need to import `gtz_core::piz` directly).
pub fn piz_field(dict_id: DictId, contexts: &mut ContextSet, handlers: &dyn SpecialHandlers, out: &mut Vec<u8>) -> anyhow::Result<bool> {
    gtz_core::piz::reconstruct_next(dict_id, contexts, handlers, out)
}

/// A semicolon-joined `key=value` (or bare `key`) attribute list (VCF
/// `INFO`, GFF3 column 9): each distinct key gets its own type-2
/// subcontext; `container_dict_id`'s own node is a `STRUCTURED` template
/// listing this line's keys in order, so files that repeat the same
/// key-set (common — most lines share an annotation schema) share one
/// template node, while each key's own value stream compresses on its own
/// merits.
pub fn seg_semicolon_kv(vb: &mut Vblock, contexts: &ContextTable, container_dict_id: DictId, text: &[u8]) {
    if text.is_empty() || text == b"." {
        seg_text(vb, contexts, container_dict_id, CtxFlags::new(), b".");
        return;
    }
    let tokens: Vec<&[u8]> = text.split(|&b| b == b';').filter(|t| !t.is_empty()).collect();
    let mut items = Vec::with_capacity(tokens.len());
    for (i, tok) in tokens.iter().enumerate() {
        let sep: [u8; 2] = if i + 1 < tokens.len() { [b';', 0] } else { [0, 0] };
        let key_id = match tok.iter().position(|&b| b == b'=') {
            Some(eq) => {
                let key_id = DictId::make(&tok[..eq]).tag_type2();
                seg_text(vb, contexts, key_id, CtxFlags::new(), tok);
                key_id
            }
            None => {
                let key_id = DictId::make(tok).tag_type2();
                seg_text(vb, contexts, key_id, CtxFlags::new(), tok);
                key_id
            }
        };
        items.push(StructuredItem { dict_id: key_id, sep });
    }
    let template = Structured {
        repeats: 1,
        items,
        repsep: [0, 0],
        flags: 0,
        prefixes: Vec::new(),
    };
    let snip = Snip::Structured(template).encode();
    ctx_guard_evaluate(contexts, vb, container_dict_id, LType::Text, CtxFlags::new(), &snip);
}

/// Ensure a context exists in a fresh decode-side `ContextSet` with the
/// given dictionary (used by `container.rs` when loading a vblock's
/// contexts fresh from the DICT section before reconstruction begins).
pub fn ensure_decode_ctx(contexts: &mut ContextSet, dict_id: DictId, did_i: u32, ltype: LType, flags: CtxFlags) -> &mut Ctx {
    contexts.entry(dict_id).or_insert_with(|| Ctx::new(dict_id, did_i, ltype, flags))
}
