//! PIZ reconstruction engine (C11): a small bytecode interpreter that
//! rebuilds one vblock's text from its contexts' b250/local streams by
//! evaluating [`crate::snip::Snip`] opcodes (§4.10).
//!
//! Decode-side contexts are vblock-local: `dict`/`nodes` are the file's
//! already-merged, read-only dictionary; `b250`/`local` and the decode
//! cursors are loaded fresh per vblock and reset between vblocks
//! ([`Ctx::reset_decode_cursors`]). This mirrors the zip side's
//! arena-per-owner discipline without needing the `RwLock` machinery that
//! only exists to arbitrate concurrent *writers*.

use std::collections::HashMap;

use crate::context::{B250Resolved, Ctx};
use crate::dictid::DictId;
use crate::snip::{DeltaPayload, Snip, Structured};

/// Per-vblock set of contexts, keyed by dict_id, as loaded from the
/// container's DICT + per-vblock B250/LOCAL sections.
pub type ContextSet = HashMap<DictId, Ctx>;

/// Data-type-specific `SPECIAL n` dispatch table (§9 "Variant dispatch via
/// function-pointer vtables... preserve as a small trait"). Implemented by
/// each `gtz_engine` data type; `gtz_core` only defines the seam.
pub trait SpecialHandlers {
    fn invoke(
        &self,
        n: u8,
        dict_id: DictId,
        contexts: &mut ContextSet,
        payload: &[u8],
        out: &mut Vec<u8>,
    ) -> anyhow::Result<()>;
}

/// A `SpecialHandlers` that has none; used by data types with no `SPECIAL`
/// snips and by tests.
pub struct NoSpecialHandlers;
impl SpecialHandlers for NoSpecialHandlers {
    fn invoke(&self, n: u8, dict_id: DictId, _: &mut ContextSet, _: &[u8], _: &mut Vec<u8>) -> anyhow::Result<()> {
        anyhow::bail!("no SPECIAL handler registered for n={n} on context {dict_id:?}")
    }
}

/// Reconstruct the next line's worth of output for `dict_id` by taking its
/// next b250 entry, resolving it to a snip, and interpreting that snip.
/// Returns `Ok(false)` if the context's b250 stream is exhausted (subfield
/// absent for this line — no bytes consumed, nothing appended).
pub fn reconstruct_next(
    dict_id: DictId,
    contexts: &mut ContextSet,
    handlers: &dyn SpecialHandlers,
    out: &mut Vec<u8>,
) -> anyhow::Result<bool> {
    let resolved = {
        let ctx = contexts
            .get_mut(&dict_id)
            .ok_or_else(|| anyhow::anyhow!("unknown context {dict_id:?}"))?;
        ctx.take_b250()
    };
    match resolved {
        None | Some(B250Resolved::MissingSf) => Ok(false),
        Some(B250Resolved::EmptySf) => Ok(true),
        Some(B250Resolved::WordIndex(word_index)) => {
            let snip_bytes = {
                let ctx = contexts.get(&dict_id).unwrap();
                ctx.node_string(word_index).to_vec()
            };
            let snip = Snip::parse(&snip_bytes)?;
            let start = out.len();
            interpret(dict_id, &snip, contexts, handlers, out, true)?;
            let text = out[start..].to_vec();
            contexts.get_mut(&dict_id).unwrap().last_text = text;
            Ok(true)
        }
    }
}

/// Evaluate one already-decoded snip against `dict_id`'s context,
/// appending reconstructed bytes to `out`. `store` controls whether a
/// literal/delta result updates `ctx.last_value` (always suppressed one
/// level down inside `DONT_STORE`).
fn interpret(
    dict_id: DictId,
    snip: &Snip,
    contexts: &mut ContextSet,
    handlers: &dyn SpecialHandlers,
    out: &mut Vec<u8>,
    store: bool,
) -> anyhow::Result<()> {
    match snip {
        Snip::Lookup { base_ctx, prefix } => {
            out.extend_from_slice(prefix);
            let source = base_ctx.unwrap_or(dict_id);
            let ctx = contexts
                .get_mut(&source)
                .ok_or_else(|| anyhow::anyhow!("LOOKUP: unknown context {source:?}"))?;
            let value = ctx.take_local_int()?;
            out.extend_from_slice(value.to_string().as_bytes());
            if store {
                contexts.get_mut(&dict_id).unwrap().last_value = value;
            }
        }
        Snip::SelfDelta { delta } => {
            let value = apply_delta(contexts, dict_id, dict_id, *delta)?;
            out.extend_from_slice(value.to_string().as_bytes());
        }
        Snip::OtherDelta { dict_id: other, delta } => {
            let value = apply_delta(contexts, dict_id, *other, *delta)?;
            out.extend_from_slice(value.to_string().as_bytes());
        }
        Snip::Redirection { dict_id: target } => {
            // Borrow the target context's already-reconstructed value for
            // the current line rather than pulling its next b250 entry —
            // the target's own field is always reconstructed earlier in the
            // same line, so re-invoking its decode stream here would
            // consume the *next* line's entry instead (§4.10).
            let text = contexts
                .get(target)
                .ok_or_else(|| anyhow::anyhow!("REDIRECTION: unknown context {target:?}"))?
                .last_text
                .clone();
            out.extend_from_slice(&text);
        }
        Snip::Structured(template) => {
            interpret_structured(template, contexts, handlers, out)?;
        }
        Snip::Special { n, payload } => {
            handlers.invoke(*n, dict_id, contexts, payload, out)?;
        }
        Snip::DontStore(inner) => {
            interpret(dict_id, inner, contexts, handlers, out, false)?;
        }
        Snip::Literal(bytes) => {
            out.extend_from_slice(bytes);
            if store {
                if let Ok(s) = std::str::from_utf8(bytes) {
                    if let Ok(v) = s.parse::<i64>() {
                        let ctx = contexts.get_mut(&dict_id).unwrap();
                        if ctx.flags.store_value {
                            ctx.last_value = v;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn apply_delta(
    contexts: &mut ContextSet,
    home_dict_id: DictId,
    source_dict_id: DictId,
    delta: DeltaPayload,
) -> anyhow::Result<i64> {
    let ctx = contexts
        .get_mut(&source_dict_id)
        .ok_or_else(|| anyhow::anyhow!("DELTA: unknown context {source_dict_id:?}"))?;
    let value = match delta {
        DeltaPayload::Value(d) => ctx.last_value + d,
        DeltaPayload::NegateValue => -ctx.last_value,
        DeltaPayload::NegateLastDelta => ctx.last_value - ctx.last_delta,
    };
    let applied_delta = match delta {
        DeltaPayload::Value(d) => d,
        _ => value - ctx.last_value,
    };
    ctx.last_delta = applied_delta;
    ctx.last_value = value;
    if source_dict_id != home_dict_id {
        // the home context still tracks its own last_value independently;
        // OTHER_DELTA only borrows the source's running value as a base.
        if let Some(home) = contexts.get_mut(&home_dict_id) {
            home.last_line_i = home.last_line_i.max(0);
        }
    }
    Ok(value)
}

fn interpret_structured(
    template: &Structured,
    contexts: &mut ContextSet,
    handlers: &dyn SpecialHandlers,
    out: &mut Vec<u8>,
) -> anyhow::Result<()> {
    for repeat in 0..template.repeats {
        for (i, item) in template.items.iter().enumerate() {
            // One literal prefix per item position, repeated every `repeat`
            // (genozip's CON_PREFIX: a fixed string table parallel to
            // `items`, not a per-repeat one).
            if let Some(prefix) = template.prefixes.get(i) {
                out.extend_from_slice(prefix);
            }
            reconstruct_next(item.dict_id, contexts, handlers, out)?;
            emit_sep(item.sep, out);
        }
        if repeat + 1 < template.repeats {
            emit_sep(template.repsep, out);
        }
    }
    Ok(())
}

fn emit_sep(sep: [u8; 2], out: &mut Vec<u8>) {
    if sep[0] != 0 {
        out.push(sep[0]);
    }
    if sep[1] != 0 {
        out.push(sep[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CtxFlags, LType};

    fn ctx_with_dict(dict_id: DictId, words: &[&[u8]]) -> Ctx {
        let mut ctx = Ctx::new(dict_id, 0, LType::Text, CtxFlags::new());
        for w in words {
            ctx.append_global(w);
        }
        ctx
    }

    #[test]
    fn literal_snip_reconstructs_verbatim() {
        let dict_id = DictId::make(b"CHROM");
        let mut ctx = ctx_with_dict(dict_id, &[b"chr1"]);
        ctx.b250 = {
            let mut v = Vec::new();
            crate::b250::encode_one(crate::b250::B250Code::Index(0), &mut v);
            v
        };
        let mut contexts = ContextSet::new();
        contexts.insert(dict_id, ctx);
        let mut out = Vec::new();
        let consumed = reconstruct_next(dict_id, &mut contexts, &NoSpecialHandlers, &mut out).unwrap();
        assert!(consumed);
        assert_eq!(out, b"chr1");
    }

    #[test]
    fn self_delta_reconstructs_against_last_value() {
        let dict_id = DictId::make(b"POS");
        let mut flags = CtxFlags::new();
        flags.store_value = true;
        let mut ctx = Ctx::new(dict_id, 0, LType::Int32, flags);
        ctx.last_value = 100;
        let snip = Snip::SelfDelta {
            delta: DeltaPayload::Value(3),
        };
        let word_index = ctx.append_global(&snip.encode());
        ctx.b250 = {
            let mut v = Vec::new();
            crate::b250::encode_one(crate::b250::B250Code::Index(word_index), &mut v);
            v
        };
        let mut contexts = ContextSet::new();
        contexts.insert(dict_id, ctx);
        let mut out = Vec::new();
        reconstruct_next(dict_id, &mut contexts, &NoSpecialHandlers, &mut out).unwrap();
        assert_eq!(out, b"103");
        assert_eq!(contexts[&dict_id].last_value, 103);
    }

    #[test]
    fn missing_sentinel_consumes_no_bytes() {
        let dict_id = DictId::make(b"INFO_END");
        let mut ctx = Ctx::new(dict_id, 0, LType::Text, CtxFlags::new());
        ctx.b250 = {
            let mut v = Vec::new();
            crate::b250::encode_one(crate::b250::B250Code::MissingSf, &mut v);
            v
        };
        let mut contexts = ContextSet::new();
        contexts.insert(dict_id, ctx);
        let mut out = Vec::new();
        let consumed = reconstruct_next(dict_id, &mut contexts, &NoSpecialHandlers, &mut out).unwrap();
        assert!(!consumed);
        assert!(out.is_empty());
    }

    #[test]
    fn structured_emits_items_with_separators() {
        let gt1_id = DictId::make(b"GT1");
        let gt2_id = DictId::make(b"GT2");
        let mut gt1 = ctx_with_dict(gt1_id, &[b"0"]);
        gt1.b250 = {
            let mut v = Vec::new();
            crate::b250::encode_one(crate::b250::B250Code::Index(0), &mut v);
            v
        };
        let mut gt2 = ctx_with_dict(gt2_id, &[b"1"]);
        gt2.b250 = {
            let mut v = Vec::new();
            crate::b250::encode_one(crate::b250::B250Code::Index(0), &mut v);
            v
        };
        let mut contexts = ContextSet::new();
        contexts.insert(gt1_id, gt1);
        contexts.insert(gt2_id, gt2);

        let template = Structured {
            repeats: 1,
            items: vec![
                crate::snip::StructuredItem {
                    dict_id: gt1_id,
                    sep: [b'/', 0],
                },
                crate::snip::StructuredItem {
                    dict_id: gt2_id,
                    sep: [0, 0],
                },
            ],
            repsep: [0, 0],
            flags: 0,
            prefixes: vec![],
        };
        let mut out = Vec::new();
        interpret_structured(&template, &mut contexts, &NoSpecialHandlers, &mut out).unwrap();
        assert_eq!(out, b"0/1");
    }

    #[test]
    fn structured_emits_prefixes_before_each_item() {
        let a_id = DictId::make(b"A");
        let b_id = DictId::make(b"B");
        let mut a = ctx_with_dict(a_id, &[b"1"]);
        a.b250 = {
            let mut v = Vec::new();
            crate::b250::encode_one(crate::b250::B250Code::Index(0), &mut v);
            v
        };
        let mut b = ctx_with_dict(b_id, &[b"2"]);
        b.b250 = {
            let mut v = Vec::new();
            crate::b250::encode_one(crate::b250::B250Code::Index(0), &mut v);
            v
        };
        let mut contexts = ContextSet::new();
        contexts.insert(a_id, a);
        contexts.insert(b_id, b);

        let template = Structured {
            repeats: 1,
            items: vec![
                crate::snip::StructuredItem { dict_id: a_id, sep: [b';', 0] },
                crate::snip::StructuredItem { dict_id: b_id, sep: [0, 0] },
            ],
            repsep: [0, 0],
            flags: 0,
            prefixes: vec![b"x=".to_vec(), b"y=".to_vec()],
        };
        let mut out = Vec::new();
        interpret_structured(&template, &mut contexts, &NoSpecialHandlers, &mut out).unwrap();
        assert_eq!(out, b"x=1;y=2");
    }
}
