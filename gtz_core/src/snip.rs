//! Snip opcodes and the `STRUCTURED` template (§3 "Snip"/"Structured", §9
//! "Snip opcodes as low-ASCII bytes — keep the wire encoding but expose a
//! typed enum internally; decode once at the start of `interpret`").
//!
//! A snip is a byte string pulled from a context's dictionary. Its first
//! byte, if it falls in the reserved `0x01..=0x08` range, selects an
//! opcode; anything else (including all printable ASCII) is literal text.
//! [`crate::piz`] decodes a [`Snip`] once per context-read and interprets it;
//! this module only owns the wire format.

use base64::Engine as _;

use crate::dictid::DictId;

pub const OPCODE_LOOKUP: u8 = 1;
pub const OPCODE_OTHER_LOOKUP: u8 = 2;
pub const OPCODE_SELF_DELTA: u8 = 3;
pub const OPCODE_OTHER_DELTA: u8 = 4;
pub const OPCODE_REDIRECTION: u8 = 5;
pub const OPCODE_STRUCTURED: u8 = 6;
pub const OPCODE_SPECIAL: u8 = 7;
pub const OPCODE_DONT_STORE: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snip {
    /// Reconstruct by pulling the next datum from `local`. `base_ctx ==
    /// None` means "this context" (`LOOKUP`); `Some(dict_id)` is
    /// `OTHER_LOOKUP`. `prefix` is literal text emitted before the looked-up
    /// value.
    Lookup {
        base_ctx: Option<DictId>,
        prefix: Vec<u8>,
    },
    /// `value = ctx.last_value + delta`. `'-'` negates `last_value`; an
    /// empty payload negates `last_delta` instead of adding a new one.
    SelfDelta { delta: DeltaPayload },
    OtherDelta { dict_id: DictId, delta: DeltaPayload },
    Redirection { dict_id: DictId },
    Structured(Structured),
    Special { n: u8, payload: Vec<u8> },
    /// Wraps another snip; reconstruct as usual but suppress the
    /// `last_value` update that would otherwise follow.
    DontStore(Box<Snip>),
    Literal(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaPayload {
    /// ASCII integer delta added to the base value.
    Value(i64),
    /// `-` — negate the base value.
    NegateValue,
    /// empty payload — negate `last_delta` instead of adding a fresh delta.
    NegateLastDelta,
}

impl DeltaPayload {
    fn parse(ascii: &[u8]) -> anyhow::Result<Self> {
        if ascii.is_empty() {
            return Ok(DeltaPayload::NegateLastDelta);
        }
        if ascii == b"-" {
            return Ok(DeltaPayload::NegateValue);
        }
        let s = std::str::from_utf8(ascii)?;
        Ok(DeltaPayload::Value(s.parse::<i64>()?))
    }

    fn encode(self, out: &mut Vec<u8>) {
        match self {
            DeltaPayload::NegateLastDelta => {}
            DeltaPayload::NegateValue => out.push(b'-'),
            DeltaPayload::Value(v) => out.extend_from_slice(v.to_string().as_bytes()),
        }
    }
}

impl Snip {
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let Some(&op) = bytes.first() else {
            return Ok(Snip::Literal(Vec::new()));
        };
        let rest = &bytes[1..];
        Ok(match op {
            OPCODE_LOOKUP => Snip::Lookup {
                base_ctx: None,
                prefix: rest.to_vec(),
            },
            OPCODE_OTHER_LOOKUP => {
                let (dict_id, prefix) = split_dict_id(rest)?;
                Snip::Lookup {
                    base_ctx: Some(dict_id),
                    prefix: prefix.to_vec(),
                }
            }
            OPCODE_SELF_DELTA => Snip::SelfDelta {
                delta: DeltaPayload::parse(rest)?,
            },
            OPCODE_OTHER_DELTA => {
                let (dict_id, ascii) = split_dict_id(rest)?;
                Snip::OtherDelta {
                    dict_id,
                    delta: DeltaPayload::parse(ascii)?,
                }
            }
            OPCODE_REDIRECTION => {
                let (dict_id, _) = split_dict_id(rest)?;
                Snip::Redirection { dict_id }
            }
            OPCODE_STRUCTURED => Snip::Structured(Structured::from_base64(rest)?),
            OPCODE_SPECIAL => {
                let n = *rest.first().ok_or_else(|| anyhow::anyhow!("SPECIAL snip missing handler id"))?;
                Snip::Special {
                    n,
                    payload: rest[1..].to_vec(),
                }
            }
            OPCODE_DONT_STORE => Snip::DontStore(Box::new(Snip::parse(rest)?)),
            _ => Snip::Literal(bytes.to_vec()),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Snip::Lookup { base_ctx: None, prefix } => {
                out.push(OPCODE_LOOKUP);
                out.extend_from_slice(prefix);
            }
            Snip::Lookup {
                base_ctx: Some(dict_id),
                prefix,
            } => {
                out.push(OPCODE_OTHER_LOOKUP);
                out.extend_from_slice(&dict_id.to_bytes());
                out.extend_from_slice(prefix);
            }
            Snip::SelfDelta { delta } => {
                out.push(OPCODE_SELF_DELTA);
                delta.encode(&mut out);
            }
            Snip::OtherDelta { dict_id, delta } => {
                out.push(OPCODE_OTHER_DELTA);
                out.extend_from_slice(&dict_id.to_bytes());
                delta.encode(&mut out);
            }
            Snip::Redirection { dict_id } => {
                out.push(OPCODE_REDIRECTION);
                out.extend_from_slice(&dict_id.to_bytes());
            }
            Snip::Structured(s) => {
                out.push(OPCODE_STRUCTURED);
                out.extend_from_slice(s.to_base64().as_bytes());
            }
            Snip::Special { n, payload } => {
                out.push(OPCODE_SPECIAL);
                out.push(*n);
                out.extend_from_slice(payload);
            }
            Snip::DontStore(inner) => {
                out.push(OPCODE_DONT_STORE);
                out.extend_from_slice(&inner.encode());
            }
            Snip::Literal(bytes) => out.extend_from_slice(bytes),
        }
        out
    }
}

fn split_dict_id(bytes: &[u8]) -> anyhow::Result<(DictId, &[u8])> {
    if bytes.len() < 8 {
        anyhow::bail!("snip truncated before dict_id (need 8 bytes, got {})", bytes.len());
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    Ok((DictId::from_bytes(raw), &bytes[8..]))
}

/// One item of a [`Structured`] template: which subcontext supplies this
/// repeat's value, and the one- or two-byte separator following it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuredItem {
    pub dict_id: DictId,
    pub sep: [u8; 2],
}

/// A fixed-size template describing a repeated record (§3 "Structured"):
/// `{repeats, items[{dict_id, sep}], repsep, flags, prefixes}`. Prefixes are
/// a string table shared across items, delimited in-band when serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structured {
    pub repeats: u32,
    pub items: Vec<StructuredItem>,
    pub repsep: [u8; 2],
    pub flags: u8,
    pub prefixes: Vec<Vec<u8>>,
}

const PREFIX_DELIM: u8 = 0;

impl Structured {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.repeats.to_le_bytes());
        out.push(self.items.len() as u8);
        for item in &self.items {
            out.extend_from_slice(&item.dict_id.to_bytes());
            out.push(item.sep[0]);
            out.push(item.sep[1]);
        }
        out.push(self.repsep[0]);
        out.push(self.repsep[1]);
        out.push(self.flags);
        out.push(self.prefixes.len() as u8);
        for p in &self.prefixes {
            out.extend_from_slice(p);
            out.push(PREFIX_DELIM);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut pos = 0usize;
        let need = |pos: usize, n: usize| -> anyhow::Result<()> {
            if pos + n > bytes.len() {
                anyhow::bail!("STRUCTURED payload truncated");
            }
            Ok(())
        };
        need(pos, 4)?;
        let repeats = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        need(pos, 1)?;
        let num_items = bytes[pos] as usize;
        pos += 1;

        let mut items = Vec::with_capacity(num_items);
        for _ in 0..num_items {
            need(pos, 10)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[pos..pos + 8]);
            let dict_id = DictId::from_bytes(raw);
            let sep = [bytes[pos + 8], bytes[pos + 9]];
            items.push(StructuredItem { dict_id, sep });
            pos += 10;
        }
        need(pos, 3)?;
        let repsep = [bytes[pos], bytes[pos + 1]];
        let flags = bytes[pos + 2];
        pos += 3;
        need(pos, 1)?;
        let num_prefixes = bytes[pos] as usize;
        pos += 1;

        let mut prefixes = Vec::with_capacity(num_prefixes);
        for _ in 0..num_prefixes {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == PREFIX_DELIM)
                .map(|p| pos + p)
                .ok_or_else(|| anyhow::anyhow!("STRUCTURED prefix table missing delimiter"))?;
            prefixes.push(bytes[pos..end].to_vec());
            pos = end + 1;
        }

        Ok(Structured {
            repeats,
            items,
            repsep,
            flags,
            prefixes,
        })
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(s: &[u8]) -> anyhow::Result<Self> {
        let raw = base64::engine::general_purpose::STANDARD.decode(s)?;
        Self::from_bytes(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_is_returned_verbatim() {
        let snip = Snip::parse(b"chr1").unwrap();
        assert_eq!(snip, Snip::Literal(b"chr1".to_vec()));
        assert_eq!(snip.encode(), b"chr1");
    }

    #[test]
    fn self_delta_roundtrip_value_and_sentinels() {
        for (ascii, expected) in [
            (&b"3"[..], DeltaPayload::Value(3)),
            (&b"-5"[..], DeltaPayload::Value(-5)),
            (&b"-"[..], DeltaPayload::NegateValue),
            (&b""[..], DeltaPayload::NegateLastDelta),
        ] {
            let mut bytes = vec![OPCODE_SELF_DELTA];
            bytes.extend_from_slice(ascii);
            let snip = Snip::parse(&bytes).unwrap();
            assert_eq!(snip, Snip::SelfDelta { delta: expected });
            assert_eq!(snip.encode(), bytes);
        }
    }

    #[test]
    fn other_lookup_roundtrip() {
        let dict_id = DictId::make(b"POS");
        let snip = Snip::Lookup {
            base_ctx: Some(dict_id),
            prefix: b"x=".to_vec(),
        };
        let encoded = snip.encode();
        assert_eq!(Snip::parse(&encoded).unwrap(), snip);
    }

    #[test]
    fn dont_store_wraps_inner_snip() {
        let inner = Snip::Lookup {
            base_ctx: None,
            prefix: Vec::new(),
        };
        let snip = Snip::DontStore(Box::new(inner.clone()));
        let encoded = snip.encode();
        assert_eq!(Snip::parse(&encoded).unwrap(), snip);
    }

    #[test]
    fn structured_roundtrip() {
        let s = Structured {
            repeats: 3,
            items: vec![
                StructuredItem {
                    dict_id: DictId::make(b"GT1"),
                    sep: [b'/', 0],
                },
                StructuredItem {
                    dict_id: DictId::make(b"GT2"),
                    sep: [b':', 0],
                },
            ],
            repsep: [b',', 0],
            flags: 0,
            prefixes: vec![b"chr".to_vec(), Vec::new()],
        };
        let snip = Snip::Structured(s.clone());
        let encoded = snip.encode();
        assert_eq!(Snip::parse(&encoded).unwrap(), Snip::Structured(s));
    }
}
