//! Container orchestration (§6): ties `gtz_core::{section,header,
//! random_access}` together into the on-disk layout and drives the
//! segment → merge → compress → frame pipeline end to end. Grounded on
//! `ancf_core::format`'s header-then-framed-blocks-then-trailing-index
//! shape, generalized to the vblock/context model.
//!
//! Layout written by [`compress`] (see also `gtz_core::section`'s module
//! doc):
//! ```text
//! { [TXT_HEADER] [VB_HEADER, {B250|LOCAL}*]* }+ [DICT]* [RANDOM_ACCESS]
//! [ALIASES] [CONTAINER_HEADER] [SECTION_LIST] [8-byte footer: offset of
//! the SECTION_LIST section's header]
//! ```
//! The outer `{...}+` group repeats once per component (almost always once).
//! A reader never needs to scan forward: seek to `len - 8`, read the
//! footer, jump straight to the section list, and every other section's
//! offset falls out of its entries.
//!
//! A container may hold more than one logical text component (§4.8
//! "pause/resume": multiple inputs concatenated on one command line, e.g.
//! paired-end FASTQ R1/R2). Each component gets its own `TXT_HEADER` and
//! contiguous run of vblocks; dictionaries, the random-access index, and
//! the alias table stay global to the whole file, matching how the same
//! `DictId` is shared across components of the same data type in practice.
//! `--split` (§9 Open Question 3) still rules out per-component MD5
//! verification independent of the whole-concat digest.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use gtz_core::codec::{Codec, CodecId};
use gtz_core::context::{Ctx, CtxFlags, LType};
use gtz_core::dictid::DictId;
use gtz_core::header::{ContainerHeader, DataType, FORMAT_VERSION, TxtHeaderInfo};
use gtz_core::piz::ContextSet;
use gtz_core::random_access::{RandomAccessIndex, Region};
use gtz_core::section::{SectionFlags, SectionHeader, SectionListEntry, SectionType, SECTION_HEADER_SIZE};

use crate::alias::AliasTable;
use crate::dispatcher::{self, EncodedSection, VblockOutput};
use crate::merge;
use crate::segment::{format_for, Format};
use crate::vblock::VblockPool;

/// Plaintext lines per vblock. FASTQ is adjusted down to a multiple of 4 so
/// a vblock boundary never splits a read record (§3 "Vblock").
const TARGET_VBLOCK_LINES: usize = 50_000;

fn meta_dict_id(tag: &[u8]) -> DictId {
    DictId::make(tag)
}

/// Split `body` into `(vblock_i, bytes)` jobs on line boundaries, respecting
/// FASTQ's 4-line record grouping. `target_lines` overrides
/// [`TARGET_VBLOCK_LINES`] (the CLI's `--vblock` flag, in lines).
fn split_vblocks(body: &[u8], data_type: DataType, target_lines: Option<usize>) -> Vec<(u32, Vec<u8>)> {
    let target = target_lines.unwrap_or(TARGET_VBLOCK_LINES).max(1);
    let lines_per_vblock = match data_type {
        DataType::Fastq => (target / 4).max(1) * 4,
        _ => target,
    };
    let mut jobs = Vec::new();
    let mut vblock_i = 0u32;
    let mut start = 0usize;
    let mut line_in_block = 0usize;
    let mut i = 0usize;
    while i < body.len() {
        if body[i] == b'\n' {
            line_in_block += 1;
            if line_in_block == lines_per_vblock {
                jobs.push((vblock_i, body[start..=i].to_vec()));
                vblock_i += 1;
                start = i + 1;
                line_in_block = 0;
            }
        }
        i += 1;
    }
    if start < body.len() {
        jobs.push((vblock_i, body[start..].to_vec()));
    }
    jobs
}

/// Split the leading run of header lines (VCF/GFF3 `#`, SAM `@`) off the
/// front of `input`, returning `(banner_bytes, body_bytes, header_line_count)`.
fn split_banner<'a>(input: &'a [u8], format: &dyn Format) -> (&'a [u8], &'a [u8], u64) {
    let mut pos = 0usize;
    let mut count = 0u64;
    loop {
        let rest = &input[pos..];
        if rest.is_empty() {
            break;
        }
        let newline = rest.iter().position(|&b| b == b'\n');
        let line_end = newline.map(|p| p + 1).unwrap_or(rest.len());
        let line = &rest[..newline.unwrap_or(rest.len())];
        let trimmed = line.strip_suffix(b"\r").unwrap_or(line);
        if !format.is_header_line(trimmed) {
            break;
        }
        pos += line_end;
        count += 1;
    }
    (&input[..pos], &input[pos..], count)
}

struct SectionWriter<W: Write> {
    out: W,
    pos: u64,
    codec: Arc<dyn Codec>,
    entries: Vec<SectionListEntry>,
}

impl<W: Write> SectionWriter<W> {
    fn new(out: W, codec: Arc<dyn Codec>) -> Self {
        SectionWriter {
            out,
            pos: 0,
            codec,
            entries: Vec::new(),
        }
    }

    fn write_section(
        &mut self,
        section_type: SectionType,
        dict_id: DictId,
        vblock_i: u32,
        ltype: Option<LType>,
        payload: &[u8],
    ) -> anyhow::Result<u64> {
        let compressed = self.codec.compress(payload)?;
        let header = SectionHeader {
            section_type,
            codec: self.codec.id(),
            ltype,
            flags: SectionFlags::empty(),
            compressed_offset: SECTION_HEADER_SIZE as u32,
            compressed_size: compressed.len() as u32,
            uncompressed_size: payload.len() as u32,
            vblock_i,
            dict_id,
        };
        let start = self.pos;
        self.out.write_all(&header.to_bytes())?;
        self.out.write_all(&compressed)?;
        self.pos += SECTION_HEADER_SIZE as u64 + compressed.len() as u64;
        self.entries.push(SectionListEntry {
            section_type,
            vblock_i,
            dict_id,
            offset: start,
        });
        Ok(start)
    }
}

/// Compress `input` (one complete text component) into `out` as a gtz
/// container. `vblock_lines` overrides the default vblock target size
/// (`--vblock`, in lines); `None` uses [`TARGET_VBLOCK_LINES`].
pub fn compress<W: Write>(
    input: &[u8],
    data_type: DataType,
    codec_id: CodecId,
    vblock_lines: Option<usize>,
    out: W,
) -> anyhow::Result<()> {
    compress_components(&[input], data_type, codec_id, vblock_lines, out)
}

/// Compress several logical text components, concatenated on one command
/// line (§4.8 "pause/resume"), into a single multi-component container.
/// All components must share `data_type`; dictionaries and the
/// random-access index are shared across them the way genozip shares
/// dictionaries between, say, paired-end FASTQ files.
pub fn compress_components<W: Write>(
    inputs: &[&[u8]],
    data_type: DataType,
    codec_id: CodecId,
    vblock_lines: Option<usize>,
    out: W,
) -> anyhow::Result<()> {
    if inputs.is_empty() {
        anyhow::bail!("compress_components requires at least one input component");
    }
    let format = format_for(data_type);
    let contexts = gtz_core::context::ContextTable::new();
    let pool = Mutex::new(VblockPool::new());
    let primary_dict_id = format.primary_dict_id();

    let mut next_vblock_i = 0u32;
    let mut components = Vec::with_capacity(inputs.len());
    for &input in inputs {
        let (banner, body, header_line_count) = split_banner(input, format.as_ref());
        let jobs: Vec<(u32, Vec<u8>)> = split_vblocks(body, data_type, vblock_lines)
            .into_iter()
            .map(|(local_i, bytes)| (local_i + next_vblock_i, bytes))
            .collect();
        let vblock_count = jobs.len() as u32;
        next_vblock_i += vblock_count;

        let outputs = dispatcher::run(jobs, |vblock_i, txt| {
            let mut vb = pool.lock().unwrap().acquire(vblock_i);
            let line_count = format.seg_vblock(&mut vb, &contexts, txt)?;
            vb.line_count = line_count;
            merge::merge_vblock(&contexts, &mut vb, vblock_i == 0);

            let random_access = match (primary_dict_id, vb.random_access.entries().is_empty()) {
                (_, true) => RandomAccessIndex::new(),
                (Some(primary), false) => merge::canonicalize_random_access(&contexts, &vb, primary),
                (None, false) => vb.random_access.clone(),
            };

            let mut sections = Vec::new();
            for (&dict_id, overlay) in &vb.overlays {
                if !overlay.b250.is_empty() {
                    sections.push(EncodedSection {
                        section_type: SectionType::B250,
                        dict_id,
                        ltype: overlay.ltype,
                        bytes: overlay.b250.clone(),
                    });
                }
                if !overlay.local.is_empty() {
                    sections.push(EncodedSection {
                        section_type: SectionType::Local,
                        dict_id,
                        ltype: overlay.ltype,
                        bytes: overlay.local.clone(),
                    });
                }
            }

            let result = VblockOutput {
                vblock_i,
                line_count,
                random_access,
                aliases: vb.aliases.clone(),
                sections,
            };
            pool.lock().unwrap().release(vb);
            Ok(result)
        })?;

        let txt_header = TxtHeaderInfo {
            banner: banner.to_vec(),
            plaintext_size: input.len() as u64,
            line_count: header_line_count + outputs.iter().map(|o| o.line_count).sum::<u64>(),
            md5: crate::md5::digest_bytes(input),
            vblock_count,
        };
        components.push((txt_header, outputs));
    }

    let codec = gtz_codecs::codec_by_id(codec_id);
    let mut w = SectionWriter::new(out, codec);

    let mut file_random_access = RandomAccessIndex::new();
    let mut file_aliases = AliasTable::new();
    let mut total_line_count = 0u64;
    for (txt_header, outputs) in &components {
        w.write_section(SectionType::TxtHeader, meta_dict_id(b"_TXT_"), 0, None, &txt_header.to_bytes())?;
        total_line_count += txt_header.line_count;

        for output in outputs {
            w.write_section(
                SectionType::VbHeader,
                meta_dict_id(b"_VB_"),
                output.vblock_i,
                None,
                &output.line_count.to_le_bytes(),
            )?;
            for section in &output.sections {
                w.write_section(section.section_type, section.dict_id, output.vblock_i, Some(section.ltype), &section.bytes)?;
            }
            for entry in output.random_access.entries() {
                file_random_access.record(entry.vblock_i, entry.chrom_word_index, entry.start_pos);
                file_random_access.record(entry.vblock_i, entry.chrom_word_index, entry.end_pos);
            }
            for &(dict_id, base_dict_id) in &output.aliases {
                file_aliases.alias(dict_id, base_dict_id);
            }
        }
    }

    for dict_id in contexts.dict_ids_in_order() {
        let ctx_arc = contexts.get(dict_id).expect("dict_ids_in_order only lists created contexts");
        let ctx = ctx_arc.read().unwrap();
        let mut payload = Vec::with_capacity(1 + ctx.dict.len());
        payload.push(encode_flags(ctx.flags));
        payload.extend_from_slice(&ctx.dict);
        w.write_section(SectionType::Dict, dict_id, 0, Some(ctx.ltype), &payload)?;
    }

    w.write_section(SectionType::RandomAccess, meta_dict_id(b"_RA_"), 0, None, &file_random_access.to_bytes())?;
    w.write_section(SectionType::Aliases, meta_dict_id(b"_AL_"), 0, None, &file_aliases.to_bytes())?;

    let total_plaintext_size: u64 = inputs.iter().map(|i| i.len() as u64).sum();
    let mut whole_concat_acc = crate::md5::Md5Accumulator::new();
    for &input in inputs {
        whole_concat_acc.update(input);
    }
    let container_header = ContainerHeader {
        format_version: FORMAT_VERSION,
        data_type,
        encrypted: false,
        component_count: inputs.len() as u32,
        total_plaintext_size,
        total_line_count,
        whole_concat_md5: whole_concat_acc.finalize(),
        created_unix_time: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    };
    w.write_section(SectionType::ContainerHeader, meta_dict_id(b"_HDR_"), 0, None, &container_header.to_bytes())?;

    let mut list_payload = Vec::with_capacity(4 + w.entries.len() * SectionListEntry::SIZE);
    list_payload.extend_from_slice(&(w.entries.len() as u32).to_le_bytes());
    for entry in &w.entries {
        list_payload.extend_from_slice(&entry.to_bytes());
    }
    let section_list_offset = w.write_section(SectionType::SectionList, meta_dict_id(b"_SL_"), 0, None, &list_payload)?;

    w.out.write_all(&section_list_offset.to_le_bytes())?;
    Ok(())
}

fn encode_flags(flags: CtxFlags) -> u8 {
    (flags.store_value as u8) | ((flags.no_stons as u8) << 1) | ((flags.allow_one_up as u8) << 2)
}

fn decode_flags(b: u8) -> CtxFlags {
    CtxFlags {
        store_value: b & 1 != 0,
        no_stons: b & 2 != 0,
        allow_one_up: b & 4 != 0,
    }
}

struct ParsedSection {
    header: SectionHeader,
    payload: Vec<u8>,
}

fn read_section(bytes: &[u8], offset: u64, codec_cache: &mut HashMap<CodecId, Arc<dyn Codec>>) -> anyhow::Result<ParsedSection> {
    let start = offset as usize;
    if start + SECTION_HEADER_SIZE > bytes.len() {
        anyhow::bail!("section header at offset {offset} runs past end of file");
    }
    let mut raw = [0u8; SECTION_HEADER_SIZE];
    raw.copy_from_slice(&bytes[start..start + SECTION_HEADER_SIZE]);
    let header = SectionHeader::from_bytes(&raw)?;
    let payload_start = start + SECTION_HEADER_SIZE;
    let payload_end = payload_start + header.compressed_size as usize;
    if payload_end > bytes.len() {
        anyhow::bail!("section payload at offset {offset} runs past end of file");
    }
    let codec = codec_cache
        .entry(header.codec)
        .or_insert_with(|| gtz_codecs::codec_by_id(header.codec))
        .clone();
    let payload = codec.decompress(&bytes[payload_start..payload_end], header.uncompressed_size as usize)?;
    Ok(ParsedSection { header, payload })
}

fn parse_dict(dict_bytes: &[u8]) -> Vec<(u32, u32)> {
    let mut nodes = Vec::new();
    let mut offset = 0u32;
    let mut i = 0usize;
    let mut start = 0usize;
    while i < dict_bytes.len() {
        if dict_bytes[i] == 0 {
            nodes.push((offset, (i - start) as u32));
            offset = (i + 1) as u32;
            start = i + 1;
        }
        i += 1;
    }
    nodes
}

/// Decompress a gtz container's bytes back into its original plaintext.
pub fn decompress(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    if bytes.len() < 8 {
        anyhow::bail!("file too small to be a gtz container");
    }
    let footer = u64::from_le_bytes(bytes[bytes.len() - 8..].try_into().unwrap());
    let mut codec_cache = HashMap::new();
    let list_section = read_section(bytes, footer, &mut codec_cache)?;
    if list_section.header.section_type != SectionType::SectionList {
        anyhow::bail!("footer did not point at a SECTION_LIST section");
    }
    let entries = parse_section_list(&list_section.payload)?;

    let header_entry = entries
        .iter()
        .find(|e| e.section_type == SectionType::ContainerHeader)
        .ok_or_else(|| anyhow::anyhow!("container missing CONTAINER_HEADER entry"))?;
    let header_section = read_section(bytes, header_entry.offset, &mut codec_cache)?;
    let mut header_buf = [0u8; gtz_core::header::HEADER_SIZE];
    header_buf.copy_from_slice(&header_section.payload[..gtz_core::header::HEADER_SIZE]);
    let container_header = ContainerHeader::from_bytes(&header_buf)?;
    let format = format_for(container_header.data_type);

    let mut txt_infos: Vec<TxtHeaderInfo> = Vec::new();
    for entry in entries.iter().filter(|e| e.section_type == SectionType::TxtHeader) {
        let section = read_section(bytes, entry.offset, &mut codec_cache)?;
        txt_infos.push(TxtHeaderInfo::from_bytes(&section.payload)?);
    }
    if txt_infos.is_empty() {
        anyhow::bail!("container missing TXT_HEADER entry");
    }

    let mut dicts: HashMap<DictId, (Vec<u8>, LType, CtxFlags)> = HashMap::new();
    for entry in entries.iter().filter(|e| e.section_type == SectionType::Dict) {
        let section = read_section(bytes, entry.offset, &mut codec_cache)?;
        let flags = decode_flags(section.payload[0]);
        let dict_bytes = section.payload[1..].to_vec();
        let ltype = section.header.ltype.expect("DICT section always carries an ltype");
        dicts.insert(entry.dict_id, (dict_bytes, ltype, flags));
    }

    let alias_table = match entries.iter().find(|e| e.section_type == SectionType::Aliases) {
        Some(entry) => {
            let section = read_section(bytes, entry.offset, &mut codec_cache)?;
            AliasTable::from_bytes(&section.payload)?
        }
        None => AliasTable::new(),
    };

    let mut vblock_is: Vec<u32> = entries
        .iter()
        .filter(|e| e.section_type == SectionType::VbHeader)
        .map(|e| e.vblock_i)
        .collect();
    vblock_is.sort_unstable();
    let mut remaining_vblocks = vblock_is.into_iter();

    let mut out = Vec::new();
    for txt_info in &txt_infos {
        out.extend_from_slice(&txt_info.banner);

        for _ in 0..txt_info.vblock_count {
            let vblock_i = remaining_vblocks
                .next()
                .ok_or_else(|| anyhow::anyhow!("TXT_HEADER vblock_count exceeds available vblocks"))?;
            let vb_entry = entries
                .iter()
                .find(|e| e.section_type == SectionType::VbHeader && e.vblock_i == vblock_i)
                .unwrap();
            let vb_section = read_section(bytes, vb_entry.offset, &mut codec_cache)?;
            let line_count = u64::from_le_bytes(vb_section.payload[..8].try_into().unwrap());

            let mut ctx_set: ContextSet = HashMap::new();
            for (&dict_id, (dict_bytes, ltype, flags)) in &dicts {
                let mut ctx = Ctx::new(dict_id, 0, *ltype, *flags);
                ctx.dict = dict_bytes.clone();
                let node_spans = parse_dict(dict_bytes);
                ctx.nodes = node_spans
                    .into_iter()
                    .map(|(offset, len)| gtz_core::context::Node { offset, len })
                    .collect();
                ctx_set.insert(dict_id, ctx);
            }
            for entry in entries
                .iter()
                .filter(|e| e.vblock_i == vblock_i && matches!(e.section_type, SectionType::B250 | SectionType::Local))
            {
                let section = read_section(bytes, entry.offset, &mut codec_cache)?;
                let ctx = ctx_set
                    .get_mut(&entry.dict_id)
                    .ok_or_else(|| anyhow::anyhow!("B250/LOCAL section references unknown dict_id {:?}", entry.dict_id))?;
                match entry.section_type {
                    SectionType::B250 => ctx.b250 = section.payload,
                    SectionType::Local => ctx.local = section.payload,
                    _ => unreachable!(),
                }
            }

            // Defensive context bootstrap (mirrors `ensure_format_ctx`/
            // `ensure_ctx`'s "rare but real missing context" idiom): every
            // aliased dict_id is expected to have its own DICT section
            // today, but a context that always defers entirely to its base
            // (never itself advancing a b250/local stream) wouldn't need
            // one, so fall back to the base's shell rather than failing.
            for (dict_id, base_dict_id) in alias_table.pairs() {
                if !ctx_set.contains_key(&dict_id) {
                    if let Some(base_ctx) = ctx_set.get(&base_dict_id) {
                        let mut aliased = Ctx::new(dict_id, 0, base_ctx.ltype, base_ctx.flags);
                        aliased.dict = base_ctx.dict.clone();
                        aliased.nodes = base_ctx.nodes.clone();
                        ctx_set.insert(dict_id, aliased);
                    }
                }
            }

            format.piz_reconstruct_vb(&mut ctx_set, line_count, &mut out)?;
        }
    }

    Ok(out)
}

/// Decompress only the lines intersecting `region` (`--regions`, §4.11).
/// Requires a format with a [`Format::primary_dict_id`] (VCF, SAM,
/// 23andMe); formats with no chromosome/position notion are refused.
///
/// The random-access index first narrows candidate vblocks down to the
/// ones whose recorded `(chrom, range)` could intersect the request,
/// skipping reconstruction of every other vblock entirely (§4.11's whole
/// point); each surviving vblock's lines are then checked individually
/// against the exact window via [`Format::primary_line_position`], since
/// the index's per-vblock range is necessarily coarser than per-line.
pub fn decompress_region(bytes: &[u8], region: &Region) -> anyhow::Result<Vec<u8>> {
    if bytes.len() < 8 {
        anyhow::bail!("file too small to be a gtz container");
    }
    let footer = u64::from_le_bytes(bytes[bytes.len() - 8..].try_into().unwrap());
    let mut codec_cache = HashMap::new();
    let list_section = read_section(bytes, footer, &mut codec_cache)?;
    let entries = parse_section_list(&list_section.payload)?;

    let header_entry = entries
        .iter()
        .find(|e| e.section_type == SectionType::ContainerHeader)
        .ok_or_else(|| anyhow::anyhow!("container missing CONTAINER_HEADER entry"))?;
    let header_section = read_section(bytes, header_entry.offset, &mut codec_cache)?;
    let mut header_buf = [0u8; gtz_core::header::HEADER_SIZE];
    header_buf.copy_from_slice(&header_section.payload[..gtz_core::header::HEADER_SIZE]);
    let container_header = ContainerHeader::from_bytes(&header_buf)?;
    let format = format_for(container_header.data_type);
    let primary_dict_id = format.primary_dict_id().ok_or_else(|| {
        anyhow::anyhow!(
            "{:?} has no chromosome/contig context to filter --regions against",
            container_header.data_type
        )
    })?;

    let mut txt_infos: Vec<TxtHeaderInfo> = Vec::new();
    for entry in entries.iter().filter(|e| e.section_type == SectionType::TxtHeader) {
        let section = read_section(bytes, entry.offset, &mut codec_cache)?;
        txt_infos.push(TxtHeaderInfo::from_bytes(&section.payload)?);
    }
    if txt_infos.is_empty() {
        anyhow::bail!("container missing TXT_HEADER entry");
    }

    let mut dicts: HashMap<DictId, (Vec<u8>, LType, CtxFlags)> = HashMap::new();
    for entry in entries.iter().filter(|e| e.section_type == SectionType::Dict) {
        let section = read_section(bytes, entry.offset, &mut codec_cache)?;
        let flags = decode_flags(section.payload[0]);
        let dict_bytes = section.payload[1..].to_vec();
        let ltype = section.header.ltype.expect("DICT section always carries an ltype");
        dicts.insert(entry.dict_id, (dict_bytes, ltype, flags));
    }

    let random_access = match entries.iter().find(|e| e.section_type == SectionType::RandomAccess) {
        Some(entry) => RandomAccessIndex::from_bytes(&read_section(bytes, entry.offset, &mut codec_cache)?.payload)?,
        None => RandomAccessIndex::new(),
    };

    let chrom_word_index = dicts.get(&primary_dict_id).and_then(|(dict_bytes, _, _)| {
        parse_dict(dict_bytes)
            .into_iter()
            .position(|(offset, len)| &dict_bytes[offset as usize..(offset + len) as usize] == region.chrom.as_bytes())
            .map(|i| i as u32)
    });
    let Some(chrom_word_index) = chrom_word_index else {
        // chromosome never appears in this file: nothing can match.
        return Ok(Vec::new());
    };
    let wanted = random_access.intersecting_vblocks(chrom_word_index, region.start, region.end);

    let mut vblock_is: Vec<u32> = entries
        .iter()
        .filter(|e| e.section_type == SectionType::VbHeader)
        .map(|e| e.vblock_i)
        .collect();
    vblock_is.sort_unstable();
    let mut remaining_vblocks = vblock_is.into_iter();

    let mut out = Vec::new();
    for txt_info in &txt_infos {
        for _ in 0..txt_info.vblock_count {
            let vblock_i = remaining_vblocks
                .next()
                .ok_or_else(|| anyhow::anyhow!("TXT_HEADER vblock_count exceeds available vblocks"))?;
            if !wanted.contains(&vblock_i) {
                continue;
            }
            let vb_entry = entries
                .iter()
                .find(|e| e.section_type == SectionType::VbHeader && e.vblock_i == vblock_i)
                .unwrap();
            let vb_section = read_section(bytes, vb_entry.offset, &mut codec_cache)?;
            let line_count = u64::from_le_bytes(vb_section.payload[..8].try_into().unwrap());

            let mut ctx_set: ContextSet = HashMap::new();
            for (&dict_id, (dict_bytes, ltype, flags)) in &dicts {
                let mut ctx = Ctx::new(dict_id, 0, *ltype, *flags);
                ctx.dict = dict_bytes.clone();
                let node_spans = parse_dict(dict_bytes);
                ctx.nodes = node_spans
                    .into_iter()
                    .map(|(offset, len)| gtz_core::context::Node { offset, len })
                    .collect();
                ctx_set.insert(dict_id, ctx);
            }
            for entry in entries
                .iter()
                .filter(|e| e.vblock_i == vblock_i && matches!(e.section_type, SectionType::B250 | SectionType::Local))
            {
                let section = read_section(bytes, entry.offset, &mut codec_cache)?;
                let ctx = ctx_set
                    .get_mut(&entry.dict_id)
                    .ok_or_else(|| anyhow::anyhow!("B250/LOCAL section references unknown dict_id {:?}", entry.dict_id))?;
                match entry.section_type {
                    SectionType::B250 => ctx.b250 = section.payload,
                    SectionType::Local => ctx.local = section.payload,
                    _ => unreachable!(),
                }
            }

            let mut vb_out = Vec::new();
            format.piz_reconstruct_vb(&mut ctx_set, line_count, &mut vb_out)?;
            for raw in vb_out.split_inclusive(|&b| b == b'\n') {
                let line = raw.strip_suffix(b"\n").unwrap_or(raw);
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                if line.is_empty() {
                    continue;
                }
                if let Some((chrom, pos)) = format.primary_line_position(line) {
                    if chrom == region.chrom.as_bytes() && pos >= region.start && pos <= region.end {
                        out.extend_from_slice(raw);
                    }
                }
            }
        }
    }

    Ok(out)
}

/// Decompress a FASTA container, keeping only the records whose header
/// line contains `pattern` (`--grep`, §4.11) — a plain substring match on
/// the header, the same semantics as genozip's own `--grep` default rather
/// than a full regex engine.
pub fn decompress_grep(bytes: &[u8], pattern: &str) -> anyhow::Result<Vec<u8>> {
    let whole = decompress(bytes)?;
    let mut out = Vec::new();
    let mut keep = false;
    for raw in whole.split_inclusive(|&b| b == b'\n') {
        let line = raw.strip_suffix(b"\n").unwrap_or(raw);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.starts_with(b">") {
            keep = std::str::from_utf8(line).map(|s| s.contains(pattern)).unwrap_or(false);
        }
        if keep {
            out.extend_from_slice(raw);
        }
    }
    Ok(out)
}

/// Decompress a multi-component container, returning each component's
/// plaintext separately rather than concatenated (the counterpart to
/// [`compress_components`]).
pub fn decompress_components(bytes: &[u8]) -> anyhow::Result<Vec<Vec<u8>>> {
    let whole = decompress(bytes)?;
    let header_entry_offset = {
        let footer = u64::from_le_bytes(bytes[bytes.len() - 8..].try_into().unwrap());
        let mut codec_cache = HashMap::new();
        let list_section = read_section(bytes, footer, &mut codec_cache)?;
        let entries = parse_section_list(&list_section.payload)?;
        entries
            .iter()
            .find(|e| e.section_type == SectionType::ContainerHeader)
            .map(|e| e.offset)
            .ok_or_else(|| anyhow::anyhow!("container missing CONTAINER_HEADER entry"))?
    };
    let mut codec_cache = HashMap::new();
    let header_section = read_section(bytes, header_entry_offset, &mut codec_cache)?;
    let mut header_buf = [0u8; gtz_core::header::HEADER_SIZE];
    header_buf.copy_from_slice(&header_section.payload[..gtz_core::header::HEADER_SIZE]);
    let container_header = ContainerHeader::from_bytes(&header_buf)?;

    if container_header.component_count <= 1 {
        return Ok(vec![whole]);
    }

    // Re-derive component boundaries from each TXT_HEADER's recorded
    // plaintext_size, walking the single concatenated buffer `decompress`
    // already produced in file order.
    let footer = u64::from_le_bytes(bytes[bytes.len() - 8..].try_into().unwrap());
    let list_section = read_section(bytes, footer, &mut codec_cache)?;
    let entries = parse_section_list(&list_section.payload)?;
    let mut sizes = Vec::new();
    for entry in entries.iter().filter(|e| e.section_type == SectionType::TxtHeader) {
        let section = read_section(bytes, entry.offset, &mut codec_cache)?;
        let info = TxtHeaderInfo::from_bytes(&section.payload)?;
        sizes.push(info.plaintext_size as usize);
    }

    let mut parts = Vec::with_capacity(sizes.len());
    let mut pos = 0usize;
    for size in sizes {
        parts.push(whole[pos..pos + size].to_vec());
        pos += size;
    }
    Ok(parts)
}

fn parse_section_list(payload: &[u8]) -> anyhow::Result<Vec<SectionListEntry>> {
    if payload.len() < 4 {
        anyhow::bail!("SECTION_LIST payload truncated");
    }
    let count = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
    let mut entries = Vec::with_capacity(count);
    let mut pos = 4;
    for _ in 0..count {
        if pos + SectionListEntry::SIZE > payload.len() {
            anyhow::bail!("SECTION_LIST payload truncated mid-entry");
        }
        let mut raw = [0u8; SectionListEntry::SIZE];
        raw.copy_from_slice(&payload[pos..pos + SectionListEntry::SIZE]);
        entries.push(SectionListEntry::from_bytes(&raw)?);
        pos += SectionListEntry::SIZE;
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vcf_roundtrips_through_compress_and_decompress() {
        let input = b"##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t100\t.\tA\tG\t50\tPASS\tDP=10;AF=0.5\n\
chr1\t150\t.\tC\tT\t60\tPASS\tDP=12\n\
chr2\t200\t.\tG\tA\t70\tPASS\tDP=9;AF=0.1\n"
            .to_vec();

        let mut buf = Vec::new();
        compress(&input, DataType::Vcf, CodecId::None, None, &mut buf).unwrap();
        let restored = decompress(&buf).unwrap();
        assert_eq!(restored, input);
    }

    #[test]
    fn me23_roundtrips_through_compress_and_decompress() {
        let input = b"# rsid\tchromosome\tposition\tgenotype\n\
rs123\t1\t100\tAA\n\
rs124\t1\t200\tAG\n"
            .to_vec();

        let mut buf = Vec::new();
        compress(&input, DataType::TwentyThreeAndMe, CodecId::None, None, &mut buf).unwrap();
        let restored = decompress(&buf).unwrap();
        assert_eq!(restored, input);
    }

    #[test]
    fn fastq_roundtrips_across_multiple_vblocks() {
        let mut input = Vec::new();
        for i in 0..4 {
            input.extend_from_slice(format!("@read{i}\n").as_bytes());
            input.extend_from_slice(b"ACGTACGT\n");
            input.extend_from_slice(b"+\n");
            input.extend_from_slice(b"IIIIIIII\n");
        }

        let mut buf = Vec::new();
        compress(&input, DataType::Fastq, CodecId::None, Some(4), &mut buf).unwrap();
        let restored = decompress(&buf).unwrap();
        assert_eq!(restored, input);
    }

    #[test]
    fn multi_component_fastq_roundtrips_and_splits_back_apart() {
        let r1 = b"@r1\nACGTACGT\n+\nIIIIIIII\n".to_vec();
        let r2 = b"@r2\nTTTTAAAA\n+\nJJJJJJJJ\n".to_vec();

        let mut buf = Vec::new();
        compress_components(&[&r1, &r2], DataType::Fastq, CodecId::None, Some(4), &mut buf).unwrap();

        let whole = decompress(&buf).unwrap();
        let mut expected = r1.clone();
        expected.extend_from_slice(&r2);
        assert_eq!(whole, expected);

        let parts = decompress_components(&buf).unwrap();
        assert_eq!(parts, vec![r1, r2]);
    }

    #[test]
    fn fastq_roundtrips_with_crlf_line_endings() {
        let mut input = Vec::new();
        for i in 0..3 {
            input.extend_from_slice(format!("@read{i}\r\n").as_bytes());
            input.extend_from_slice(b"ACGTACGT\r\n");
            input.extend_from_slice(b"+\r\n");
            input.extend_from_slice(b"IIIIIIII\r\n");
        }

        let mut buf = Vec::new();
        compress(&input, DataType::Fastq, CodecId::None, None, &mut buf).unwrap();
        let restored = decompress(&buf).unwrap();
        assert_eq!(restored, input);
    }

    #[test]
    fn sam_roundtrips_through_compress_and_decompress() {
        let input = b"@HD\tVN:1.6\tSO:coordinate\n\
read1\t0\tchr1\t100\t60\t8M\t=\t150\t58\tACGTACGT\tIIIIIIII\n\
read2\t0\tchr1\t150\t60\t8M\t=\t100\t-58\tTTTTAAAA\tJJJJJJJJ\n\
read3\t16\tchr2\t300\t60\t8M\t*\t0\t0\tGGGGCCCC\tKKKKKKKK\tNM:i:0\n"
            .to_vec();

        let mut buf = Vec::new();
        compress(&input, DataType::Sam, CodecId::None, None, &mut buf).unwrap();
        let restored = decompress(&buf).unwrap();
        assert_eq!(restored, input);
    }

    #[test]
    fn fasta_roundtrips_through_compress_and_decompress() {
        let input = b">seq1 description\n\
ACGTACGTACGT\n\
ACGTACGT\n\
>seq2\n\
TTTTGGGGCCCC\n"
            .to_vec();

        let mut buf = Vec::new();
        compress(&input, DataType::Fasta, CodecId::None, None, &mut buf).unwrap();
        let restored = decompress(&buf).unwrap();
        assert_eq!(restored, input);
    }

    #[test]
    fn gff3_roundtrips_through_compress_and_decompress() {
        let input = b"##gff-version 3\n\
chr1\t.\tgene\t1000\t2000\t.\t+\t.\tID=gene1;Name=foo\n\
chr1\t.\tmRNA\t1000\t2000\t.\t+\t.\tID=mrna1;Parent=gene1\n\
chr2\t.\texon\t500\t600\t.\t-\t0\tID=exon1;Parent=mrna1\n"
            .to_vec();

        let mut buf = Vec::new();
        compress(&input, DataType::Gff3, CodecId::None, None, &mut buf).unwrap();
        let restored = decompress(&buf).unwrap();
        assert_eq!(restored, input);
    }
}
