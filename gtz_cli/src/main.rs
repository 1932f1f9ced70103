use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use md5::{Digest, Md5};

use gtz_core::codec::CodecId;
use gtz_core::error::GtzError;
use gtz_core::header::{ContainerHeader, DataType, TxtHeaderInfo};
use gtz_core::random_access::{RandomAccessIndex, Region};
use gtz_core::section::{SectionHeader, SectionListEntry, SectionType, SECTION_HEADER_SIZE};

#[derive(Parser)]
#[command(
    name = "gtz",
    about = "Columnar genomic text compressor — compress, decompress, and inspect gtz containers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress one or more text files into a gtz container. Multiple
    /// inputs are concatenated as separate components of one container
    /// (e.g. paired-end FASTQ R1/R2) sharing dictionaries and the
    /// random-access index.
    Compress {
        /// Source file(s) to compress. A single "-" reads stdin.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Destination container file
        #[arg(short, long)]
        output: PathBuf,
        /// Data type: vcf | sam | fastq | fasta | gff3 | 23andme (default:
        /// inferred from the input's extension)
        #[arg(long)]
        data_type: Option<String>,
        /// Codec: none | bzip2 | lzma | bsc
        #[arg(short, long, default_value = "bzip2")]
        codec: String,
        /// Lines per vblock (default: 50000, rounded down for FASTQ's 4-line records)
        #[arg(long)]
        vblock: Option<usize>,
        /// Number of worker threads (default: rayon's automatic choice)
        #[arg(long)]
        threads: Option<usize>,
        /// Print the whole-file MD5 after compressing
        #[arg(long)]
        md5: bool,
        /// Decompress immediately after compressing and verify byte-for-byte equality
        #[arg(long)]
        test: bool,
    },
    /// Decompress a gtz container back to the original text
    Decompress {
        /// Source container file
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
        /// Verify the reconstructed MD5 against the one recorded at compress time
        #[arg(long)]
        md5: bool,
        /// Only output lines intersecting "chrom:start-end" (VCF/SAM/23andMe
        /// only; mutually exclusive with --grep)
        #[arg(long)]
        regions: Option<String>,
        /// Only output FASTA records whose header line contains this
        /// substring (FASTA only; mutually exclusive with --regions)
        #[arg(long)]
        grep: Option<String>,
    },
    /// Print a container's component inventory: header, dictionaries,
    /// vblocks, and random-access ranges
    List {
        /// Container file to inspect
        file: PathBuf,
    },
}

fn data_type_from_flag(name: &str) -> anyhow::Result<DataType> {
    Ok(match name.to_ascii_lowercase().as_str() {
        "vcf" => DataType::Vcf,
        "sam" => DataType::Sam,
        "fastq" | "fq" => DataType::Fastq,
        "fasta" | "fa" => DataType::Fasta,
        "gff3" | "gff" => DataType::Gff3,
        "23andme" | "me23" => DataType::TwentyThreeAndMe,
        other => {
            return Err(GtzError::Configuration(format!(
                "unknown --data-type '{other}'. Valid options: vcf, sam, fastq, fasta, gff3, 23andme"
            ))
            .into())
        }
    })
}

fn data_type_from_extension(path: &PathBuf) -> anyhow::Result<DataType> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    Ok(match ext.as_str() {
        "vcf" => DataType::Vcf,
        "sam" => DataType::Sam,
        "fastq" | "fq" => DataType::Fastq,
        "fasta" | "fa" | "fna" => DataType::Fasta,
        "gff3" | "gff" => DataType::Gff3,
        "txt" | "csv" => DataType::TwentyThreeAndMe,
        other => {
            return Err(GtzError::Configuration(format!(
                "cannot infer data type from extension '.{other}'; pass --data-type explicitly"
            ))
            .into())
        }
    })
}

fn codec_from_name(name: &str) -> anyhow::Result<CodecId> {
    Ok(match name.to_ascii_lowercase().as_str() {
        "none" => CodecId::None,
        "bzip2" | "bz2" => CodecId::Bzip2,
        "lzma" | "xz" => CodecId::Lzma,
        "bsc" => CodecId::Bsc,
        other => {
            return Err(
                GtzError::Configuration(format!("unknown --codec '{other}'. Valid options: none, bzip2, lzma, bsc")).into(),
            )
        }
    })
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{v:.2} {}", UNITS[unit])
    }
}

fn md5_digest(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn read_input(input: &PathBuf) -> anyhow::Result<Vec<u8>> {
    if input.to_str() == Some("-") {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read(input).with_context(|| format!("reading input file {input:?}"))
    }
}

fn run_compress(
    inputs: Vec<PathBuf>,
    output: PathBuf,
    data_type_flag: Option<String>,
    codec_name: &str,
    vblock: Option<usize>,
    threads: Option<usize>,
    print_md5: bool,
    test: bool,
) -> anyhow::Result<()> {
    if let Some(n) = threads {
        // Best-effort: ignore if a global pool was already built.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    }

    let data_type = match data_type_flag {
        Some(name) => data_type_from_flag(&name)?,
        None => data_type_from_extension(&inputs[0])?,
    };
    let codec_id = codec_from_name(codec_name)?;

    let texts: Vec<Vec<u8>> = inputs.iter().map(read_input).collect::<anyhow::Result<_>>()?;
    let raw_size: u64 = texts.iter().map(|t| t.len() as u64).sum();
    let refs: Vec<&[u8]> = texts.iter().map(|t| t.as_slice()).collect();

    let t0 = Instant::now();
    let mut bytes = Vec::new();
    gtz_engine::compress_components(&refs, data_type, codec_id, vblock, &mut bytes)?;
    let elapsed = t0.elapsed();

    std::fs::write(&output, &bytes).with_context(|| format!("writing output file {output:?}"))?;
    let compressed_size = bytes.len() as u64;

    eprintln!("  data type   : {data_type:?}");
    eprintln!("  codec       : {codec_name}");
    eprintln!("  components  : {}", texts.len());
    eprintln!("  raw size    : {}", human_bytes(raw_size));
    eprintln!("  compressed  : {}", human_bytes(compressed_size));
    eprintln!("  ratio       : {:.2}x", raw_size as f64 / compressed_size.max(1) as f64);
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());

    if print_md5 {
        let mut acc = gtz_engine::md5::Md5Accumulator::new();
        for text in &texts {
            acc.update(text);
        }
        eprintln!("  md5         : {}", hex_encode(&acc.finalize()));
    }

    if test {
        let restored = gtz_engine::decompress(&bytes)?;
        let whole: Vec<u8> = texts.iter().flat_map(|t| t.iter().copied()).collect();
        if restored == whole {
            eprintln!("  test        : OK (round-trip byte-identical)");
        } else {
            return Err(GtzError::Integrity(
                "round-trip verification failed: decompressed output does not match input".to_string(),
            )
            .into());
        }
    }

    Ok(())
}

fn run_decompress(
    input: PathBuf,
    output: PathBuf,
    verify_md5: bool,
    regions: Option<String>,
    grep: Option<String>,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(&input).with_context(|| format!("reading container {input:?}"))?;
    if regions.is_some() && grep.is_some() {
        return Err(GtzError::Configuration("--regions and --grep are mutually exclusive".to_string()).into());
    }

    let t0 = Instant::now();
    let text = match (&regions, &grep) {
        (Some(spec), None) => gtz_engine::decompress_region(&bytes, &Region::parse(spec)?)?,
        (None, Some(pattern)) => gtz_engine::decompress_grep(&bytes, pattern)?,
        _ => gtz_engine::decompress(&bytes)?,
    };
    let elapsed = t0.elapsed();

    if verify_md5 {
        if regions.is_some() || grep.is_some() {
            return Err(GtzError::Configuration("--md5 verifies the whole-file digest; it cannot be combined with --regions/--grep".to_string()).into());
        }
        let (_, header) = read_container_header(&bytes)?;
        let actual = md5_digest(&text);
        if actual == header.whole_concat_md5 {
            eprintln!("  md5         : OK (matches recorded digest)");
        } else {
            return Err(GtzError::Integrity(
                "md5 mismatch: reconstructed output does not match the digest recorded at compress time".to_string(),
            )
            .into());
        }
    }

    if output.to_str() == Some("-") {
        io::stdout().write_all(&text)?;
    } else {
        std::fs::write(&output, &text).with_context(|| format!("writing output file {output:?}"))?;
    }

    eprintln!("  raw size    : {}", human_bytes(text.len() as u64));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

/// Parse just enough of a container (footer → section list → container
/// header) to answer `list` and `--md5` without reconstructing any text.
fn read_container_header(bytes: &[u8]) -> anyhow::Result<(Vec<SectionListEntry>, ContainerHeader)> {
    if bytes.len() < 8 {
        anyhow::bail!("file too small to be a gtz container");
    }
    let footer = u64::from_le_bytes(bytes[bytes.len() - 8..].try_into().unwrap());
    let list_section = decode_section(bytes, footer)?;
    let entries = parse_section_list(&list_section)?;

    let header_entry = entries
        .iter()
        .find(|e| e.section_type == SectionType::ContainerHeader)
        .ok_or_else(|| anyhow::anyhow!("container missing CONTAINER_HEADER entry"))?;
    let header_bytes = decode_section(bytes, header_entry.offset)?;
    let mut buf = [0u8; gtz_core::header::HEADER_SIZE];
    buf.copy_from_slice(&header_bytes[..gtz_core::header::HEADER_SIZE]);
    let header = ContainerHeader::from_bytes(&buf)?;
    Ok((entries, header))
}

fn decode_section(bytes: &[u8], offset: u64) -> anyhow::Result<Vec<u8>> {
    let start = offset as usize;
    let mut raw = [0u8; SECTION_HEADER_SIZE];
    raw.copy_from_slice(&bytes[start..start + SECTION_HEADER_SIZE]);
    let header = SectionHeader::from_bytes(&raw)?;
    let payload_start = start + SECTION_HEADER_SIZE;
    let payload_end = payload_start + header.compressed_size as usize;
    let codec = gtz_codecs::codec_by_id(header.codec);
    codec.decompress(&bytes[payload_start..payload_end], header.uncompressed_size as usize)
}

fn parse_section_list(payload: &[u8]) -> anyhow::Result<Vec<SectionListEntry>> {
    let count = u32::from_le_bytes(payload[0..4].try_into()?) as usize;
    let mut entries = Vec::with_capacity(count);
    let mut pos = 4;
    for _ in 0..count {
        let mut raw = [0u8; SectionListEntry::SIZE];
        raw.copy_from_slice(&payload[pos..pos + SectionListEntry::SIZE]);
        entries.push(SectionListEntry::from_bytes(&raw)?);
        pos += SectionListEntry::SIZE;
    }
    Ok(entries)
}

fn run_list(file: PathBuf) -> anyhow::Result<()> {
    let bytes = std::fs::read(&file).with_context(|| format!("reading container {file:?}"))?;
    let (entries, header) = read_container_header(&bytes)?;

    let txt_infos: Vec<TxtHeaderInfo> = entries
        .iter()
        .filter(|e| e.section_type == SectionType::TxtHeader)
        .map(|e| decode_section(&bytes, e.offset).and_then(|b| TxtHeaderInfo::from_bytes(&b)))
        .collect::<anyhow::Result<_>>()?;
    if txt_infos.is_empty() {
        anyhow::bail!("container missing TXT_HEADER entry");
    }
    let banner_bytes: usize = txt_infos.iter().map(|t| t.banner.len()).sum();

    let ra_entry = entries.iter().find(|e| e.section_type == SectionType::RandomAccess);
    let random_access = match ra_entry {
        Some(e) => RandomAccessIndex::from_bytes(&decode_section(&bytes, e.offset)?)?,
        None => RandomAccessIndex::new(),
    };

    let mut vblock_is: Vec<u32> = entries
        .iter()
        .filter(|e| e.section_type == SectionType::VbHeader)
        .map(|e| e.vblock_i)
        .collect();
    vblock_is.sort_unstable();

    let dict_count = entries.iter().filter(|e| e.section_type == SectionType::Dict).count();

    println!("=== gtz container: {file:?} ===");
    println!();
    println!("  format version  : {}", header.format_version);
    println!("  data type       : {:?}", header.data_type);
    println!("  components      : {}", header.component_count);
    println!("  plaintext size  : {}", human_bytes(header.total_plaintext_size));
    println!("  line count      : {}", header.total_line_count);
    println!("  whole MD5       : {}", hex_encode(&header.whole_concat_md5));
    println!("  created         : unix {}", header.created_unix_time);
    println!();
    println!("  banner bytes    : {banner_bytes}");
    println!("  vblocks         : {}", vblock_is.len());
    println!("  dictionaries    : {dict_count}");
    println!("  random-access   : {} chromosome runs", random_access.entries().len());

    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Compress {
            inputs,
            output,
            data_type,
            codec,
            vblock,
            threads,
            md5,
            test,
        } => run_compress(inputs, output, data_type, &codec, vblock, threads, md5, test),
        Commands::Decompress {
            input,
            output,
            md5,
            regions,
            grep,
        } => run_decompress(input, output, md5, regions, grep),
        Commands::List { file } => run_list(file),
    }
}

/// Top-level entry point (§7): `GtzError`'s kind selects the process exit
/// code; any other error (I/O context, clap parsing) falls back to 1.
fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        let code = err.downcast_ref::<GtzError>().map(GtzError::exit_code).unwrap_or(1);
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_from_flag_accepts_known_aliases() {
        assert_eq!(data_type_from_flag("vcf").unwrap(), DataType::Vcf);
        assert_eq!(data_type_from_flag("23andme").unwrap(), DataType::TwentyThreeAndMe);
        assert!(data_type_from_flag("bogus").is_err());
    }

    #[test]
    fn codec_from_name_accepts_known_aliases() {
        assert_eq!(codec_from_name("bz2").unwrap(), CodecId::Bzip2);
        assert_eq!(codec_from_name("xz").unwrap(), CodecId::Lzma);
        assert!(codec_from_name("gzip").is_err());
    }

    #[test]
    fn human_bytes_scales_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.00 KB");
    }
}
