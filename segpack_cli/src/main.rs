use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;

use segpack_codecs::{detect_encoding, encoding_by_name, encoding_with_level};
use segpack_core::format::DEFAULT_DATA_KEY;
use segpack_core::{
    chunk_bounds, decode_block_at, read_block_headers, read_raw_volume, write_raw_volume, VolumeInfo,
    VolumeReader, VolumeWriter, VoxelType, WriterOptions,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "segpack",
    about = "Compressed-segmentation volumes: encode label volumes into chunk files, decode and inspect them",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a raw label volume into a chunked compressed-segmentation directory
    Encode {
        /// Raw voxel file, little-endian, z/y/x order
        input: PathBuf,
        /// Destination directory (receives `info` and the chunk files)
        output: PathBuf,
        /// Volume shape as Z,Y,X
        #[arg(long, value_parser = parse_shape)]
        shape: [usize; 3],
        /// Voxel type of the input file: u8 | u16 | u32
        #[arg(long, default_value = "u32")]
        dtype: String,
        /// Chunk shape, one value for a cube or Z,Y,X
        #[arg(short, long, value_parser = parse_shape, default_value = "64")]
        chunk_size: [usize; 3],
        /// Block shape, one value for a cube or Z,Y,X
        #[arg(short, long, value_parser = parse_shape, default_value = "8")]
        block_size: [usize; 3],
        /// Voxel size, one value or Z,Y,X
        #[arg(short, long, value_parser = parse_resolution, default_value = "1")]
        resolution: [f64; 3],
        /// Name of the chunk directory inside the output
        #[arg(long, default_value = DEFAULT_DATA_KEY)]
        key: String,
        /// Replace every non-zero label with this value (binary mask output)
        #[arg(long)]
        convert_non_zero_to: Option<u32>,
        /// Chunk file encoding: raw | gzip
        #[arg(short, long, default_value = "raw")]
        encoding: String,
        /// Gzip level (0–9, only used with --encoding gzip)
        #[arg(long, default_value_t = 6)]
        gzip_level: u32,
        /// Remove the output directory first if it exists
        #[arg(long)]
        overwrite: bool,
    },
    /// Decode a compressed-segmentation directory back to a raw u32 volume
    Decode {
        /// Directory written by `encode`
        input: PathBuf,
        /// Destination raw file (little-endian u32, z/y/x order)
        output: PathBuf,
        /// Chunk file encoding: raw | gzip (default: detect)
        #[arg(short, long)]
        encoding: Option<String>,
    },
    /// Print chunk header and block statistics for one chunk file
    Inspect {
        /// Chunk file
        file: PathBuf,
        /// Chunk shape as Z,Y,X
        #[arg(long, value_parser = parse_shape)]
        shape: [usize; 3],
        /// Block shape, one value for a cube or Z,Y,X
        #[arg(short, long, value_parser = parse_shape, default_value = "8")]
        block_size: [usize; 3],
        /// Print per-block headers
        #[arg(long)]
        blocks: bool,
    },
    /// Decode a single block of one chunk file
    ///
    /// Only the addressed block is decoded; the rest of the chunk is not
    /// touched.
    ReadBlock {
        /// Chunk file
        file: PathBuf,
        /// Chunk shape as Z,Y,X
        #[arg(long, value_parser = parse_shape)]
        shape: [usize; 3],
        /// Block shape, one value for a cube or Z,Y,X
        #[arg(short, long, value_parser = parse_shape, default_value = "8")]
        block_size: [usize; 3],
        /// Grid cell of the block as Z,Y,X
        #[arg(long, value_parser = parse_shape)]
        cell: [usize; 3],
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn parse_triple<T: std::str::FromStr + Copy>(s: &str) -> Result<[T; 3], String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<T>().map_err(|_| format!("invalid value '{}'", p)))
        .collect::<Result<Vec<T>, String>>()?;
    match parts.as_slice() {
        [v] => Ok([*v; 3]),
        [z, y, x] => Ok([*z, *y, *x]),
        _ => Err(format!("expected one value or Z,Y,X but got '{}'", s)),
    }
}

fn parse_shape(s: &str) -> Result<[usize; 3], String> {
    parse_triple(s)
}

fn parse_resolution(s: &str) -> Result<[f64; 3], String> {
    let resolution: [f64; 3] = parse_triple(s)?;
    if resolution.iter().any(|&r| r <= 0.0) {
        return Err("resolution components must be > 0".to_string());
    }
    Ok(resolution)
}

fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    match bytes {
        0..=1023 => format!("{} B", bytes),
        1024..=1_048_575 => format!("{:.1} KiB", b / KIB),
        1_048_576..=1_073_741_823 => format!("{:.1} MiB", b / (KIB * KIB)),
        _ => format!("{:.2} GiB", b / (KIB * KIB * KIB)),
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_encode(
    input: PathBuf,
    output: PathBuf,
    shape: [usize; 3],
    dtype: &str,
    options: WriterOptions,
    encoding_name: &str,
    gzip_level: u32,
) -> anyhow::Result<()> {
    let voxel_type = VoxelType::from_name(dtype)?;
    let encoding = encoding_with_level(encoding_name, gzip_level)?;
    let encoding_display = encoding.name();

    let t0 = Instant::now();
    let volume = read_raw_volume(&input, shape, voxel_type)
        .with_context(|| format!("reading raw volume {:?}", input))?;
    info!("loaded {:?} volume from {:?}", shape, input);

    let writer = VolumeWriter::create(&output, options.clone(), encoding)
        .with_context(|| format!("creating output directory {:?}", output))?;
    let summary = writer.write_volume(volume.view())?;
    let elapsed = t0.elapsed();

    let ratio = summary.raw_bytes as f64 / summary.stored_bytes.max(1) as f64;
    eprintln!("  encoding    : {}", encoding_display);
    eprintln!("  chunk size  : {:?}", options.chunk_shape);
    eprintln!("  block size  : {:?}", options.block_shape);
    eprintln!("  chunks      : {}", summary.chunks);
    eprintln!("  raw size    : {}", format_size(summary.raw_bytes));
    eprintln!("  stored      : {}", format_size(summary.stored_bytes));
    eprintln!("  ratio       : {:.2}x", ratio);
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decode(input: PathBuf, output: PathBuf, encoding: Option<String>) -> anyhow::Result<()> {
    let encoding = match encoding {
        Some(name) => encoding_by_name(&name)?,
        None => {
            // Sniff the first chunk file; all chunks of a volume share an encoding.
            let info = VolumeInfo::read(&input).with_context(|| format!("reading info of {:?}", input))?;
            match chunk_bounds(info.volume_shape()?, info.chunk_shape()?)?.first() {
                Some(bounds) => {
                    let path = input.join(&info.scale()?.key).join(bounds.file_name());
                    let stored = fs::read(&path).with_context(|| format!("reading chunk {:?}", path))?;
                    detect_encoding(&stored)
                }
                None => encoding_by_name("raw")?,
            }
        }
    };

    let t0 = Instant::now();
    let reader = VolumeReader::open(&input, encoding.clone())
        .with_context(|| format!("opening volume {:?}", input))?;
    let volume = reader.read_volume()?;
    write_raw_volume(&output, &volume).with_context(|| format!("writing raw volume {:?}", output))?;
    let elapsed = t0.elapsed();

    eprintln!("  encoding    : {}", encoding.name());
    eprintln!("  shape       : {:?}", reader.volume_shape());
    eprintln!("  raw size    : {}", format_size((volume.len() * 4) as u64));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn read_chunk_file(file: &Path) -> anyhow::Result<Vec<u8>> {
    let stored = fs::read(file).with_context(|| format!("reading chunk file {:?}", file))?;
    Ok(detect_encoding(&stored).decode(&stored)?)
}

fn run_inspect(file: PathBuf, shape: [usize; 3], block_size: [usize; 3], show_blocks: bool) -> anyhow::Result<()> {
    let buffer = read_chunk_file(&file)?;
    let headers = read_block_headers(&buffer, shape, block_size)?;

    let mut bits_histogram: BTreeMap<u32, usize> = BTreeMap::new();
    let mut tables: BTreeMap<u32, usize> = BTreeMap::new();
    for (_, header) in &headers {
        *bits_histogram.entry(header.encoded_bits).or_default() += 1;
        *tables.entry(header.lookup_table_offset).or_default() += 1;
    }
    let shared = tables.values().filter(|&&users| users > 1).count();

    println!("=== Chunk: {:?} ===", file);
    println!();
    println!("  chunk shape    : {:?}", shape);
    println!("  block shape    : {:?}", block_size);
    println!("  blocks         : {}", headers.len());
    println!("  buffer size    : {}", format_size(buffer.len() as u64));
    println!("  lookup tables  : {} ({} shared by several blocks)", tables.len(), shared);
    println!("  encoded bits   :");
    for (bits, count) in &bits_histogram {
        println!("    {:>2} bits : {} block(s)", bits, count);
    }

    if show_blocks {
        println!();
        println!(
            "  {:>14}  {:>12}  {:>6}  {:>14}",
            "block (z,y,x)", "lookup off", "bits", "values off"
        );
        println!("  {}", "-".repeat(52));
        for (cell, header) in &headers {
            println!(
                "  {:>14}  {:>12}  {:>6}  {:>14}",
                format!("{},{},{}", cell[0], cell[1], cell[2]),
                header.lookup_table_offset,
                header.encoded_bits,
                header.encoded_values_offset
            );
        }
    }
    Ok(())
}

fn run_read_block(file: PathBuf, shape: [usize; 3], block_size: [usize; 3], cell: [usize; 3]) -> anyhow::Result<()> {
    let buffer = read_chunk_file(&file)?;

    let t0 = Instant::now();
    let block = decode_block_at(&buffer, shape, block_size, cell)?;
    let elapsed = t0.elapsed();

    eprintln!(
        "  decoded block {:?} ({:?} voxels) in {:.3}ms",
        cell,
        block.dim(),
        elapsed.as_secs_f64() * 1000.0
    );
    for (z, plane) in block.outer_iter().enumerate() {
        println!("--- z = {} ---", cell[0] * block_size[0] + z);
        for row in plane.rows() {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            println!("  {}", line.join(" "));
        }
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Encode {
            input,
            output,
            shape,
            dtype,
            chunk_size,
            block_size,
            resolution,
            key,
            convert_non_zero_to,
            encoding,
            gzip_level,
            overwrite,
        } => {
            let options = WriterOptions {
                chunk_shape: chunk_size,
                block_shape: block_size,
                resolution,
                key,
                convert_non_zero_to,
                overwrite,
            };
            run_encode(input, output, shape, &dtype, options, &encoding, gzip_level)
        }
        Commands::Decode {
            input,
            output,
            encoding,
        } => run_decode(input, output, encoding),
        Commands::Inspect {
            file,
            shape,
            block_size,
            blocks,
        } => run_inspect(file, shape, block_size, blocks),
        Commands::ReadBlock {
            file,
            shape,
            block_size,
            cell,
        } => run_read_block(file, shape, block_size, cell),
    }
}
