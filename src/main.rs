//! `mscompress` CLI entry point: wires the scanner, divider, dispatcher, and
//! block pipeline together into a single compress or decompress run.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use log::{info, warn};

use mscompress::cli::{Cli, Mode};
use mscompress::config::{FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR, MESSAGE};
use mscompress::container::{self, BlockMeta, DivisionPositions, Footer};
use mscompress::dispatch;
use mscompress::divider;
use mscompress::error::{Error, Result};
use mscompress::format::DataFormat;
use mscompress::pipeline;
use mscompress::scanner;
use mscompress::threadpool::TPool;
use mscompress::view::{InputView, MappedInput};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mscompress: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    match cli.mode {
        Mode::Compress => run_compress(cli),
        Mode::Decompress => run_decompress(cli),
    }
}

fn run_compress(cli: &Cli) -> Result<()> {
    let input = MappedInput::open(&cli.input)?;
    let bytes = input.as_bytes();

    let (mz_fmt, inten_fmt, source_compression, spectrum_count) = scanner::scan_metadata(bytes)?;
    info!("discovered {spectrum_count} spectra, mz={mz_fmt:?} inten={inten_fmt:?}");

    let (xml_pos, mz_pos, inten_pos) = scanner::scan_boundaries(bytes, spectrum_count)?;
    let (mz_pair, inten_pair) = dispatch::resolve(
        cli.resolved_mz_algorithm(),
        cli.resolved_inten_algorithm(),
        mz_fmt,
        inten_fmt,
    )?;

    let requested_threads = cli.resolved_threads();
    let partitioned = divider::partition(&xml_pos, &mz_pos, &inten_pos, cli.divisions, cli.blocksize, requested_threads)?;
    let divisions = partitioned.divisions;
    let threads = partitioned.threads;
    if threads < requested_threads {
        info!(
            "only {} division(s) could be formed; reducing thread count from {requested_threads} to {threads}",
            divisions.len()
        );
    }
    info!("split input into {} division(s) across {threads} thread(s)", divisions.len());

    let pool = TPool::new(threads, threads * 2)
        .ok_or_else(|| Error::ConfigError { detail: "failed to start thread pool".into() })?;
    let compressed = pipeline::compress_divisions(
        bytes,
        &divisions,
        mz_pair,
        inten_pair,
        source_compression,
        cli.compression_level,
        &pool,
    )?;
    drop(pool);

    // Each division's xml position list brackets exactly the division's
    // contiguous byte range in the original file (the scanner hands out
    // non-overlapping, gap-free ranges in spectrum order), so feeding them
    // to the hasher in division order reproduces the whole-file md5 without
    // ever holding a second full copy of `bytes` alongside the mapped input.
    let mut hasher = md5::Context::new();
    for division in &divisions {
        let (start, _) = division.xml.span(0);
        let (_, end) = division.xml.span(division.xml.len() - 1);
        hasher.consume(&bytes[start as usize..end as usize]);
    }
    let content_hash: [u8; 16] = *hasher.compute();

    let data_format = DataFormat {
        source_mz_fmt: mz_fmt,
        source_inten_fmt: inten_fmt,
        source_compression,
        mz_algo: mz_pair.algorithm,
        inten_algo: inten_pair.algorithm,
        spectrum_count,
    };

    let mut out = Vec::new();
    container::write_header(&mut out, content_hash)?;

    let xml_block_region_offset = out.len() as u64;
    for c in &compressed {
        out.extend_from_slice(&c.xml);
    }
    let mz_block_region_offset = out.len() as u64;
    for c in &compressed {
        out.extend_from_slice(&c.mz);
    }
    let inten_block_region_offset = out.len() as u64;
    for c in &compressed {
        out.extend_from_slice(&c.inten);
    }

    let block_length_tables_offset = out.len() as u64;
    let xml_metas: Vec<BlockMeta> = compressed.iter().map(|c| c.xml_meta).collect();
    let mz_metas: Vec<BlockMeta> = compressed.iter().map(|c| c.mz_meta).collect();
    let inten_metas: Vec<BlockMeta> = compressed.iter().map(|c| c.inten_meta).collect();
    container::write_block_length_tables(&mut out, &xml_metas, &mz_metas, &inten_metas)?;

    let position_tables_offset = out.len() as u64;
    let division_positions: Vec<DivisionPositions> = divisions
        .iter()
        .map(|d| DivisionPositions { xml: d.xml.clone(), mz: d.mz.clone(), inten: d.inten.clone() })
        .collect();
    container::write_position_tables(&mut out, &division_positions)?;

    let footer = Footer {
        version_major: FORMAT_VERSION_MAJOR,
        version_minor: FORMAT_VERSION_MINOR,
        xml_block_region_offset,
        mz_block_region_offset,
        inten_block_region_offset,
        block_length_tables_offset,
        position_tables_offset,
        division_count: divisions.len() as u32,
        data_format,
        message: MESSAGE.to_string(),
    };
    container::write_footer(&mut out, &footer)?;

    let output_path = cli.resolved_output();
    fs::write(&output_path, &out)?;
    info!(
        "wrote {} bytes to {} ({} -> {:.1}% of original)",
        out.len(),
        output_path.display(),
        bytes.len(),
        100.0 * out.len() as f64 / bytes.len().max(1) as f64
    );
    Ok(())
}

fn run_decompress(cli: &Cli) -> Result<()> {
    let input = MappedInput::open(&cli.input)?;
    let bytes = input.as_bytes();

    let header = container::parse_header(&bytes[..container::HEADER_LEN])?;
    let footer = container::parse_footer(bytes)?;
    let footer_start = container::footer_start(bytes)?;

    let tables_bytes = &bytes[footer.block_length_tables_offset as usize..footer.position_tables_offset as usize];
    let tables = container::read_block_length_tables(tables_bytes)?;

    let positions_bytes = &bytes[footer.position_tables_offset as usize..footer_start];
    let positions = container::read_position_tables(positions_bytes, footer.division_count as usize)?;

    let mz_pair = dispatch::dispatch(footer.data_format.mz_algo, footer.data_format.source_mz_fmt)?;
    let inten_pair = dispatch::dispatch(footer.data_format.inten_algo, footer.data_format.source_inten_fmt)?;

    let requested_threads = cli.resolved_threads();
    let threads = requested_threads.min(positions.len().max(1));
    let pool = TPool::new(threads, threads * 2)
        .ok_or_else(|| Error::ConfigError { detail: "failed to start thread pool".into() })?;
    let division_bytes = pipeline::decompress_divisions(
        bytes,
        &tables,
        &positions,
        footer.xml_block_region_offset,
        footer.mz_block_region_offset,
        footer.inten_block_region_offset,
        mz_pair,
        inten_pair,
        footer.data_format.source_compression,
        &pool,
    )?;
    drop(pool);

    let mut reconstructed = Vec::new();
    for division in &division_bytes {
        reconstructed.extend_from_slice(division);
    }

    if footer.data_format.mz_algo == mscompress::format::Algorithm::Lossless
        && footer.data_format.inten_algo == mscompress::format::Algorithm::Lossless
    {
        let reconstructed_hash: [u8; 16] = *md5::compute(&reconstructed);
        if reconstructed_hash != header.content_hash {
            warn!("reconstructed content hash does not match the recorded original hash");
        }
    }

    let output_path = cli.resolved_output();
    fs::write(&output_path, &reconstructed)?;
    info!(
        "wrote {} bytes to {} ({} division(s), format {}.{})",
        reconstructed.len(),
        output_path.display(),
        footer.division_count,
        footer.version_major,
        footer.version_minor
    );
    Ok(())
}
