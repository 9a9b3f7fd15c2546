//! End-to-end checks of the container header/footer framing and the
//! divider's partition law, independent of any particular transform.

use mscompress::config::{FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR, MESSAGE};
use mscompress::container::{self, BlockMeta, DivisionPositions, Footer};
use mscompress::divider;
use mscompress::format::{Algorithm, DataFormat, NumericFormat, PositionList, SourceCompression};

fn sample_data_format(spectrum_count: u64) -> DataFormat {
    DataFormat {
        source_mz_fmt: NumericFormat::F64,
        source_inten_fmt: NumericFormat::F32,
        source_compression: SourceCompression::None,
        mz_algo: Algorithm::Delta16,
        inten_algo: Algorithm::Log2,
        spectrum_count,
    }
}

fn sample_footer(spectrum_count: u64, division_count: u32) -> Footer {
    Footer {
        version_major: FORMAT_VERSION_MAJOR,
        version_minor: FORMAT_VERSION_MINOR,
        xml_block_region_offset: 36,
        mz_block_region_offset: 500,
        inten_block_region_offset: 900,
        block_length_tables_offset: 1300,
        position_tables_offset: 1400,
        division_count,
        data_format: sample_data_format(spectrum_count),
        message: MESSAGE.to_string(),
    }
}

#[test]
fn full_container_header_and_footer_round_trip_through_a_byte_buffer() {
    let mut out = Vec::new();
    let hash = [9u8; 16];
    container::write_header(&mut out, hash).unwrap();
    assert_eq!(out.len(), container::HEADER_LEN);

    out.extend_from_slice(b"pretend-compressed-block-bytes");

    container::write_footer(&mut out, &sample_footer(100, 4)).unwrap();

    let header = container::parse_header(&out[..container::HEADER_LEN]).unwrap();
    assert_eq!(header.content_hash, hash);

    let footer = container::parse_footer(&out).unwrap();
    assert_eq!(footer.division_count, 4);
    assert_eq!(footer.data_format.spectrum_count, 100);
    assert_eq!(footer.data_format.mz_algo, Algorithm::Delta16);
    assert_eq!(footer.message, MESSAGE);
}

/// The reader should be able to locate the footer from EOF alone, without
/// knowing its length ahead of time, matching the container's "seek from
/// EOF" contract.
#[test]
fn footer_is_locatable_purely_from_the_trailing_length_field() {
    let mut out = vec![0u8; 64]; // stand-in for header + block regions
    container::write_footer(&mut out, &sample_footer(8, 2)).unwrap();
    let footer_start = container::footer_start(&out).unwrap();
    assert_eq!(footer_start, 64);
    let footer = container::parse_footer(&out).unwrap();
    assert_eq!(footer.division_count, 2);
}

#[test]
fn eight_division_position_tables_sum_to_the_whole_file_spectrum_count() {
    let mut xml = PositionList::new();
    let mut mz = PositionList::new();
    let mut inten = PositionList::new();
    let mut off = 0u64;
    for _ in 0..80 {
        xml.push(off, off + 5);
        off += 5;
        mz.push(off, off + 64);
        off += 64;
        xml.push(off, off + 5);
        off += 5;
        inten.push(off, off + 64);
        off += 64;
    }
    xml.push(off, off + 5);
    off += 5;
    xml.file_end = off;
    mz.file_end = off;
    inten.file_end = off;

    let partitioned = divider::partition(&xml, &mz, &inten, 8, 0, 1).unwrap();
    let divisions = partitioned.divisions;
    assert_eq!(divisions.len(), 8);
    assert_eq!(partitioned.threads, 1);

    let total_spectra: usize = divisions.iter().map(|d| d.spectrum_count()).sum();
    assert_eq!(total_spectra, 80);

    let division_positions: Vec<DivisionPositions> = divisions
        .iter()
        .map(|d| DivisionPositions { xml: d.xml.clone(), mz: d.mz.clone(), inten: d.inten.clone() })
        .collect();
    let mut buf = Vec::new();
    container::write_position_tables(&mut buf, &division_positions).unwrap();
    let parsed = container::read_position_tables(&buf, 8).unwrap();
    let parsed_total: usize = parsed.iter().map(|p| p.mz.len()).sum();
    assert_eq!(parsed_total, 80);
}

#[test]
fn block_length_tables_preserve_compressed_and_original_sizes_per_division() {
    let xml = vec![BlockMeta { compressed_size: 10, original_size: 40 }, BlockMeta { compressed_size: 12, original_size: 48 }];
    let mz = vec![BlockMeta { compressed_size: 100, original_size: 400 }, BlockMeta { compressed_size: 120, original_size: 480 }];
    let inten = vec![BlockMeta { compressed_size: 90, original_size: 360 }, BlockMeta { compressed_size: 95, original_size: 380 }];
    let mut buf = Vec::new();
    container::write_block_length_tables(&mut buf, &xml, &mz, &inten).unwrap();
    let parsed = container::read_block_length_tables(&buf).unwrap();
    assert_eq!(parsed.xml.len(), 2);
    assert_eq!(parsed.mz[1].compressed_size, 120);
    assert_eq!(parsed.inten[0].original_size, 360);
}
