//! End-to-end checks that configuration and container corruption surface
//! the right `Error` variant (and therefore the right process exit code)
//! before any expensive work happens.

use mscompress::config::{FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR, MESSAGE};
use mscompress::container::{self, Footer};
use mscompress::dispatch;
use mscompress::error::Error;
use mscompress::format::{Algorithm, DataFormat, NumericFormat, SourceCompression};

fn sample_footer() -> Footer {
    Footer {
        version_major: FORMAT_VERSION_MAJOR,
        version_minor: FORMAT_VERSION_MINOR,
        xml_block_region_offset: 36,
        mz_block_region_offset: 100,
        inten_block_region_offset: 200,
        block_length_tables_offset: 300,
        position_tables_offset: 350,
        division_count: 1,
        data_format: DataFormat {
            source_mz_fmt: NumericFormat::F64,
            source_inten_fmt: NumericFormat::F64,
            source_compression: SourceCompression::None,
            mz_algo: Algorithm::Lossless,
            inten_algo: Algorithm::Lossless,
            spectrum_count: 1,
        },
        message: MESSAGE.to_string(),
    }
}

#[test]
fn unsupported_delta32_f64_pair_is_rejected_before_any_io() {
    let err = dispatch::resolve("delta32", "lossless", NumericFormat::F64, NumericFormat::F32);
    match err {
        Err(Error::ConfigError { .. }) => {}
        other => panic!("expected ConfigError, got {other:?}"),
    }
    assert_eq!(err.unwrap_err().exit_code(), 3);
}

#[test]
fn zero_threads_is_rejected_by_the_divider() {
    use mscompress::format::PositionList;
    let mut xml = PositionList::new();
    xml.push(0, 5);
    let mut mz = PositionList::new();
    mz.push(5, 10);
    let mut inten = PositionList::new();
    inten.push(10, 15);
    xml.file_end = 15;
    mz.file_end = 15;
    inten.file_end = 15;

    let err = mscompress::divider::partition(&xml, &mz, &inten, 1, 0, 0);
    assert!(matches!(err, Err(Error::ConfigError { .. })));
}

#[test]
fn corrupted_footer_magic_surfaces_as_malformed_input_with_exit_code_two() {
    let mut out = vec![0u8; 36]; // stand-in header region
    container::write_footer(&mut out, &sample_footer()).unwrap();

    let footer_start = container::footer_start(&out).unwrap();
    out[footer_start] ^= 0xFF;
    out[footer_start + 1] ^= 0xFF;

    let err = container::parse_footer(&out).unwrap_err();
    assert!(matches!(err, Error::MalformedInput { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn truncated_container_file_is_rejected_rather_than_panicking() {
    let mut out = vec![0u8; 36];
    container::write_footer(&mut out, &sample_footer()).unwrap();
    out.truncate(out.len() / 2);

    let result = container::parse_footer(&out);
    assert!(result.is_err());
}

#[test]
fn empty_input_mzml_is_rejected_as_malformed_rather_than_panicking() {
    let result = mscompress::scanner::scan_metadata(b"");
    assert!(matches!(result, Err(Error::MalformedInput { .. })));
}

#[test]
fn unknown_algorithm_name_is_a_config_error_not_a_codec_error() {
    let err = dispatch::resolve("not-a-real-transform", "lossless", NumericFormat::F32, NumericFormat::F32);
    assert!(matches!(err, Err(Error::ConfigError { .. })));
}
