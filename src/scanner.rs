//! Two-pass mzML scanner.
//!
//! The metadata pass is an incremental, short-circuiting walk over
//! `quick_xml` events that stops as soon as both binary-array roles (mz and
//! intensity) have reported a precision and the source compression has been
//! determined. The boundary pass never touches the XML parser: it is a
//! linear byte scan for literal tag markers, matching the reference
//! implementation's `find_binary_quick`, which trades XML-correctness for
//! speed since mzML's `<binary>` framing is rigid enough not to need a
//! full parse.

use memchr::memmem;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{Error, Result};
use crate::format::{Division, NumericFormat, PositionList, SourceCompression};

const ACCESSION_MZ_ARRAY: &str = "MS:1000514";
const ACCESSION_INTENSITY_ARRAY: &str = "MS:1000515";
const ACCESSION_32_BIT_FLOAT: &str = "MS:1000521";
const ACCESSION_64_BIT_FLOAT: &str = "MS:1000523";
const ACCESSION_ZLIB_COMPRESSION: &str = "MS:1000574";
const ACCESSION_NO_COMPRESSION: &str = "MS:1000576";

#[derive(Default, Clone, Copy)]
struct ArrayRoleState {
    is_mz: bool,
    is_inten: bool,
    format: Option<NumericFormat>,
}

/// Discovers numeric precision, source compression, and spectrum count by
/// walking `cvParam` elements inside each `binaryDataArray`. Stops as soon
/// as both roles and the compression flag are known.
pub fn scan_metadata(xml: &[u8]) -> Result<(NumericFormat, NumericFormat, SourceCompression, u64)> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut mz_format: Option<NumericFormat> = None;
    let mut inten_format: Option<NumericFormat> = None;
    let mut compression: Option<SourceCompression> = None;
    let mut spectrum_count: u64 = 0;
    let mut current = ArrayRoleState::default();
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::MalformedInput {
                detail: format!("xml parse error: {e}"),
                byte_offset: Some(reader.buffer_position() as u64),
            })?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = e.name();
                let local = name.as_ref();
                if local == b"binaryDataArray" {
                    current = ArrayRoleState::default();
                } else if local == b"cvParam" {
                    let mut accession = None;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"accession" {
                            accession = Some(attr.unescape_value().unwrap_or_default().into_owned());
                        }
                    }
                    match accession.as_deref() {
                        Some(ACCESSION_MZ_ARRAY) => current.is_mz = true,
                        Some(ACCESSION_INTENSITY_ARRAY) => current.is_inten = true,
                        Some(ACCESSION_32_BIT_FLOAT) => current.format = Some(NumericFormat::F32),
                        Some(ACCESSION_64_BIT_FLOAT) => current.format = Some(NumericFormat::F64),
                        Some(ACCESSION_ZLIB_COMPRESSION) => compression = Some(SourceCompression::Zlib),
                        Some(ACCESSION_NO_COMPRESSION) => compression = Some(SourceCompression::None),
                        _ => {}
                    }
                    if let Some(fmt) = current.format {
                        if current.is_mz && mz_format.is_none() {
                            mz_format = Some(fmt);
                        }
                        if current.is_inten && inten_format.is_none() {
                            inten_format = Some(fmt);
                        }
                    }
                } else if local == b"spectrumList" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"count" {
                            if let Ok(value) = attr.unescape_value() {
                                spectrum_count = value.parse().unwrap_or(0);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        if mz_format.is_some() && inten_format.is_some() && compression.is_some() && spectrum_count > 0 {
            break;
        }
        buf.clear();
    }

    let mz_format = mz_format.ok_or_else(|| Error::MalformedInput {
        detail: "no m/z binaryDataArray cvParam found".into(),
        byte_offset: None,
    })?;
    let inten_format = inten_format.ok_or_else(|| Error::MalformedInput {
        detail: "no intensity binaryDataArray cvParam found".into(),
        byte_offset: None,
    })?;
    let compression = compression.unwrap_or(SourceCompression::None);

    Ok((mz_format, inten_format, compression, spectrum_count))
}

/// Linear byte scan producing three aligned position lists, matching
/// `preprocess.c::find_binary_quick`: for each spectrum it locates `scan=`,
/// the `"ms level"` accession, then the mz `<binary>...</binary>` span
/// followed by the intensity `<binary>...</binary>` span. The xml list does
/// *not* hold one span per spectrum; it holds the file fragments *between*
/// binaries — the pre-mz fragment and the mz-to-intensity fragment for
/// every spectrum, plus one trailing fragment after the last intensity
/// array — so that `xml.len() == 2 * mz.len() + 1` and interleaving
/// `xml[0], mz[0], xml[1], inten[0], xml[2], mz[1], xml[3], inten[1], …`
/// reproduces the input exactly.
///
/// `spectrum_count` bounds the scan: exactly that many mz/intensity pairs
/// are expected, matching the metadata pass's `spectrumList@count`.
pub fn scan_boundaries(xml: &[u8], spectrum_count: u64) -> Result<(PositionList, PositionList, PositionList)> {
    let mut xml_positions = PositionList::new();
    let mut mz_positions = PositionList::new();
    let mut inten_positions = PositionList::new();

    let scan_marker = memmem::Finder::new(b"scan=");
    let ms_level_marker = memmem::Finder::new(b"\"ms level\"");
    let binary_open = memmem::Finder::new(b"<binary>");
    let binary_close = memmem::Finder::new(b"</binary>");

    let mut cursor = 0usize;
    let mut xml_span_start = 0u64;

    for _ in 0..spectrum_count {
        let scan_rel = scan_marker.find(&xml[cursor..]).ok_or_else(|| Error::MalformedInput {
            detail: "expected 'scan=' anchor before next spectrum".into(),
            byte_offset: Some(cursor as u64),
        })?;
        cursor += scan_rel + b"scan=".len();

        let level_rel = ms_level_marker.find(&xml[cursor..]).ok_or_else(|| Error::MalformedInput {
            detail: "expected 'ms level' cvParam after scan= anchor".into(),
            byte_offset: Some(cursor as u64),
        })?;
        cursor += level_rel + b"\"ms level\"".len();

        let (mz_start, mz_end, next) = find_binary(xml, cursor)?;
        cursor = next;
        xml_positions.push(xml_span_start, mz_start as u64);
        mz_positions.push(mz_start as u64, mz_end as u64);
        xml_span_start = mz_end as u64;

        let (inten_start, inten_end, next) = find_binary(xml, cursor)?;
        cursor = next;
        xml_positions.push(xml_span_start, inten_start as u64);
        inten_positions.push(inten_start as u64, inten_end as u64);
        xml_span_start = inten_end as u64;
    }

    xml_positions.push(xml_span_start, xml.len() as u64);

    let file_end = xml.len() as u64;
    xml_positions.file_end = file_end;
    mz_positions.file_end = file_end;
    inten_positions.file_end = file_end;

    if (mz_positions.len() as u64) < spectrum_count {
        return Err(Error::MalformedInput {
            detail: format!(
                "expected {spectrum_count} spectra, found only {}",
                mz_positions.len()
            ),
            byte_offset: None,
        });
    }

    Ok((xml_positions, mz_positions, inten_positions))
}

/// Locates the next `<binary>...</binary>` element starting the search at
/// `from`, returning `(inner_start, inner_end, cursor_after_close_tag)`.
fn find_binary(xml: &[u8], from: usize) -> Result<(usize, usize, usize)> {
    let open_marker = memmem::Finder::new(b"<binary>");
    let close_marker = memmem::Finder::new(b"</binary>");

    let open_rel = open_marker.find(&xml[from..]).ok_or_else(|| Error::MalformedInput {
        detail: "expected <binary> element".into(),
        byte_offset: Some(from as u64),
    })?;
    let inner_start = from + open_rel + b"<binary>".len();

    let close_rel = close_marker.find(&xml[inner_start..]).ok_or_else(|| Error::MalformedInput {
        detail: "unterminated <binary> element".into(),
        byte_offset: Some(inner_start as u64),
    })?;
    let inner_end = inner_start + close_rel;
    let cursor_after = inner_end + b"</binary>".len();

    Ok((inner_start, inner_end, cursor_after))
}

/// Slices a division's worth of spans out of three whole-file position
/// lists, used by the Divider once it has decided where the cut points
/// fall (in spectrum-index space, not byte space).
///
/// The mz/intensity lists slice directly (one span per spectrum). The xml
/// list does not: spectrum `i`'s two local fragments live at global indices
/// `2i` and `2i+1`, and the fragment straddling a division boundary (global
/// index `2*spectrum_end`, between the division's last intensity array and
/// the next spectrum's mz array) is attributed *whole* to this division as
/// its trailing fragment — the next division gets a zero-length placeholder
/// in its place, so every division satisfies `xml.len() == 2*n + 1`
/// without any byte of the original file being duplicated across
/// divisions.
pub fn slice_division(
    xml: &PositionList,
    mz: &PositionList,
    inten: &PositionList,
    spectrum_start: usize,
    spectrum_end: usize,
) -> Division {
    let n = spectrum_end - spectrum_start;
    let total_spectra = mz.len();

    let mut local_xml = PositionList::new();
    if spectrum_start == 0 {
        let (s, e) = xml.span(0);
        local_xml.push(s, e);
    } else {
        let (mz_start, _) = mz.span(spectrum_start);
        local_xml.push(mz_start, mz_start);
    }
    for i in spectrum_start..spectrum_end {
        if i > spectrum_start {
            let (s, e) = xml.span(2 * i);
            local_xml.push(s, e);
        }
        let (s, e) = xml.span(2 * i + 1);
        local_xml.push(s, e);
    }
    // The trailing fragment always belongs whole to this division, whether
    // it is the true end-of-file fragment (last division) or the fragment
    // straddling into the next division's first spectrum (every other
    // division) — the next division's own leading entry is then the empty
    // placeholder computed above instead of a second copy of these bytes.
    if spectrum_end == total_spectra {
        let (s, e) = xml.span(2 * total_spectra);
        local_xml.push(s, e);
    } else {
        let (s, e) = xml.span(2 * spectrum_end);
        local_xml.push(s, e);
    }
    local_xml.file_end = xml.file_end;
    debug_assert_eq!(local_xml.len(), 2 * n + 1);

    let slice_direct = |list: &PositionList| -> PositionList {
        let mut out = PositionList::new();
        for i in spectrum_start..spectrum_end {
            let (s, e) = list.span(i);
            out.push(s, e);
        }
        out.file_end = list.file_end;
        out
    };

    Division {
        xml: local_xml,
        mz: slice_direct(mz),
        inten: slice_direct(inten),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<mzML><run><spectrumList count="2">
<spectrum id="scan=1">
<cvParam accession="MS:1000511" name="ms level" value="1"/>
<binaryDataArrayList count="2">
<binaryDataArray><cvParam accession="MS:1000514" name="m/z array"/><cvParam accession="MS:1000523" name="64-bit float"/><cvParam accession="MS:1000576" name="no compression"/><binary>AAAAAAAA8D8=</binary></binaryDataArray>
<binaryDataArray><cvParam accession="MS:1000515" name="intensity array"/><cvParam accession="MS:1000523" name="64-bit float"/><binary>AAAAAAAA8D8=</binary></binaryDataArray>
</binaryDataArrayList>
</spectrum>
<spectrum id="scan=2">
<cvParam accession="MS:1000511" name="ms level" value="1"/>
<binaryDataArrayList count="2">
<binaryDataArray><binary>AAAAAAAA8D8=</binary></binaryDataArray>
<binaryDataArray><binary>AAAAAAAA8D8=</binary></binaryDataArray>
</binaryDataArrayList>
</spectrum>
</spectrumList></run></mzML>"#;

    #[test]
    fn metadata_pass_finds_both_roles() {
        let (mz_fmt, inten_fmt, compression, count) = scan_metadata(SAMPLE.as_bytes()).unwrap();
        assert_eq!(mz_fmt, NumericFormat::F64);
        assert_eq!(inten_fmt, NumericFormat::F64);
        assert_eq!(compression, SourceCompression::None);
        assert_eq!(count, 2);
    }

    #[test]
    fn boundary_pass_finds_two_spectra_with_two_binaries_each() {
        let (xml, mz, inten) = scan_boundaries(SAMPLE.as_bytes(), 2).unwrap();
        assert_eq!(xml.len(), 2 * 2 + 1);
        assert_eq!(mz.len(), 2);
        assert_eq!(inten.len(), 2);
        for i in 0..2 {
            let (s, e) = mz.span(i);
            assert!(e > s);
        }
    }

    #[test]
    fn interleaving_spans_reproduces_original_bytes() {
        let bytes = SAMPLE.as_bytes();
        let (xml, mz, inten) = scan_boundaries(bytes, 2).unwrap();
        let mut rebuilt = Vec::new();
        for i in 0..2usize {
            let (s, e) = xml.span(2 * i);
            rebuilt.extend_from_slice(&bytes[s as usize..e as usize]);
            let (s, e) = mz.span(i);
            rebuilt.extend_from_slice(&bytes[s as usize..e as usize]);
            let (s, e) = xml.span(2 * i + 1);
            rebuilt.extend_from_slice(&bytes[s as usize..e as usize]);
            let (s, e) = inten.span(i);
            rebuilt.extend_from_slice(&bytes[s as usize..e as usize]);
        }
        let (s, e) = xml.span(4);
        rebuilt.extend_from_slice(&bytes[s as usize..e as usize]);
        assert_eq!(rebuilt, bytes);
    }

    #[test]
    fn sliced_division_satisfies_xml_count_invariant() {
        let bytes = SAMPLE.as_bytes();
        let (xml, mz, inten) = scan_boundaries(bytes, 2).unwrap();
        let first = slice_division(&xml, &mz, &inten, 0, 1);
        let second = slice_division(&xml, &mz, &inten, 1, 2);
        assert_eq!(first.xml.len(), 2 * first.spectrum_count() + 1);
        assert_eq!(second.xml.len(), 2 * second.spectrum_count() + 1);
    }
}
