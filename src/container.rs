//! Container writer/reader: the on-disk framing for a compressed file.
//!
//! Layout, in file order:
//! 1. **Header** — fixed 36-byte preamble: magic, format version, entropy
//!    coder name, and a 128-bit content hash of the original input.
//! 2. **Three block regions, one per stream** — the xml region holds every
//!    division's compressed xml block back to back in division order, then
//!    the mz region, then the intensity region. Grouping by stream rather
//!    than interleaving by division means a decompress run that only wants
//!    one stream (not exercised by this crate today, but left open by the
//!    footer's three independent offsets) never has to touch the others.
//!    No length prefixes live inside the regions; lengths live in the
//!    block-length tables below.
//! 3. **Block-length tables** — three `{compressed_size, original_size}`
//!    sequences, one per stream, in division order.
//! 4. **Per-division position tables** — `N` serialized `(xml, mz, inten)`
//!    `PositionList` triplets.
//! 5. **Footer** — the self-describing trailer: everything needed to find
//!    and validate regions 2–4 without re-scanning the original mzML.
//!
//! The footer is variable-length (it embeds the message string and the
//! `DataFormat`), so unlike a fixed-size trailer struct it is located by a
//! trailing 8-byte length field at the very end of the file — the same
//! "self-describing trailer" idiom `jafreck-lz4r::frame` uses for its own
//! frame/block headers, just applied at the whole-file level. Readers still
//! seek from EOF; they just read the length field first.

use std::io::Write;

use crate::config::{FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR, MAGIC_TAG, MESSAGE};
use crate::error::{Error, Result};
use crate::format::{Algorithm, DataFormat, NumericFormat, PositionList, SourceCompression};

const HEADER_MAGIC: &[u8; 8] = b"MSCMPRS\0";
const METHOD_NAME: &[u8; 8] = b"zstd\0\0\0\0";
pub const HEADER_LEN: usize = 8 + 2 + 2 + 8 + 16;

fn malformed(detail: impl Into<String>) -> Error {
    Error::MalformedInput { detail: detail.into(), byte_offset: None }
}

// ── little-endian helpers, in the style of frame::header elsewhere here ───

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn push_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn push_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(malformed("container buffer truncated"));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }
    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }
    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }
    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

/// Writes the fixed-size container header, returning its byte length.
pub fn write_header<W: Write>(w: &mut W, content_hash: [u8; 16]) -> Result<usize> {
    let mut buf = Vec::with_capacity(HEADER_LEN);
    buf.extend_from_slice(HEADER_MAGIC);
    push_u16(&mut buf, FORMAT_VERSION_MAJOR);
    push_u16(&mut buf, FORMAT_VERSION_MINOR);
    buf.extend_from_slice(METHOD_NAME);
    buf.extend_from_slice(&content_hash);
    debug_assert_eq!(buf.len(), HEADER_LEN);
    w.write_all(&buf)?;
    Ok(buf.len())
}

pub struct Header {
    pub version_major: u16,
    pub version_minor: u16,
    pub content_hash: [u8; 16],
}

pub fn parse_header(bytes: &[u8]) -> Result<Header> {
    let mut c = Cursor::new(bytes);
    let magic = c.take(8)?;
    if magic != HEADER_MAGIC {
        return Err(malformed("container header magic mismatch"));
    }
    let version_major = c.u16()?;
    let version_minor = c.u16()?;
    let _method = c.take(8)?;
    let hash_bytes = c.take(16)?;
    let mut content_hash = [0u8; 16];
    content_hash.copy_from_slice(hash_bytes);
    Ok(Header { version_major, version_minor, content_hash })
}

/// One stream's compressed-block accounting for a single division.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockMeta {
    pub compressed_size: u64,
    pub original_size: u64,
}

fn write_block_meta_table(out: &mut Vec<u8>, table: &[BlockMeta]) {
    push_u32(out, table.len() as u32);
    for m in table {
        push_u64(out, m.compressed_size);
        push_u64(out, m.original_size);
    }
}

fn read_block_meta_table(c: &mut Cursor) -> Result<Vec<BlockMeta>> {
    let count = c.u32()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let compressed_size = c.u64()?;
        let original_size = c.u64()?;
        out.push(BlockMeta { compressed_size, original_size });
    }
    Ok(out)
}

fn write_position_list(out: &mut Vec<u8>, list: &PositionList) {
    push_u32(out, list.len() as u32);
    for &s in &list.start_positions {
        push_u64(out, s);
    }
    for &e in &list.end_positions {
        push_u64(out, e);
    }
}

fn read_position_list(c: &mut Cursor) -> Result<PositionList> {
    let count = c.u32()? as usize;
    let mut start_positions = Vec::with_capacity(count);
    for _ in 0..count {
        start_positions.push(c.u64()?);
    }
    let mut end_positions = Vec::with_capacity(count);
    for _ in 0..count {
        end_positions.push(c.u64()?);
    }
    Ok(PositionList { start_positions, end_positions, file_end: 0 })
}

fn algorithm_tag(a: Algorithm) -> u8 {
    match a {
        Algorithm::Lossless => 0,
        Algorithm::Cast64To32 => 1,
        Algorithm::Log2 => 2,
        Algorithm::Delta16 => 3,
        Algorithm::Delta32 => 4,
    }
}

fn algorithm_from_tag(tag: u8) -> Result<Algorithm> {
    match tag {
        0 => Ok(Algorithm::Lossless),
        1 => Ok(Algorithm::Cast64To32),
        2 => Ok(Algorithm::Log2),
        3 => Ok(Algorithm::Delta16),
        4 => Ok(Algorithm::Delta32),
        other => Err(malformed(format!("unknown algorithm tag {other} in footer"))),
    }
}

fn format_tag(f: NumericFormat) -> u8 {
    match f {
        NumericFormat::F32 => 0,
        NumericFormat::F64 => 1,
    }
}

fn format_from_tag(tag: u8) -> Result<NumericFormat> {
    match tag {
        0 => Ok(NumericFormat::F32),
        1 => Ok(NumericFormat::F64),
        other => Err(malformed(format!("unknown numeric format tag {other} in footer"))),
    }
}

fn compression_tag(c: SourceCompression) -> u8 {
    match c {
        SourceCompression::None => 0,
        SourceCompression::Zlib => 1,
    }
}

fn compression_from_tag(tag: u8) -> Result<SourceCompression> {
    match tag {
        0 => Ok(SourceCompression::None),
        1 => Ok(SourceCompression::Zlib),
        other => Err(malformed(format!("unknown compression tag {other} in footer"))),
    }
}

/// Everything needed to locate and validate the block regions and position
/// tables without re-scanning the original mzML.
pub struct Footer {
    pub version_major: u16,
    pub version_minor: u16,
    pub xml_block_region_offset: u64,
    pub mz_block_region_offset: u64,
    pub inten_block_region_offset: u64,
    pub block_length_tables_offset: u64,
    pub position_tables_offset: u64,
    pub division_count: u32,
    pub data_format: DataFormat,
    pub message: String,
}

/// Serializes the footer body (magic through message) and appends the
/// trailing 8-byte length field the reader uses to locate it from EOF.
pub fn write_footer<W: Write>(w: &mut W, footer: &Footer) -> Result<usize> {
    let mut body = Vec::new();
    push_u32(&mut body, MAGIC_TAG);
    push_u16(&mut body, footer.version_major);
    push_u16(&mut body, footer.version_minor);
    push_u64(&mut body, footer.xml_block_region_offset);
    push_u64(&mut body, footer.mz_block_region_offset);
    push_u64(&mut body, footer.inten_block_region_offset);
    push_u64(&mut body, footer.block_length_tables_offset);
    push_u64(&mut body, footer.position_tables_offset);
    push_u32(&mut body, footer.division_count);
    push_u8(&mut body, format_tag(footer.data_format.source_mz_fmt));
    push_u8(&mut body, format_tag(footer.data_format.source_inten_fmt));
    push_u8(&mut body, compression_tag(footer.data_format.source_compression));
    push_u8(&mut body, algorithm_tag(footer.data_format.mz_algo));
    push_u8(&mut body, algorithm_tag(footer.data_format.inten_algo));
    push_u64(&mut body, footer.data_format.spectrum_count);
    let msg_bytes = footer.message.as_bytes();
    push_u32(&mut body, msg_bytes.len() as u32);
    body.extend_from_slice(msg_bytes);

    w.write_all(&body)?;
    let mut trailer = Vec::with_capacity(8);
    push_u64(&mut trailer, body.len() as u64);
    w.write_all(&trailer)?;
    Ok(body.len() + trailer.len())
}

/// Locates where the footer body begins by reading the trailing 8-byte
/// length field, without otherwise validating or parsing the footer.
/// Callers use this to bound the position-tables region, which runs from
/// `footer.position_tables_offset` up to this offset.
pub fn footer_start(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < 8 {
        return Err(malformed("file too short to contain a footer length field"));
    }
    let len_field = &bytes[bytes.len() - 8..];
    let footer_len = u64::from_le_bytes(len_field.try_into().unwrap()) as usize;
    if footer_len + 8 > bytes.len() {
        return Err(malformed("declared footer length exceeds file size"));
    }
    Ok(bytes.len() - 8 - footer_len)
}

/// Parses the footer out of the tail of a complete container buffer.
/// `bytes` is the entire file content (or a large-enough tail of it).
pub fn parse_footer(bytes: &[u8]) -> Result<Footer> {
    let footer_start = footer_start(bytes)?;
    let body = &bytes[footer_start..bytes.len() - 8];

    let mut c = Cursor::new(body);
    let magic = c.u32()?;
    if magic != MAGIC_TAG {
        return Err(malformed(format!("footer magic mismatch: expected {MAGIC_TAG:#x}, found {magic:#x}")));
    }
    let version_major = c.u16()?;
    let version_minor = c.u16()?;
    if version_major != FORMAT_VERSION_MAJOR {
        return Err(malformed(format!(
            "unsupported container format major version {version_major}"
        )));
    }
    let xml_block_region_offset = c.u64()?;
    let mz_block_region_offset = c.u64()?;
    let inten_block_region_offset = c.u64()?;
    let block_length_tables_offset = c.u64()?;
    let position_tables_offset = c.u64()?;
    let division_count = c.u32()?;
    let source_mz_fmt = format_from_tag(c.u8()?)?;
    let source_inten_fmt = format_from_tag(c.u8()?)?;
    let source_compression = compression_from_tag(c.u8()?)?;
    let mz_algo = algorithm_from_tag(c.u8()?)?;
    let inten_algo = algorithm_from_tag(c.u8()?)?;
    let spectrum_count = c.u64()?;
    let msg_len = c.u32()? as usize;
    let msg_bytes = c.take(msg_len)?;
    let message = String::from_utf8_lossy(msg_bytes).into_owned();

    Ok(Footer {
        version_major,
        version_minor,
        xml_block_region_offset,
        mz_block_region_offset,
        inten_block_region_offset,
        block_length_tables_offset,
        position_tables_offset,
        division_count,
        data_format: DataFormat {
            source_mz_fmt,
            source_inten_fmt,
            source_compression,
            mz_algo,
            inten_algo,
            spectrum_count,
        },
        message,
    })
}

/// Serializes the three block-length tables (xml, mz, inten), each in
/// division order.
pub fn write_block_length_tables<W: Write>(
    w: &mut W,
    xml: &[BlockMeta],
    mz: &[BlockMeta],
    inten: &[BlockMeta],
) -> Result<usize> {
    let mut buf = Vec::new();
    write_block_meta_table(&mut buf, xml);
    write_block_meta_table(&mut buf, mz);
    write_block_meta_table(&mut buf, inten);
    w.write_all(&buf)?;
    Ok(buf.len())
}

pub struct BlockLengthTables {
    pub xml: Vec<BlockMeta>,
    pub mz: Vec<BlockMeta>,
    pub inten: Vec<BlockMeta>,
}

pub fn read_block_length_tables(bytes: &[u8]) -> Result<BlockLengthTables> {
    let mut c = Cursor::new(bytes);
    let xml = read_block_meta_table(&mut c)?;
    let mz = read_block_meta_table(&mut c)?;
    let inten = read_block_meta_table(&mut c)?;
    Ok(BlockLengthTables { xml, mz, inten })
}

/// One division's three aligned position lists, as stored in the
/// per-division position tables region.
pub struct DivisionPositions {
    pub xml: PositionList,
    pub mz: PositionList,
    pub inten: PositionList,
}

pub fn write_position_tables<W: Write>(w: &mut W, divisions: &[DivisionPositions]) -> Result<usize> {
    let mut buf = Vec::new();
    for d in divisions {
        write_position_list(&mut buf, &d.xml);
        write_position_list(&mut buf, &d.mz);
        write_position_list(&mut buf, &d.inten);
    }
    w.write_all(&buf)?;
    Ok(buf.len())
}

pub fn read_position_tables(bytes: &[u8], division_count: usize) -> Result<Vec<DivisionPositions>> {
    let mut c = Cursor::new(bytes);
    let mut out = Vec::with_capacity(division_count);
    for _ in 0..division_count {
        let xml = read_position_list(&mut c)?;
        let mz = read_position_list(&mut c)?;
        let inten = read_position_list(&mut c)?;
        out.push(DivisionPositions { xml, mz, inten });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let mut buf = Vec::new();
        let hash = [7u8; 16];
        let len = write_header(&mut buf, hash).unwrap();
        assert_eq!(len, HEADER_LEN);
        let parsed = parse_header(&buf).unwrap();
        assert_eq!(parsed.content_hash, hash);
        assert_eq!(parsed.version_major, FORMAT_VERSION_MAJOR);
        assert_eq!(parsed.version_minor, FORMAT_VERSION_MINOR);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0] = b'X';
        assert!(parse_header(&buf).is_err());
    }

    fn sample_footer() -> Footer {
        Footer {
            version_major: FORMAT_VERSION_MAJOR,
            version_minor: FORMAT_VERSION_MINOR,
            xml_block_region_offset: 40,
            mz_block_region_offset: 1000,
            inten_block_region_offset: 2000,
            block_length_tables_offset: 3000,
            position_tables_offset: 3100,
            division_count: 2,
            data_format: DataFormat {
                source_mz_fmt: NumericFormat::F64,
                source_inten_fmt: NumericFormat::F32,
                source_compression: SourceCompression::None,
                mz_algo: Algorithm::Delta16,
                inten_algo: Algorithm::Lossless,
                spectrum_count: 12,
            },
            message: MESSAGE.to_string(),
        }
    }

    #[test]
    fn footer_round_trips() {
        let mut buf = Vec::new();
        write_footer(&mut buf, &sample_footer()).unwrap();
        let parsed = parse_footer(&buf).unwrap();
        assert_eq!(parsed.division_count, 2);
        assert_eq!(parsed.data_format.mz_algo, Algorithm::Delta16);
        assert_eq!(parsed.data_format.spectrum_count, 12);
        assert_eq!(parsed.message, MESSAGE);
    }

    #[test]
    fn footer_rejects_corrupted_magic() {
        let mut buf = Vec::new();
        write_footer(&mut buf, &sample_footer()).unwrap();
        // Flip the magic's low byte (it's the first byte of the footer body,
        // which starts right after file_len - 8 - footer_len).
        let footer_len = u64::from_le_bytes(buf[buf.len() - 8..].try_into().unwrap()) as usize;
        let footer_start = buf.len() - 8 - footer_len;
        buf[footer_start] ^= 0xFF;
        assert!(parse_footer(&buf).is_err());
    }

    #[test]
    fn footer_rejects_truncated_file() {
        let mut buf = Vec::new();
        write_footer(&mut buf, &sample_footer()).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(parse_footer(&buf).is_err());
    }

    #[test]
    fn block_length_tables_round_trip() {
        let xml = vec![BlockMeta { compressed_size: 10, original_size: 20 }];
        let mz = vec![BlockMeta { compressed_size: 30, original_size: 40 }];
        let inten = vec![BlockMeta { compressed_size: 50, original_size: 60 }];
        let mut buf = Vec::new();
        write_block_length_tables(&mut buf, &xml, &mz, &inten).unwrap();
        let parsed = read_block_length_tables(&buf).unwrap();
        assert_eq!(parsed.xml[0].compressed_size, 10);
        assert_eq!(parsed.mz[0].original_size, 40);
        assert_eq!(parsed.inten[0].compressed_size, 50);
    }

    #[test]
    fn position_tables_round_trip() {
        let mut xml = PositionList::new();
        xml.push(0, 5);
        xml.push(10, 15);
        let mut mz = PositionList::new();
        mz.push(5, 10);
        let mut inten = PositionList::new();
        inten.push(15, 20);
        let divisions = vec![DivisionPositions { xml, mz, inten }];
        let mut buf = Vec::new();
        write_position_tables(&mut buf, &divisions).unwrap();
        let parsed = read_position_tables(&buf, 1).unwrap();
        assert_eq!(parsed[0].xml.len(), 2);
        assert_eq!(parsed[0].mz.span(0), (5, 10));
        assert_eq!(parsed[0].inten.span(0), (15, 20));
    }
}
