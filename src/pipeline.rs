//! Parallel block pipeline: turns a set of [`Division`]s plus resolved
//! transforms into compressed block regions at compress time, and reverses
//! the process at decompress time.
//!
//! Division work is farmed out to [`crate::threadpool::TPool`] the way
//! `compress_mt` farms out chunk work, but instead of a "first worker free
//! writes next, so stall the others" ordering, each job writes its result
//! into a pre-sized slot array indexed by division number — a fixed "write
//! register" per division rather than one shared cursor — so results land
//! in division order no matter which thread finishes first, and the final
//! concatenation pass never blocks on write ordering.

use std::sync::{Arc, Mutex};

use crate::codec::{base64_decode, base64_encode, block_compress, block_decompress, zlib_deflate, zlib_inflate};
use crate::container::BlockMeta;
use crate::dispatch::TransformPair;
use crate::error::{Error, Result};
use crate::format::{Division, SourceCompression};
use crate::threadpool::TPool;

fn codec_err(division: usize, detail: impl Into<String>) -> Error {
    Error::CodecError { detail: detail.into(), division: Some(division) }
}

/// One division's three compressed block regions plus the accounting the
/// container's block-length tables need.
pub struct CompressedDivision {
    pub xml: Vec<u8>,
    pub mz: Vec<u8>,
    pub inten: Vec<u8>,
    pub xml_meta: BlockMeta,
    pub mz_meta: BlockMeta,
    pub inten_meta: BlockMeta,
}

/// Concatenates a division's binary array spans through base64 decode,
/// optional zlib inflate, and the transform's encode direction, producing
/// one spectrum-ordered stream of framed buffers.
fn encode_binary_stream(
    input: &[u8],
    positions: &crate::format::PositionList,
    transform: &TransformPair,
    source_compression: SourceCompression,
    division_index: usize,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for i in 0..positions.len() {
        let (s, e) = positions.span(i);
        let text = &input[s as usize..e as usize];
        let raw = base64_decode(text).map_err(|_| {
            codec_err(division_index, format!("base64 decode failed for spectrum {i}"))
        })?;
        let inflated = zlib_inflate(&raw, source_compression)?;
        let framed = transform.encode(&inflated)?;
        out.extend_from_slice(&framed);
    }
    Ok(out)
}

/// Concatenates a division's xml fragments verbatim (no transform applies
/// to xml framing text).
fn concat_xml_fragments(input: &[u8], positions: &crate::format::PositionList) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..positions.len() {
        let (s, e) = positions.span(i);
        out.extend_from_slice(&input[s as usize..e as usize]);
    }
    out
}

/// Compresses one division's three streams into block regions, returning
/// both the compressed bytes and the `{compressed_size, original_size}`
/// accounting the container footer records.
pub fn compress_division(
    input: &[u8],
    division: &Division,
    mz_pair: &TransformPair,
    inten_pair: &TransformPair,
    source_compression: SourceCompression,
    level: i32,
    division_index: usize,
) -> Result<CompressedDivision> {
    let xml_raw = concat_xml_fragments(input, &division.xml);
    let mz_raw = encode_binary_stream(input, &division.mz, mz_pair, source_compression, division_index)?;
    let inten_raw = encode_binary_stream(input, &division.inten, inten_pair, source_compression, division_index)?;

    let xml = block_compress(&xml_raw, level)?;
    let mz = block_compress(&mz_raw, level)?;
    let inten = block_compress(&inten_raw, level)?;

    Ok(CompressedDivision {
        xml_meta: BlockMeta { compressed_size: xml.len() as u64, original_size: xml_raw.len() as u64 },
        mz_meta: BlockMeta { compressed_size: mz.len() as u64, original_size: mz_raw.len() as u64 },
        inten_meta: BlockMeta { compressed_size: inten.len() as u64, original_size: inten_raw.len() as u64 },
        xml,
        mz,
        inten,
    })
}

/// Compresses every division in parallel using `pool`, writing each result
/// into its own slot so the returned `Vec` is in division order regardless
/// of completion order.
pub fn compress_divisions(
    input: &[u8],
    divisions: &[Division],
    mz_pair: TransformPair,
    inten_pair: TransformPair,
    source_compression: SourceCompression,
    level: i32,
    pool: &TPool,
) -> Result<Vec<CompressedDivision>> {
    let slots: Arc<Mutex<Vec<Option<Result<CompressedDivision>>>>> =
        Arc::new(Mutex::new((0..divisions.len()).map(|_| None).collect()));

    // Each job gets its own owned copy of the division it works on plus a
    // shared, reference-counted copy of the whole input; this keeps every
    // job body fully `'static` and avoids the thread pool borrowing back
    // into this stack frame.
    let input: Arc<[u8]> = Arc::from(input);

    for (i, division) in divisions.iter().cloned().enumerate() {
        let slots = Arc::clone(&slots);
        let input = Arc::clone(&input);
        let job: Box<dyn FnOnce() + Send + 'static> = Box::new(move || {
            let result =
                compress_division(&input, &division, &mz_pair, &inten_pair, source_compression, level, i);
            slots.lock().unwrap()[i] = Some(result);
        });
        pool.submit_job(job);
    }
    pool.jobs_completed();

    let results = Arc::try_unwrap(slots)
        .map_err(|_| codec_err(0, "thread pool left a dangling reference to the result slots"))?
        .into_inner()
        .unwrap();
    results
        .into_iter()
        .map(|slot| slot.expect("every division slot is filled before jobs_completed returns"))
        .collect()
}

/// Reconstructs one division's original byte stream (xml interleaved with
/// regenerated `<binary>` payloads) from its compressed blocks and the
/// container's recorded position lists for that division.
pub fn decompress_division(
    compressed: &CompressedDivisionInput,
    mz_pair: &TransformPair,
    inten_pair: &TransformPair,
    source_compression: SourceCompression,
    division_index: usize,
) -> Result<Vec<u8>> {
    let xml_raw = block_decompress(compressed.xml, compressed.xml_meta.original_size as usize)?;
    let mz_raw = block_decompress(compressed.mz, compressed.mz_meta.original_size as usize)?;
    let inten_raw = block_decompress(compressed.inten, compressed.inten_meta.original_size as usize)?;

    let mz_texts = decode_binary_stream(&mz_raw, mz_pair, source_compression, compressed.mz_count, division_index)?;
    let inten_texts =
        decode_binary_stream(&inten_raw, inten_pair, source_compression, compressed.inten_count, division_index)?;

    let xml_fragments = split_fragments(&xml_raw, compressed.xml_fragment_lens);

    let n = compressed.mz_count;
    if xml_fragments.len() != 2 * n + 1 || mz_texts.len() != n || inten_texts.len() != n {
        return Err(codec_err(division_index, "reconstructed division has mismatched fragment counts"));
    }

    let mut out = Vec::new();
    for i in 0..n {
        out.extend_from_slice(&xml_fragments[2 * i]);
        out.extend_from_slice(mz_texts[i].as_bytes());
        out.extend_from_slice(&xml_fragments[2 * i + 1]);
        out.extend_from_slice(inten_texts[i].as_bytes());
    }
    out.extend_from_slice(&xml_fragments[2 * n]);
    Ok(out)
}

/// Everything [`decompress_division`] needs about one division's stored
/// blocks: the compressed bytes, their accounting, and the xml fragment
/// lengths recorded in the position tables (so the decompressed xml block
/// can be re-split without re-deriving offsets).
pub struct CompressedDivisionInput<'a> {
    pub xml: &'a [u8],
    pub mz: &'a [u8],
    pub inten: &'a [u8],
    pub xml_meta: BlockMeta,
    pub mz_meta: BlockMeta,
    pub inten_meta: BlockMeta,
    pub xml_fragment_lens: &'a [u64],
    pub mz_count: usize,
    pub inten_count: usize,
}

/// Everything needed to locate one division's compressed blocks inside the
/// whole container file, resolved up front so jobs don't share a cursor.
struct DivisionBlockLocation {
    xml_start: usize,
    xml_len: usize,
    mz_start: usize,
    mz_len: usize,
    inten_start: usize,
    inten_len: usize,
    xml_meta: BlockMeta,
    mz_meta: BlockMeta,
    inten_meta: BlockMeta,
    xml_fragment_lens: Vec<u64>,
    mz_count: usize,
    inten_count: usize,
}

/// Decompresses every division in parallel using `pool`, the reverse
/// counterpart to [`compress_divisions`]: block offsets are resolved up
/// front from the container's block-length and position tables (a cheap
/// sequential cursor walk), then each job reads its own slice of the shared
/// file buffer and writes its reconstructed bytes into a fixed slot, so the
/// returned `Vec` is in division order regardless of completion order.
#[allow(clippy::too_many_arguments)]
pub fn decompress_divisions(
    file: &[u8],
    tables: &crate::container::BlockLengthTables,
    positions: &[crate::container::DivisionPositions],
    xml_block_region_offset: u64,
    mz_block_region_offset: u64,
    inten_block_region_offset: u64,
    mz_pair: TransformPair,
    inten_pair: TransformPair,
    source_compression: SourceCompression,
    pool: &TPool,
) -> Result<Vec<Vec<u8>>> {
    let division_count = positions.len();
    let mut locations = Vec::with_capacity(division_count);
    let mut xml_cursor = xml_block_region_offset as usize;
    let mut mz_cursor = mz_block_region_offset as usize;
    let mut inten_cursor = inten_block_region_offset as usize;

    for (i, division_positions) in positions.iter().enumerate() {
        let xml_meta = tables.xml[i];
        let mz_meta = tables.mz[i];
        let inten_meta = tables.inten[i];

        let xml_start = xml_cursor;
        xml_cursor += xml_meta.compressed_size as usize;
        let mz_start = mz_cursor;
        mz_cursor += mz_meta.compressed_size as usize;
        let inten_start = inten_cursor;
        inten_cursor += inten_meta.compressed_size as usize;

        let xml_fragment_lens: Vec<u64> = (0..division_positions.xml.len())
            .map(|j| {
                let (s, e) = division_positions.xml.span(j);
                e - s
            })
            .collect();

        locations.push(DivisionBlockLocation {
            xml_start,
            xml_len: xml_meta.compressed_size as usize,
            mz_start,
            mz_len: mz_meta.compressed_size as usize,
            inten_start,
            inten_len: inten_meta.compressed_size as usize,
            xml_meta,
            mz_meta,
            inten_meta,
            xml_fragment_lens,
            mz_count: division_positions.mz.len(),
            inten_count: division_positions.inten.len(),
        });
    }

    let slots: Arc<Mutex<Vec<Option<Result<Vec<u8>>>>>> =
        Arc::new(Mutex::new((0..division_count).map(|_| None).collect()));
    let file: Arc<[u8]> = Arc::from(file);

    for (i, location) in locations.into_iter().enumerate() {
        let slots = Arc::clone(&slots);
        let file = Arc::clone(&file);
        let job: Box<dyn FnOnce() + Send + 'static> = Box::new(move || {
            let input = CompressedDivisionInput {
                xml: &file[location.xml_start..location.xml_start + location.xml_len],
                mz: &file[location.mz_start..location.mz_start + location.mz_len],
                inten: &file[location.inten_start..location.inten_start + location.inten_len],
                xml_meta: location.xml_meta,
                mz_meta: location.mz_meta,
                inten_meta: location.inten_meta,
                xml_fragment_lens: &location.xml_fragment_lens,
                mz_count: location.mz_count,
                inten_count: location.inten_count,
            };
            let result = decompress_division(&input, &mz_pair, &inten_pair, source_compression, i);
            slots.lock().unwrap()[i] = Some(result);
        });
        pool.submit_job(job);
    }
    pool.jobs_completed();

    let results = Arc::try_unwrap(slots)
        .map_err(|_| codec_err(0, "thread pool left a dangling reference to the result slots"))?
        .into_inner()
        .unwrap();
    results
        .into_iter()
        .map(|slot| slot.expect("every division slot is filled before jobs_completed returns"))
        .collect()
}

fn split_fragments(raw: &[u8], lens: &[u64]) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity(lens.len());
    let mut cursor = 0usize;
    for &len in lens {
        let len = len as usize;
        out.push(raw[cursor..cursor + len].to_vec());
        cursor += len;
    }
    out
}

fn decode_binary_stream(
    raw: &[u8],
    transform: &TransformPair,
    source_compression: SourceCompression,
    count: usize,
    division_index: usize,
) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(count);
    let mut cursor = 0usize;
    for _ in 0..count {
        let remaining = &raw[cursor..];
        let len = transform.framed_len(remaining)?;
        let framed = &remaining[..len];
        cursor += len;
        let decoded = transform.decode(framed)?;
        let deflated = zlib_deflate(&decoded, source_compression)?;
        out.push(base64_encode(&deflated));
    }
    if cursor != raw.len() {
        return Err(codec_err(division_index, "binary stream had trailing bytes after the expected spectra"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{base64_encode, zlib_deflate};
    use crate::dispatch::dispatch;
    use crate::format::{Algorithm, NumericFormat, PositionList};

    /// Builds a division directly (bypassing the scanner) whose xml
    /// fragments and base64 text are hand-assembled so the pipeline's
    /// compress/decompress round trip can be checked in isolation.
    fn build_single_spectrum_division(mz_values: &[f64], inten_values: &[f64]) -> (Vec<u8>, Division) {
        let mz_bytes: Vec<u8> = mz_values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let inten_bytes: Vec<u8> = inten_values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mz_text = base64_encode(&zlib_deflate(&mz_bytes, SourceCompression::None).unwrap());
        let inten_text = base64_encode(&zlib_deflate(&inten_bytes, SourceCompression::None).unwrap());

        let mut input = Vec::new();
        input.extend_from_slice(b"<spectrum><binary>");
        let mz_start = input.len();
        input.extend_from_slice(mz_text.as_bytes());
        let mz_end = input.len();
        input.extend_from_slice(b"</binary></spectrum-mid><binary>");
        let inten_start = input.len();
        input.extend_from_slice(inten_text.as_bytes());
        let inten_end = input.len();
        input.extend_from_slice(b"</binary></spectrum>");
        let file_end = input.len() as u64;

        let mut xml = PositionList::new();
        xml.push(0, mz_start as u64);
        xml.push(mz_end as u64, inten_start as u64);
        xml.push(inten_end as u64, file_end);
        xml.file_end = file_end;

        let mut mz = PositionList::new();
        mz.push(mz_start as u64, mz_end as u64);
        mz.file_end = file_end;

        let mut inten = PositionList::new();
        inten.push(inten_start as u64, inten_end as u64);
        inten.file_end = file_end;

        (input, Division { xml, mz, inten })
    }

    #[test]
    fn compress_then_decompress_reproduces_original_bytes_for_lossless() {
        let (input, division) = build_single_spectrum_division(&[100.0, 200.5, 300.25], &[1.0, 2.0, 3.0]);
        let mz_pair = dispatch(Algorithm::Lossless, NumericFormat::F64).unwrap();
        let inten_pair = dispatch(Algorithm::Lossless, NumericFormat::F64).unwrap();

        let compressed = compress_division(
            &input,
            &division,
            &mz_pair,
            &inten_pair,
            SourceCompression::None,
            3,
            0,
        )
        .unwrap();

        let xml_fragment_lens: Vec<u64> = (0..division.xml.len())
            .map(|i| {
                let (s, e) = division.xml.span(i);
                e - s
            })
            .collect();

        let reconstructed = decompress_division(
            &CompressedDivisionInput {
                xml: &compressed.xml,
                mz: &compressed.mz,
                inten: &compressed.inten,
                xml_meta: compressed.xml_meta,
                mz_meta: compressed.mz_meta,
                inten_meta: compressed.inten_meta,
                xml_fragment_lens: &xml_fragment_lens,
                mz_count: division.mz.len(),
                inten_count: division.inten.len(),
            },
            &mz_pair,
            &inten_pair,
            SourceCompression::None,
            0,
        )
        .unwrap();

        assert_eq!(reconstructed, input);
    }

    #[test]
    fn parallel_compress_divisions_returns_results_in_division_order() {
        let (input_a, division_a) = build_single_spectrum_division(&[1.0, 2.0], &[3.0, 4.0]);
        let (input_b, _) = build_single_spectrum_division(&[5.0, 6.0], &[7.0, 8.0]);
        // Reuse division_a's shape against input_b would mismatch offsets,
        // so instead exercise the pool with two copies of the same division
        // against their own matching input.
        let _ = input_b;
        let mz_pair = dispatch(Algorithm::Lossless, NumericFormat::F64).unwrap();
        let inten_pair = dispatch(Algorithm::Lossless, NumericFormat::F64).unwrap();
        let divisions = vec![division_a.clone(), division_a];

        let pool = TPool::new(2, 4).unwrap();
        let results = compress_divisions(
            &input_a,
            &divisions,
            mz_pair,
            inten_pair,
            SourceCompression::None,
            3,
            &pool,
        )
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].mz, results[1].mz);
    }

    #[test]
    fn parallel_decompress_divisions_returns_results_in_division_order() {
        use crate::container::{DivisionPositions, BlockLengthTables};

        let (input, division) = build_single_spectrum_division(&[1.0, 2.0], &[3.0, 4.0]);
        let mz_pair = dispatch(Algorithm::Lossless, NumericFormat::F64).unwrap();
        let inten_pair = dispatch(Algorithm::Lossless, NumericFormat::F64).unwrap();

        let pool = TPool::new(2, 4).unwrap();
        let compressed = compress_divisions(
            &input,
            &[division.clone(), division.clone()],
            mz_pair,
            inten_pair,
            SourceCompression::None,
            3,
            &pool,
        )
        .unwrap();

        let mut file = Vec::new();
        for c in &compressed {
            file.extend_from_slice(&c.xml);
        }
        for c in &compressed {
            file.extend_from_slice(&c.mz);
        }
        for c in &compressed {
            file.extend_from_slice(&c.inten);
        }

        let tables = BlockLengthTables {
            xml: compressed.iter().map(|c| c.xml_meta).collect(),
            mz: compressed.iter().map(|c| c.mz_meta).collect(),
            inten: compressed.iter().map(|c| c.inten_meta).collect(),
        };
        let positions = vec![
            DivisionPositions { xml: division.xml.clone(), mz: division.mz.clone(), inten: division.inten.clone() },
            DivisionPositions { xml: division.xml.clone(), mz: division.mz.clone(), inten: division.inten.clone() },
        ];

        let xml_region_len: u64 = compressed.iter().map(|c| c.xml_meta.compressed_size).sum();
        let mz_region_len: u64 = compressed.iter().map(|c| c.mz_meta.compressed_size).sum();

        let pool = TPool::new(2, 4).unwrap();
        let results = decompress_divisions(
            &file,
            &tables,
            &positions,
            0,
            xml_region_len,
            xml_region_len + mz_region_len,
            mz_pair,
            inten_pair,
            SourceCompression::None,
            &pool,
        )
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], input);
        assert_eq!(results[1], input);
    }
}
