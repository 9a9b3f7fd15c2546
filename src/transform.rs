//! Value-domain numeric transforms.
//!
//! Each transform is a pure function pair operating on a single spectrum's
//! numeric array at a time: `encode` runs at compress time and turns a raw
//! little-endian array into a self-describing framed buffer; `decode` runs
//! at decompress time and reverses it. Every framed buffer here starts with
//! a 4-byte little-endian element count (the `ZLIB_SIZE_OFFSET` container
//! contract), regardless of how narrow the quantized body is. This lets the
//! block pipeline ([`crate::pipeline`]) walk a concatenated stream
//! spectrum-by-spectrum without a separate side table of element counts.
//!
//! Other binding decisions (recorded in `DESIGN.md`):
//! - `log2` encodes with a single pass over the source array: a doubled
//!   inner-transform call with a double cursor advance, seen in one
//!   reference 64-bit encoder, is copy-paste duplication and is not
//!   reproduced here.
//! - `delta16`/`delta32` body arrays are indexed by delta number
//!   (`body[i-1]` holds `x[i] - x[i-1]` for `i` in `1..len`), matching the
//!   decoder's indexing rather than the encoder's off-by-one variant.

use crate::config::DELTA_SCALE_FACTOR;
use crate::error::{Error, Result};
use crate::format::{Algorithm, NumericFormat};

const COUNT_HEADER_BYTES: usize = 4;

fn codec_err(detail: impl Into<String>) -> Error {
    Error::CodecError { detail: detail.into(), division: None }
}

fn read_f32_array(src: &[u8]) -> Result<Vec<f32>> {
    if src.len() % 4 != 0 {
        return Err(codec_err("f32 array length not a multiple of 4"));
    }
    Ok(src.chunks_exact(4).map(|c| f32::from_le_bytes(c.try_into().unwrap())).collect())
}

fn read_f64_array(src: &[u8]) -> Result<Vec<f64>> {
    if src.len() % 8 != 0 {
        return Err(codec_err("f64 array length not a multiple of 8"));
    }
    Ok(src.chunks_exact(8).map(|c| f64::from_le_bytes(c.try_into().unwrap())).collect())
}

fn write_f32_array(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn write_f64_array(values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Whether a `(algorithm, format)` pair prepends a full-precision anchor
/// after the count header, and how wide the anchor is.
fn anchor_width(algo: Algorithm, fmt: NumericFormat) -> Option<usize> {
    match algo {
        Algorithm::Delta16 | Algorithm::Delta32 => Some(fmt.element_size()),
        _ => None,
    }
}

/// Width in bytes of one quantized delta code.
fn delta_code_width(algo: Algorithm) -> usize {
    match algo {
        Algorithm::Delta16 => 2,
        Algorithm::Delta32 => 4,
        _ => unreachable!("delta_code_width only called for delta algorithms"),
    }
}

/// Scans the start of `buf` (which holds one or more concatenated framed
/// buffers back to back) and returns the byte length of the first one,
/// without decoding it. Used by the block pipeline to slice a division's
/// concatenated mz/intensity stream back into per-spectrum chunks.
pub fn framed_len(algo: Algorithm, fmt: NumericFormat, buf: &[u8]) -> Result<usize> {
    if buf.len() < COUNT_HEADER_BYTES {
        return Err(codec_err("framed buffer shorter than the count header"));
    }
    let count = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;

    let body_len = match algo {
        Algorithm::Lossless => count * fmt.element_size(),
        Algorithm::Cast64To32 => count * 4,
        Algorithm::Log2 => count * 2,
        Algorithm::Delta16 | Algorithm::Delta32 => {
            count.saturating_sub(1) * delta_code_width(algo)
        }
    };
    let anchor_len = if count == 0 { 0 } else { anchor_width(algo, fmt).unwrap_or(0) };
    let total = COUNT_HEADER_BYTES + anchor_len + body_len;
    if buf.len() < total {
        return Err(codec_err("framed buffer shorter than its declared length"));
    }
    Ok(total)
}

/// Applies the compress-direction transform to one spectrum's raw numeric
/// array, returning a self-describing framed buffer (count header, optional
/// anchor, body).
pub fn encode(algo: Algorithm, fmt: NumericFormat, src: &[u8]) -> Result<Vec<u8>> {
    let count = (src.len() / fmt.element_size()) as u32;
    let mut out = Vec::with_capacity(COUNT_HEADER_BYTES + src.len());
    out.extend_from_slice(&count.to_le_bytes());

    match (algo, fmt) {
        (Algorithm::Lossless, _) => out.extend_from_slice(src),
        (Algorithm::Cast64To32, NumericFormat::F32) => out.extend_from_slice(src),
        (Algorithm::Cast64To32, NumericFormat::F64) => {
            let values = read_f64_array(src)?;
            out.extend(write_f32_array(&values.iter().map(|&v| v as f32).collect::<Vec<_>>()));
        }
        (Algorithm::Log2, NumericFormat::F32) => {
            out.extend(encode_log2(&read_f32_array(src)?));
        }
        (Algorithm::Log2, NumericFormat::F64) => {
            out.extend(encode_log2(&read_f64_array(src)?));
        }
        (Algorithm::Delta16, NumericFormat::F32) => {
            encode_delta_into(&mut out, &read_f32_array(src)?.into_iter().map(f64::from).collect::<Vec<_>>(), fmt, 2);
        }
        (Algorithm::Delta16, NumericFormat::F64) => {
            encode_delta_into(&mut out, &read_f64_array(src)?, fmt, 2);
        }
        (Algorithm::Delta32, NumericFormat::F32) => {
            encode_delta_into(&mut out, &read_f32_array(src)?.into_iter().map(f64::from).collect::<Vec<_>>(), fmt, 4);
        }
        (Algorithm::Delta32, NumericFormat::F64) => {
            encode_delta_into(&mut out, &read_f64_array(src)?, fmt, 4);
        }
    }
    Ok(out)
}

/// Reverses [`encode`], consuming exactly one framed buffer (as produced by
/// a single prior `encode` call, or sliced out of a concatenated stream via
/// [`framed_len`]).
pub fn decode(algo: Algorithm, fmt: NumericFormat, framed: &[u8]) -> Result<Vec<u8>> {
    if framed.len() < COUNT_HEADER_BYTES {
        return Err(codec_err("framed buffer shorter than the count header"));
    }
    let count = u32::from_le_bytes(framed[0..4].try_into().unwrap()) as usize;
    let body = &framed[COUNT_HEADER_BYTES..];

    match (algo, fmt) {
        (Algorithm::Lossless, _) => Ok(body.to_vec()),
        (Algorithm::Cast64To32, NumericFormat::F32) => Ok(body.to_vec()),
        (Algorithm::Cast64To32, NumericFormat::F64) => {
            let values = read_f32_array(body)?;
            if values.len() != count {
                return Err(codec_err("cast_64_to_32 decode length mismatch"));
            }
            Ok(write_f64_array(&values.iter().map(|&v| v as f64).collect::<Vec<_>>()))
        }
        (Algorithm::Log2, NumericFormat::F32) => {
            let codes = read_u16_body(body, count)?;
            Ok(write_f32_array(&decode_log2(&codes)))
        }
        (Algorithm::Log2, NumericFormat::F64) => {
            let codes = read_u16_body(body, count)?;
            let values: Vec<f64> = decode_log2(&codes).into_iter().map(|v| v as f64).collect();
            Ok(write_f64_array(&values))
        }
        (Algorithm::Delta16, NumericFormat::F32) => {
            let values = decode_delta(body, count, fmt, 2)?;
            Ok(write_f32_array(&values.iter().map(|&v| v as f32).collect::<Vec<_>>()))
        }
        (Algorithm::Delta16, NumericFormat::F64) => {
            Ok(write_f64_array(&decode_delta(body, count, fmt, 2)?))
        }
        (Algorithm::Delta32, NumericFormat::F32) => {
            let values = decode_delta(body, count, fmt, 4)?;
            Ok(write_f32_array(&values.iter().map(|&v| v as f32).collect::<Vec<_>>()))
        }
        (Algorithm::Delta32, NumericFormat::F64) => {
            Ok(write_f64_array(&decode_delta(body, count, fmt, 4)?))
        }
    }
}

fn encode_log2<T: Into<f64> + Copy>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for &v in values {
        let ltran: f64 = v.into();
        let q = (ltran.log2() * 100.0).floor() as i64;
        out.extend_from_slice(&(q as u16).to_le_bytes());
    }
    out
}

fn decode_log2(codes: &[u16]) -> Vec<f32> {
    codes.iter().map(|&q| 2f64.powf(q as f64 / 100.0) as f32).collect()
}

fn read_u16_body(body: &[u8], count: usize) -> Result<Vec<u16>> {
    if body.len() != count * 2 {
        return Err(codec_err("log2 body length mismatch"));
    }
    Ok(body.chunks_exact(2).map(|c| u16::from_le_bytes(c.try_into().unwrap())).collect())
}

/// Appends a delta-transformed buffer (anchor + quantized diffs) to `out`.
/// `code_width` is 2 for `delta16`, 4 for `delta32`.
fn encode_delta_into(out: &mut Vec<u8>, values: &[f64], fmt: NumericFormat, code_width: usize) {
    if values.is_empty() {
        return;
    }
    let anchor = values[0];
    match fmt {
        NumericFormat::F32 => out.extend_from_slice(&(anchor as f32).to_le_bytes()),
        NumericFormat::F64 => out.extend_from_slice(&anchor.to_le_bytes()),
    }
    for i in 1..values.len() {
        let diff = values[i] - values[i - 1];
        let q = (diff * DELTA_SCALE_FACTOR).floor() as i64;
        if code_width == 2 {
            out.extend_from_slice(&(q as u16).to_le_bytes());
        } else {
            out.extend_from_slice(&(q as u32).to_le_bytes());
        }
    }
}

fn decode_delta(body: &[u8], count: usize, fmt: NumericFormat, code_width: usize) -> Result<Vec<f64>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let anchor_len = fmt.element_size();
    if body.len() != anchor_len + (count - 1) * code_width {
        return Err(codec_err("delta body length mismatch"));
    }
    let anchor = match fmt {
        NumericFormat::F32 => f32::from_le_bytes(body[0..4].try_into().unwrap()) as f64,
        NumericFormat::F64 => f64::from_le_bytes(body[0..8].try_into().unwrap()),
    };
    let mut values = Vec::with_capacity(count);
    values.push(anchor);
    for i in 1..count {
        let off = anchor_len + (i - 1) * code_width;
        let diff = if code_width == 2 {
            u16::from_le_bytes(body[off..off + 2].try_into().unwrap()) as f64
        } else {
            u32::from_le_bytes(body[off..off + 4].try_into().unwrap()) as f64
        } / DELTA_SCALE_FACTOR;
        values.push(values[i - 1] + diff);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lossless_round_trips_f32() {
        let values = [1.0f32, 2.5, -3.25];
        let raw = write_f32_array(&values);
        let enc = encode(Algorithm::Lossless, NumericFormat::F32, &raw).unwrap();
        let dec = decode(Algorithm::Lossless, NumericFormat::F32, &enc).unwrap();
        assert_eq!(dec, raw);
    }

    #[test]
    fn cast_64_to_32_aliases_lossless_for_f32_source() {
        let values = [1.0f32, 2.0, 3.0];
        let raw = write_f32_array(&values);
        let enc = encode(Algorithm::Cast64To32, NumericFormat::F32, &raw).unwrap();
        let dec = decode(Algorithm::Cast64To32, NumericFormat::F32, &enc).unwrap();
        assert_eq!(dec, raw);
    }

    #[test]
    fn cast_64_to_32_downcasts_and_upcasts() {
        let values = [1.0f64, 2.5, 100.125];
        let raw = write_f64_array(&values);
        let enc = encode(Algorithm::Cast64To32, NumericFormat::F64, &raw).unwrap();
        let dec = decode(Algorithm::Cast64To32, NumericFormat::F64, &enc).unwrap();
        let round_tripped = read_f64_array(&dec).unwrap();
        for (a, b) in values.iter().zip(round_tripped.iter()) {
            assert!((*a as f32 as f64 - b).abs() < 1e-9);
        }
    }

    #[test]
    fn log2_round_trips_within_quantization_error() {
        let values = [1.0f32, 2.0, 1000.0, 0.5];
        let raw = write_f32_array(&values);
        let enc = encode(Algorithm::Log2, NumericFormat::F32, &raw).unwrap();
        let dec = decode(Algorithm::Log2, NumericFormat::F32, &enc).unwrap();
        let round_tripped = read_f32_array(&dec).unwrap();
        for (a, b) in values.iter().zip(round_tripped.iter()) {
            assert!((a - b).abs() / a < 0.01);
        }
    }

    #[test]
    fn delta16_anchor_is_full_precision() {
        let values = [100.0f64, 100.1, 100.3, 99.9];
        let raw = write_f64_array(&values);
        let enc = encode(Algorithm::Delta16, NumericFormat::F64, &raw).unwrap();
        let dec = decode(Algorithm::Delta16, NumericFormat::F64, &enc).unwrap();
        let round_tripped = read_f64_array(&dec).unwrap();
        assert_eq!(round_tripped[0], values[0]);
        for (a, b) in values.iter().zip(round_tripped.iter()) {
            assert!((a - b).abs() < 1.0);
        }
    }

    #[test]
    fn delta32_has_finer_quantization_than_delta16() {
        let values = [10.0f64, 10.0001, 10.0002];
        let raw = write_f64_array(&values);
        let enc16 = encode(Algorithm::Delta16, NumericFormat::F64, &raw).unwrap();
        let enc32 = encode(Algorithm::Delta32, NumericFormat::F64, &raw).unwrap();
        let dec16 = read_f64_array(&decode(Algorithm::Delta16, NumericFormat::F64, &enc16).unwrap()).unwrap();
        let dec32 = read_f64_array(&decode(Algorithm::Delta32, NumericFormat::F64, &enc32).unwrap()).unwrap();
        let err16: f64 = values.iter().zip(&dec16).map(|(a, b)| (a - b).abs()).sum();
        let err32: f64 = values.iter().zip(&dec32).map(|(a, b)| (a - b).abs()).sum();
        assert!(err32 <= err16);
    }

    #[test]
    fn framed_len_matches_encoded_buffer_size() {
        let values = [1.0f64, 2.0, 3.0, 4.0];
        let raw = write_f64_array(&values);
        for algo in [Algorithm::Lossless, Algorithm::Log2, Algorithm::Delta16, Algorithm::Delta32] {
            let enc = encode(algo, NumericFormat::F64, &raw).unwrap();
            let mut doubled = enc.clone();
            doubled.extend_from_slice(&enc);
            let len = framed_len(algo, NumericFormat::F64, &doubled).unwrap();
            assert_eq!(len, enc.len(), "algo {algo:?} framed_len mismatch");
        }
    }

    #[test]
    fn empty_array_round_trips_for_every_algorithm() {
        for algo in [Algorithm::Lossless, Algorithm::Log2, Algorithm::Delta16, Algorithm::Delta32] {
            let enc = encode(algo, NumericFormat::F64, &[]).unwrap();
            let dec = decode(algo, NumericFormat::F64, &enc).unwrap();
            assert!(dec.is_empty());
        }
    }
}
