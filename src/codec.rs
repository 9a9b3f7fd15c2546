//! Byte-level codecs: base64 (mzML's `<binary>` text encoding), zlib (the
//! source compression mzML producers optionally apply to a binary array),
//! and zstd (the entropy coder this crate's own container uses for every
//! block region). These three are independent layers — a division's mz
//! array may be base64+zlib in the source file and zstd in the output
//! container simultaneously.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::format::SourceCompression;

fn codec_err(detail: impl Into<String>) -> Error {
    Error::CodecError { detail: detail.into(), division: None }
}

pub fn base64_decode(text: &[u8]) -> Result<Vec<u8>> {
    BASE64_STANDARD
        .decode(text)
        .map_err(|e| codec_err(format!("base64 decode failed: {e}")))
}

pub fn base64_encode(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

/// Reverses the mzML producer's optional zlib compression of a binary
/// array's raw bytes (independent of this crate's own entropy coder).
pub fn zlib_inflate(bytes: &[u8], compression: SourceCompression) -> Result<Vec<u8>> {
    match compression {
        SourceCompression::None => Ok(bytes.to_vec()),
        SourceCompression::Zlib => {
            let mut decoder = ZlibDecoder::new(bytes);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| codec_err(format!("zlib inflate failed: {e}")))?;
            Ok(out)
        }
    }
}

pub fn zlib_deflate(bytes: &[u8], compression: SourceCompression) -> Result<Vec<u8>> {
    match compression {
        SourceCompression::None => Ok(bytes.to_vec()),
        SourceCompression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(bytes)
                .map_err(|e| codec_err(format!("zlib deflate failed: {e}")))?;
            encoder
                .finish()
                .map_err(|e| codec_err(format!("zlib deflate failed: {e}")))
        }
    }
}

/// Compresses a block region's bytes with the container's entropy coder.
pub fn block_compress(bytes: &[u8], level: i32) -> Result<Vec<u8>> {
    zstd::stream::encode_all(bytes, level).map_err(|e| codec_err(format!("zstd compress failed: {e}")))
}

/// Decompresses a block region to exactly `original_size` bytes.
pub fn block_decompress(bytes: &[u8], original_size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(original_size);
    let mut decoder = zstd::stream::read::Decoder::new(bytes)
        .map_err(|e| codec_err(format!("zstd decompress init failed: {e}")))?;
    decoder
        .read_to_end(&mut out)
        .map_err(|e| codec_err(format!("zstd decompress failed: {e}")))?;
    if out.len() != original_size {
        return Err(codec_err(format!(
            "zstd decompress produced {} bytes, expected {original_size}",
            out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips() {
        let data = b"mass spectrometry binary payload";
        let encoded = base64_encode(data);
        let decoded = base64_decode(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn zlib_round_trips_when_compressed() {
        let data = vec![7u8; 4096];
        let deflated = zlib_deflate(&data, SourceCompression::Zlib).unwrap();
        assert!(deflated.len() < data.len());
        let inflated = zlib_inflate(&deflated, SourceCompression::Zlib).unwrap();
        assert_eq!(inflated, data);
    }

    #[test]
    fn zlib_is_passthrough_when_uncompressed() {
        let data = b"raw bytes".to_vec();
        let out = zlib_inflate(&data, SourceCompression::None).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn zstd_block_round_trips() {
        let data = vec![42u8; 10_000];
        let compressed = block_compress(&data, 3).unwrap();
        let decompressed = block_decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }
}
