//! Pure mapping from a requested `(algorithm, source precision)` pair to
//! the transform functions that implement it. Holds no state and performs
//! no I/O, so configuration is validated entirely up front — before any
//! worker thread starts — matching the "validated once, at configuration
//! time" requirement on the dispatcher.

use crate::error::{Error, Result};
use crate::format::{Algorithm, NumericFormat};
use crate::transform;

/// A resolved transform: closures over [`crate::transform::encode`] /
/// [`crate::transform::decode`] bound to a specific `(algorithm, format)`
/// pair.
#[derive(Debug, Clone, Copy)]
pub struct TransformPair {
    pub algorithm: Algorithm,
    pub format: NumericFormat,
}

impl TransformPair {
    pub fn encode(&self, src: &[u8]) -> Result<Vec<u8>> {
        transform::encode(self.algorithm, self.format, src)
    }

    pub fn decode(&self, framed: &[u8]) -> Result<Vec<u8>> {
        transform::decode(self.algorithm, self.format, framed)
    }

    pub fn framed_len(&self, buf: &[u8]) -> Result<usize> {
        transform::framed_len(self.algorithm, self.format, buf)
    }
}

/// Validates and resolves a `(algorithm, format)` request.
///
/// `cast_64_to_32` is only meaningful when the source is `f64`; requesting
/// it against an `f32` source is accepted and treated identically to
/// `lossless` (already 32-bit, nothing to cast), not rejected, since it is
/// a harmless no-op rather than a configuration error. `(delta32, f64)` has
/// no defined quantization width and is explicitly rejected here.
pub fn dispatch(algorithm: Algorithm, format: NumericFormat) -> Result<TransformPair> {
    if algorithm == Algorithm::Delta32 && format == NumericFormat::F64 {
        return Err(Error::ConfigError {
            detail: "delta32 is not supported for an f64 source array".into(),
        });
    }
    Ok(TransformPair { algorithm, format })
}

/// Resolves both the mz and intensity transform pairs for a run, failing
/// fast if either algorithm name is unrecognized. This is the function the
/// CLI layer calls once, before any division work begins.
pub fn resolve(
    mz_algorithm: &str,
    inten_algorithm: &str,
    mz_format: NumericFormat,
    inten_format: NumericFormat,
) -> Result<(TransformPair, TransformPair)> {
    let mz_algo = Algorithm::parse(mz_algorithm)?;
    let inten_algo = Algorithm::parse(inten_algorithm)?;
    let mz = dispatch(mz_algo, mz_format)?;
    let inten = dispatch(inten_algo, inten_format)?;
    Ok((mz, inten))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_named_algorithms() {
        let (mz, inten) = resolve("delta16", "log", NumericFormat::F64, NumericFormat::F32).unwrap();
        assert_eq!(mz.algorithm, Algorithm::Delta16);
        assert_eq!(inten.algorithm, Algorithm::Log2);
    }

    #[test]
    fn rejects_unknown_algorithm_name() {
        let err = resolve("not-a-real-algo", "lossless", NumericFormat::F32, NumericFormat::F32);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_delta32_on_f64_source_before_any_work_starts() {
        let err = resolve("delta32", "lossless", NumericFormat::F64, NumericFormat::F32);
        assert!(matches!(err, Err(Error::ConfigError { .. })));
    }

    #[test]
    fn accepts_delta32_on_f32_source() {
        let (mz, _) = resolve("delta32", "lossless", NumericFormat::F32, NumericFormat::F32).unwrap();
        assert_eq!(mz.algorithm, Algorithm::Delta32);
    }
}
