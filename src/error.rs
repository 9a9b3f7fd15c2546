//! Crate-wide error type.
//!
//! Carries the division/spectrum index a failure occurred in, where
//! applicable, so diagnostics can point at the offending unit of work.
//! Hand-rolled `Display`/`Error` impls rather than a derive macro, matching
//! `frame::types::Lz4FError`'s style elsewhere in this codebase.

use std::fmt;
use std::io;

/// All error conditions that can surface from a compress or decompress run.
#[derive(Debug)]
pub enum Error {
    /// The input mzML could not be parsed into a `DataFormat` / position
    /// lists — truncated XML, missing `cvParam` accessions, or a boundary
    /// scan that could not locate a matching `<binary>`/`</binary>` pair.
    MalformedInput { detail: String, byte_offset: Option<u64> },
    /// A requested configuration is invalid or unsatisfiable (unknown
    /// algorithm name, zero threads, divisions smaller than thread count
    /// after normalization, etc).
    ConfigError { detail: String },
    /// A byte-codec or entropy-coder call failed (zlib inflate, zstd frame,
    /// or a numeric transform invariant was violated).
    CodecError { detail: String, division: Option<usize> },
    /// The underlying file or mapping could not be read or written.
    IoError { source: io::Error },
    /// A buffer allocation size computed from the input exceeded what the
    /// host could satisfy.
    AllocError { detail: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedInput { detail, byte_offset: Some(off) } => {
                write!(f, "malformed input at byte {off}: {detail}")
            }
            Error::MalformedInput { detail, byte_offset: None } => {
                write!(f, "malformed input: {detail}")
            }
            Error::ConfigError { detail } => write!(f, "invalid configuration: {detail}"),
            Error::CodecError { detail, division: Some(d) } => {
                write!(f, "codec error in division {d}: {detail}")
            }
            Error::CodecError { detail, division: None } => write!(f, "codec error: {detail}"),
            Error::IoError { source } => write!(f, "I/O error: {source}"),
            Error::AllocError { detail } => write!(f, "allocation error: {detail}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError { source } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::IoError { source }
    }
}

/// Maps a variant to the process exit code `main` reports, matching the
/// distinct-exit-code-per-kind requirement.
impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MalformedInput { .. } => 2,
            Error::ConfigError { .. } => 3,
            Error::CodecError { .. } => 4,
            Error::IoError { .. } => 5,
            Error::AllocError { .. } => 6,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
