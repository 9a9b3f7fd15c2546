//! Data model shared by the scanner, divider, transform, and container
//! layers: numeric source precision, the per-stream transform algorithm
//! tag, position lists, and divisions.

use crate::error::{Error, Result};

/// On-disk precision of a numeric array before any transform is applied,
/// as declared by the mzML `cvParam` accession for that array.
/// Corresponds to the `_32i_`/`_16e_`/`_32f_`/`_64i_`/`_64d_` accession
/// family in `mscompress.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericFormat {
    F32,
    F64,
}

impl NumericFormat {
    pub fn element_size(self) -> usize {
        match self {
            NumericFormat::F32 => 4,
            NumericFormat::F64 => 8,
        }
    }
}

/// Source compression of the base64-decoded binary element, i.e. whether
/// the mzML producer additionally zlib-compressed the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCompression {
    None,
    Zlib,
}

/// Value-domain transform applied to a numeric array before the entropy
/// coder runs over it. The encode direction (compress) and decode direction
/// (decompress) are implemented in [`crate::transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Lossless,
    Cast64To32,
    Log2,
    Delta16,
    Delta32,
}

impl Algorithm {
    pub fn parse(name: &str) -> Result<Algorithm> {
        match name {
            "" | "lossless" => Ok(Algorithm::Lossless),
            "cast" => Ok(Algorithm::Cast64To32),
            "log" => Ok(Algorithm::Log2),
            "delta16" => Ok(Algorithm::Delta16),
            "delta32" => Ok(Algorithm::Delta32),
            other => Err(Error::ConfigError {
                detail: format!("unknown algorithm '{other}'"),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Lossless => "lossless",
            Algorithm::Cast64To32 => "cast_64_to_32",
            Algorithm::Log2 => "log2",
            Algorithm::Delta16 => "delta16",
            Algorithm::Delta32 => "delta32",
        }
    }
}

/// Per-run description of the mzML file's numeric layout, discovered by the
/// scanner's metadata pass and recorded verbatim in the container footer so
/// a decompress run does not need to re-scan the original XML.
#[derive(Debug, Clone)]
pub struct DataFormat {
    pub source_mz_fmt: NumericFormat,
    pub source_inten_fmt: NumericFormat,
    pub source_compression: SourceCompression,
    pub mz_algo: Algorithm,
    pub inten_algo: Algorithm,
    pub spectrum_count: u64,
}

/// A monotonically increasing list of `(start, end)` byte spans within the
/// original input, plus the file length the spans were measured against.
/// One `PositionList` exists per stream (xml, mz, inten) per division.
#[derive(Debug, Clone, Default)]
pub struct PositionList {
    pub start_positions: Vec<u64>,
    pub end_positions: Vec<u64>,
    pub file_end: u64,
}

impl PositionList {
    pub fn new() -> Self {
        PositionList::default()
    }

    pub fn push(&mut self, start: u64, end: u64) {
        debug_assert!(end >= start);
        self.start_positions.push(start);
        self.end_positions.push(end);
    }

    pub fn len(&self) -> usize {
        self.start_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start_positions.is_empty()
    }

    /// Sum of `end - start` over every span, the "weight" the Divider
    /// balances divisions by when the span list is a binary (mz/inten) one.
    pub fn total_weight(&self) -> u64 {
        self.start_positions
            .iter()
            .zip(&self.end_positions)
            .map(|(s, e)| e - s)
            .sum()
    }

    pub fn span(&self, i: usize) -> (u64, u64) {
        (self.start_positions[i], self.end_positions[i])
    }
}

/// One contiguous run of spectra assigned to a single worker. Holds the
/// three aligned position lists (xml framing, mz binary, intensity binary)
/// the pipeline slices the original input by.
#[derive(Debug, Clone, Default)]
pub struct Division {
    pub xml: PositionList,
    pub mz: PositionList,
    pub inten: PositionList,
}

impl Division {
    pub fn spectrum_count(&self) -> usize {
        self.mz.len()
    }
}
