//! Flat-byte-view abstraction over the input file.
//!
//! The scanner, divider, and pipeline all want the whole input as one
//! contiguous `&[u8]` — they never seek or stream. [`InputView`] lets the
//! CLI hand them a memory-mapped file in production while tests hand them a
//! plain `Vec<u8>`, without either side knowing which.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::Result;

/// A read-only, contiguous view of the entire input.
pub trait InputView {
    fn as_bytes(&self) -> &[u8];

    fn len(&self) -> usize {
        self.as_bytes().len()
    }

    fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Memory-mapped input file. The mapping stays open for the lifetime of the
/// value; the OS handles paging the file's actual bytes in as they are
/// touched by the scanner and pipeline.
pub struct MappedInput {
    mmap: Mmap,
}

impl MappedInput {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the file is not expected to be mutated by another process
        // for the duration of this run; mscompress treats its input as
        // read-only for the whole mapping's lifetime.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(MappedInput { mmap })
    }
}

impl InputView for MappedInput {
    fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }
}

/// In-memory stand-in for [`MappedInput`], used by tests that would rather
/// not touch the filesystem.
pub struct OwnedInput {
    bytes: Vec<u8>,
}

impl OwnedInput {
    pub fn new(bytes: Vec<u8>) -> Self {
        OwnedInput { bytes }
    }
}

impl InputView for OwnedInput {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_input_exposes_its_bytes() {
        let view = OwnedInput::new(b"hello".to_vec());
        assert_eq!(view.as_bytes(), b"hello");
        assert_eq!(view.len(), 5);
        assert!(!view.is_empty());
    }
}
