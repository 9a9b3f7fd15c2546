//! Partitions the whole-file position lists into balanced divisions.
//!
//! Grounded on `preprocess.c::get_binary_divisions`: division weight is the
//! sum of `(end - start)` over the binary (mz + intensity) spans only — the
//! xml framing span is along for the ride but never counted, since xml text
//! compresses far better than binary payload and including it would skew
//! the balance toward divisions with more spectra rather than more bytes.

use crate::error::{Error, Result};
use crate::format::{Division, PositionList};
use crate::scanner::slice_division;

/// Result of [`partition`]: the divisions themselves, plus the thread count
/// the caller should actually spin up a worker pool with.
pub struct Partitioned {
    pub divisions: Vec<Division>,
    /// The `threads` argument, reduced to match `divisions.len()` when the
    /// division count had to be capped below it (e.g. fewer spectra than
    /// requested threads). Never larger than the input `threads`.
    pub threads: usize,
}

/// Resolves the effective division count and splits the scanner's
/// whole-file position lists into that many [`Division`]s, each a
/// contiguous run of spectra with roughly equal mz+intensity byte weight.
///
/// - `divisions == 0` asks the divider to derive a count from `blocksize`:
///   `ceil(file_end / blocksize)`.
/// - If the resolved division count is smaller than `threads`, it is
///   raised to `threads` so no worker is ever left idle.
/// - If the final division count still ends up below `threads` (there are
///   fewer spectra than requested threads), the returned [`Partitioned`]
///   reports a reduced effective thread count so the caller never starts
///   more workers than there are divisions to hand them.
pub fn partition(
    xml: &PositionList,
    mz: &PositionList,
    inten: &PositionList,
    divisions: usize,
    blocksize: u64,
    threads: usize,
) -> Result<Partitioned> {
    if threads == 0 {
        return Err(Error::ConfigError { detail: "threads must be >= 1".into() });
    }
    let spectrum_count = mz.len();
    if spectrum_count == 0 {
        return Err(Error::MalformedInput {
            detail: "no spectra found in input".into(),
            byte_offset: None,
        });
    }

    let file_end = mz.file_end.max(1);
    let mut resolved_divisions = if divisions == 0 {
        let blocksize = blocksize.max(1);
        ((file_end + blocksize - 1) / blocksize) as usize
    } else {
        divisions
    };
    if resolved_divisions < threads {
        resolved_divisions = threads;
    }
    resolved_divisions = resolved_divisions.min(spectrum_count).max(1);

    let total_weight = mz.total_weight() + inten.total_weight();
    let target_weight = (total_weight / resolved_divisions as u64).max(1);

    let mut out = Vec::with_capacity(resolved_divisions);
    let mut spectrum_start = 0usize;
    let mut running_weight = 0u64;

    for i in 0..spectrum_count {
        let (mz_s, mz_e) = mz.span(i);
        let (in_s, in_e) = inten.span(i);
        running_weight += (mz_e - mz_s) + (in_e - in_s);

        let divisions_remaining = resolved_divisions - out.len();
        let is_last_division = divisions_remaining <= 1;
        // Spectra left *after this one*, i.e. what would remain open for
        // the still-open divisions if a split happened here. Unlike
        // `spectrum_count - spectrum_start`, this advances every iteration
        // instead of staying frozen until the next split, so the guard
        // below can't permanently stall once the two counts first meet.
        let spectra_remaining = spectrum_count - (i + 1);

        if !is_last_division && running_weight >= target_weight && spectra_remaining >= divisions_remaining - 1 {
            out.push(slice_division(xml, mz, inten, spectrum_start, i + 1));
            spectrum_start = i + 1;
            running_weight = 0;
        }
    }

    if spectrum_start < spectrum_count {
        out.push(slice_division(xml, mz, inten, spectrum_start, spectrum_count));
    }

    let effective_threads = threads.min(out.len());
    Ok(Partitioned { divisions: out, threads: effective_threads })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds whole-file position lists in the real scanner's xml-fragment
    /// layout (`xml.len() == 2*n + 1`), matching what `scan_boundaries`
    /// would produce for `n` uniformly-sized spectra.
    fn make_uniform_lists(n: usize, span_len: u64) -> (PositionList, PositionList, PositionList) {
        let mut xml = PositionList::new();
        let mut mz = PositionList::new();
        let mut inten = PositionList::new();
        let mut off = 0u64;
        for _ in 0..n {
            xml.push(off, off + 5);
            off += 5;
            mz.push(off, off + span_len);
            off += span_len;
            xml.push(off, off + 5);
            off += 5;
            inten.push(off, off + span_len);
            off += span_len;
        }
        xml.push(off, off + 5);
        off += 5;
        xml.file_end = off;
        mz.file_end = off;
        inten.file_end = off;
        (xml, mz, inten)
    }

    #[test]
    fn splits_into_requested_division_count() {
        let (xml, mz, inten) = make_uniform_lists(100, 100);
        let result = partition(&xml, &mz, &inten, 4, 0, 1).unwrap();
        assert_eq!(result.divisions.len(), 4);
        assert_eq!(result.threads, 1);
        let total: usize = result.divisions.iter().map(|d| d.spectrum_count()).sum();
        assert_eq!(total, 100);
    }

    /// With only 10 spectra and a weight target that needs 2 spectra per
    /// division to clear, the achievable division count (3) lands below the
    /// requested thread count (8). The returned thread count must follow it
    /// down rather than leave idle workers, matching
    /// `preprocess.c::get_binary_divisions`'s trailing `if (*divisions <
    /// *threads) *threads = *divisions;` correction.
    #[test]
    fn reduces_thread_count_when_achievable_divisions_fall_short() {
        let (xml, mz, inten) = make_uniform_lists(10, 100);
        let result = partition(&xml, &mz, &inten, 2, 0, 8).unwrap();
        assert!(result.divisions.len() < 8);
        assert_eq!(result.threads, result.divisions.len());
    }

    #[test]
    fn zero_divisions_derives_count_from_blocksize() {
        let (xml, mz, inten) = make_uniform_lists(100, 100);
        // total weight = 100 * 200 = 20000 bytes across file span.
        let result = partition(&xml, &mz, &inten, 0, 5_000, 1).unwrap();
        assert!(result.divisions.len() >= 2);
    }

    #[test]
    fn every_spectrum_is_assigned_to_exactly_one_division() {
        let (xml, mz, inten) = make_uniform_lists(37, 50);
        let result = partition(&xml, &mz, &inten, 5, 0, 1).unwrap();
        let total: usize = result.divisions.iter().map(|d| d.spectrum_count()).sum();
        assert_eq!(total, 37);
    }

    #[test]
    fn every_division_satisfies_the_xml_count_invariant() {
        let (xml, mz, inten) = make_uniform_lists(37, 50);
        let result = partition(&xml, &mz, &inten, 5, 0, 1).unwrap();
        for d in &result.divisions {
            assert_eq!(d.xml.len(), 2 * d.spectrum_count() + 1);
            assert_eq!(d.mz.len(), d.inten.len());
        }
    }
}
