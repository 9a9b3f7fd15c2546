//! Compile-time configuration constants.
//!
//! Corresponds to the constant definitions scattered across `mscompress.h`
//! and `preprocess.c`.

/// Footer magic tag, read from the last 4 bytes of a container to confirm
/// the file is an mscompress container before trusting the rest of the
/// footer. Corresponds to `MAGIC_TAG` in `mscompress.h`.
pub const MAGIC_TAG: u32 = 0x035F_51B5;

/// Human-readable identification string embedded in the footer.
/// Corresponds to `MESSAGE` in `mscompress.h`.
pub const MESSAGE: &str = "MS Compress Format 1.0 Gao Laboratory at UIC";

/// Container format version, major component.
pub const FORMAT_VERSION_MAJOR: u16 = 1;
/// Container format version, minor component.
pub const FORMAT_VERSION_MINOR: u16 = 0;

/// Quantization scale applied to delta16/delta32 transforms before
/// truncating to an integer. Corresponds to `DELTA_SCALE_FACTOR` in
/// `mscompress.h`.
pub const DELTA_SCALE_FACTOR: f64 = 6_553.6; // 2^16 / 10

/// Default block size in bytes used when the `divisions` CLI option is left
/// at its default and the Divider must derive a division count from a byte
/// budget instead.
pub const BLOCKSIZE_DEFAULT: u64 = 4 * 1024 * 1024;

/// Default zstd compression level applied to every block.
pub const COMPRESSION_LEVEL_DEFAULT: i32 = 3;

/// Upper bound on worker threads accepted from configuration, matching
/// `NB_WORKERS_MAX`'s sanity ceiling.
pub const THREADS_MAX: usize = 200;
