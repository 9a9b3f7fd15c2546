//! Command-line argument surface, built with `clap`'s derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{BLOCKSIZE_DEFAULT, COMPRESSION_LEVEL_DEFAULT, THREADS_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Compress,
    Decompress,
}

/// Parallel mzML compressor/decompressor.
#[derive(Debug, Parser)]
#[command(name = "mscompress", version, about, long_about = None)]
pub struct Cli {
    /// Whether to compress an mzML file or decompress an mscompress container.
    #[arg(value_enum)]
    pub mode: Mode,

    /// Input file path.
    pub input: PathBuf,

    /// Output file path. Defaults to `<input>.msz` for compress and
    /// `<input minus .msz>` for decompress.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Value-domain transform applied to both arrays, unless overridden
    /// per-role by `--mz-algorithm` / `--inten-algorithm`.
    #[arg(long, default_value = "lossless")]
    pub algorithm: String,

    /// Value-domain transform applied to the m/z array. Overrides
    /// `--algorithm` for this role only.
    #[arg(long)]
    pub mz_algorithm: Option<String>,

    /// Value-domain transform applied to the intensity array. Overrides
    /// `--algorithm` for this role only.
    #[arg(long)]
    pub inten_algorithm: Option<String>,

    /// Number of worker threads. Defaults to the number of logical cores.
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Number of divisions to split the spectrum list into. `0` derives a
    /// count from `--blocksize`.
    #[arg(long, default_value_t = 0)]
    pub divisions: usize,

    /// Target division size in bytes, used only when `--divisions` is `0`.
    #[arg(long, default_value_t = BLOCKSIZE_DEFAULT)]
    pub blocksize: u64,

    /// zstd compression level applied to every block region.
    #[arg(short = 'l', long, default_value_t = COMPRESSION_LEVEL_DEFAULT)]
    pub compression_level: i32,

    /// Increase log verbosity. Repeatable (`-v`, `-vv`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Resolves `--threads`, clamping to [`THREADS_MAX`] and falling back to
    /// the number of logical cores when unset.
    pub fn resolved_threads(&self) -> usize {
        let requested = self.threads.unwrap_or_else(num_cpus::get);
        requested.clamp(1, THREADS_MAX)
    }

    /// Effective m/z algorithm name: the per-role override if given,
    /// otherwise the shared `--algorithm` value.
    pub fn resolved_mz_algorithm(&self) -> &str {
        self.mz_algorithm.as_deref().unwrap_or(&self.algorithm)
    }

    /// Effective intensity algorithm name: the per-role override if given,
    /// otherwise the shared `--algorithm` value.
    pub fn resolved_inten_algorithm(&self) -> &str {
        self.inten_algorithm.as_deref().unwrap_or(&self.algorithm)
    }

    pub fn resolved_output(&self) -> PathBuf {
        if let Some(path) = &self.output {
            return path.clone();
        }
        match self.mode {
            Mode::Compress => {
                let mut path = self.input.clone().into_os_string();
                path.push(".msz");
                PathBuf::from(path)
            }
            Mode::Decompress => {
                let as_str = self.input.to_string_lossy();
                match as_str.strip_suffix(".msz") {
                    Some(stripped) => PathBuf::from(stripped),
                    None => PathBuf::from(format!("{as_str}.out")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn resolves_default_output_for_compress() {
        let cli = Cli::parse_from(["mscompress", "compress", "sample.mzML"]);
        assert_eq!(cli.resolved_output(), PathBuf::from("sample.mzML.msz"));
    }

    #[test]
    fn resolves_default_output_for_decompress() {
        let cli = Cli::parse_from(["mscompress", "decompress", "sample.mzML.msz"]);
        assert_eq!(cli.resolved_output(), PathBuf::from("sample.mzML"));
    }

    #[test]
    fn threads_default_falls_back_to_logical_cores() {
        let cli = Cli::parse_from(["mscompress", "compress", "sample.mzML"]);
        assert!(cli.resolved_threads() >= 1);
    }

    #[test]
    fn threads_are_clamped_to_the_configured_maximum() {
        let cli = Cli::parse_from(["mscompress", "compress", "sample.mzML", "--threads", "999999"]);
        assert_eq!(cli.resolved_threads(), THREADS_MAX);
    }

    #[test]
    fn per_role_algorithm_overrides_the_shared_default() {
        let cli = Cli::parse_from([
            "mscompress",
            "compress",
            "sample.mzML",
            "--algorithm",
            "delta16",
            "--mz-algorithm",
            "cast",
        ]);
        assert_eq!(cli.resolved_mz_algorithm(), "cast");
        assert_eq!(cli.resolved_inten_algorithm(), "delta16");
    }

    #[test]
    fn shared_algorithm_applies_to_both_roles_by_default() {
        let cli = Cli::parse_from(["mscompress", "compress", "sample.mzML", "--algorithm", "log"]);
        assert_eq!(cli.resolved_mz_algorithm(), "log");
        assert_eq!(cli.resolved_inten_algorithm(), "log");
    }
}
