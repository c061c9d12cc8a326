//! Cache Errors

use thiserror::Error;

/// Failures raised while loading or saving a persistent cache file. A failed
/// load aborts the build step; no partially decoded cache is ever used.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Underlying file I/O failed.
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with the expected magic bytes.
    #[error("not a visibility cache file")]
    BadMagic,

    /// The file was written by an incompatible version.
    #[error("unsupported cache file version {0}")]
    UnsupportedVersion(u32),

    /// The file decoded cleanly but was not fully consumed.
    #[error("cache file has trailing data")]
    TrailingData,
}
