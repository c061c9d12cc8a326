//! Caches

#[macro_use]
extern crate log;

mod error;
mod scene_visibility;

pub mod photongi;
pub mod visibility;

pub use error::*;
pub use scene_visibility::*;

/// Returns the number of worker threads used by parallel build passes.
pub(crate) fn build_thread_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
