//! Integrators

#[macro_use]
extern crate log;

#[cfg(test)]
mod fixtures;
mod sample_result;

pub mod path;

pub use sample_result::*;
