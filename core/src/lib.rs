//! Core

#[macro_use]
extern crate hexf;

// Re-export.
pub mod base;
pub mod bsdf;
pub mod camera;
pub mod film;
pub mod geometry;
pub mod light;
pub mod low_discrepency;
pub mod paramset;
pub mod path;
pub mod rng;
pub mod sampler;
pub mod sampling;
pub mod scene;
pub mod spectrum;
