//! Base types and numeric helpers shared across the renderer.

mod common;

pub use common::*;
