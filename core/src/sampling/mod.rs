//! Sampling

mod common;
mod distribution_1d;
mod distribution_2d;

pub use common::*;
pub use distribution_1d::*;
pub use distribution_2d::*;
