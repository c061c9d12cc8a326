//! Accelerators

#[macro_use]
extern crate log;

mod common;
mod index_bvh;
mod octree;

pub use common::*;
pub use index_bvh::*;
pub use octree::*;
