//! Rays

use crate::base::{Float, INFINITY, SHADOW_EPSILON};
use crate::geometry::{Point3f, Vector3f};

/// A ray with a parametric range `[t_min, t_max]` and an associated time used
/// for motion-blurred intersection queries.
#[derive(Copy, Clone, Debug)]
pub struct Ray {
    /// Origin.
    pub o: Point3f,

    /// Direction.
    pub d: Vector3f,

    /// Minimum parametric distance.
    pub t_min: Float,

    /// Maximum parametric distance.
    pub t_max: Float,

    /// Time associated with the ray.
    pub time: Float,
}

impl Ray {
    /// Create a new ray covering `[ε, ∞)`.
    ///
    /// * `o` - Origin.
    /// * `d` - Direction.
    pub fn new(o: Point3f, d: Vector3f) -> Self {
        Self {
            o,
            d,
            t_min: SHADOW_EPSILON,
            t_max: INFINITY,
            time: 0.0,
        }
    }

    /// Create a new ray covering a bounded segment, with the endpoints pulled
    /// in by the shadow epsilon.
    ///
    /// * `o`     - Origin.
    /// * `d`     - Direction.
    /// * `t_max` - Maximum parametric distance.
    /// * `time`  - Time associated with the ray.
    pub fn new_segment(o: Point3f, d: Vector3f, t_max: Float, time: Float) -> Self {
        Self {
            o,
            d,
            t_min: SHADOW_EPSILON,
            t_max: t_max - SHADOW_EPSILON,
            time,
        }
    }

    /// Returns the point along the ray at a parametric distance.
    ///
    /// * `t` - Parametric distance.
    pub fn at(&self, t: Float) -> Point3f {
        self.o + self.d * t
    }

    /// Re-aims the ray from a new origin along a new direction, resetting the
    /// parametric range.
    ///
    /// * `o` - New origin.
    /// * `d` - New direction.
    pub fn update(&mut self, o: Point3f, d: Vector3f) {
        self.o = o;
        self.d = d;
        self.t_min = SHADOW_EPSILON;
        self.t_max = INFINITY;
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self::new(Point3f::ZERO, Vector3f::new(0.0, 0.0, 1.0))
    }
}
