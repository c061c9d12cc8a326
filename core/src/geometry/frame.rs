//! Shading Frames

use crate::geometry::{Normal3f, Vector3f};

/// An orthonormal coordinate frame with `z` along a shading normal, used to
/// move directions between local (shading) and world space.
#[derive(Copy, Clone, Debug)]
pub struct Frame {
    /// First tangent.
    pub x: Vector3f,

    /// Second tangent.
    pub y: Vector3f,

    /// The normal direction.
    pub z: Vector3f,
}

impl Frame {
    /// Build a frame around a normal, choosing tangents to avoid
    /// cancellation.
    ///
    /// * `n` - The normal.
    pub fn from_normal(n: &Normal3f) -> Self {
        let z = Vector3f::from(*n).normalize();
        let x = if z.x.abs() > z.y.abs() {
            Vector3f::new(-z.z, 0.0, z.x) / (z.x * z.x + z.z * z.z).sqrt()
        } else {
            Vector3f::new(0.0, z.z, -z.y) / (z.y * z.y + z.z * z.z).sqrt()
        };
        let y = z.cross(&x);
        Self { x, y, z }
    }

    /// Transform a direction from local frame coordinates to world space.
    ///
    /// * `v` - The local direction.
    pub fn to_world(&self, v: &Vector3f) -> Vector3f {
        self.x * v.x + self.y * v.y + self.z * v.z
    }

    /// Transform a world space direction into local frame coordinates.
    ///
    /// * `v` - The world direction.
    pub fn to_local(&self, v: &Vector3f) -> Vector3f {
        Vector3f::new(v.dot(&self.x), v.dot(&self.y), v.dot(&self.z))
    }
}
