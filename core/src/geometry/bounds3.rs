//! 3-D Axis Aligned Bounding Boxes

use crate::base::Float;
use crate::geometry::{Point3f, Vector3f};

/// A 3-D axis aligned bounding box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds3f {
    /// Minimum corner.
    pub p_min: Point3f,

    /// Maximum corner.
    pub p_max: Point3f,
}

impl Bounds3f {
    /// An empty box (inverted extents so any union fixes it up).
    pub const EMPTY: Self = Self {
        p_min: Point3f::new(Float::INFINITY, Float::INFINITY, Float::INFINITY),
        p_max: Point3f::new(-Float::INFINITY, -Float::INFINITY, -Float::INFINITY),
    };

    /// Create a box from two corner points.
    ///
    /// * `p1` - First corner.
    /// * `p2` - Second corner.
    pub fn new(p1: Point3f, p2: Point3f) -> Self {
        Self {
            p_min: Point3f::new(p1.x.min(p2.x), p1.y.min(p2.y), p1.z.min(p2.z)),
            p_max: Point3f::new(p1.x.max(p2.x), p1.y.max(p2.y), p1.z.max(p2.z)),
        }
    }

    /// Create a degenerate box containing a single point.
    ///
    /// * `p` - The point.
    pub fn from_point(p: Point3f) -> Self {
        Self { p_min: p, p_max: p }
    }

    /// Returns the union with another box.
    ///
    /// * `other` - The other box.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            p_min: Point3f::new(
                self.p_min.x.min(other.p_min.x),
                self.p_min.y.min(other.p_min.y),
                self.p_min.z.min(other.p_min.z),
            ),
            p_max: Point3f::new(
                self.p_max.x.max(other.p_max.x),
                self.p_max.y.max(other.p_max.y),
                self.p_max.z.max(other.p_max.z),
            ),
        }
    }

    /// Returns the union with a point.
    ///
    /// * `p` - The point.
    pub fn union_point(&self, p: &Point3f) -> Self {
        self.union(&Self::from_point(*p))
    }

    /// Returns a box grown by a fixed margin on all sides.
    ///
    /// * `delta` - The margin.
    pub fn expand(&self, delta: Float) -> Self {
        let d = Vector3f::new(delta, delta, delta);
        Self {
            p_min: self.p_min - d,
            p_max: self.p_max + d,
        }
    }

    /// Returns `true` if the point lies inside the box (boundary included).
    ///
    /// * `p` - The point.
    pub fn contains(&self, p: &Point3f) -> bool {
        p.x >= self.p_min.x
            && p.x <= self.p_max.x
            && p.y >= self.p_min.y
            && p.y <= self.p_max.y
            && p.z >= self.p_min.z
            && p.z <= self.p_max.z
    }

    /// Returns `true` if the two boxes overlap.
    ///
    /// * `other` - The other box.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.p_min.x <= other.p_max.x
            && self.p_max.x >= other.p_min.x
            && self.p_min.y <= other.p_max.y
            && self.p_max.y >= other.p_min.y
            && self.p_min.z <= other.p_max.z
            && self.p_max.z >= other.p_min.z
    }

    /// Returns the vector from the minimum to the maximum corner.
    pub fn diagonal(&self) -> Vector3f {
        self.p_max - self.p_min
    }

    /// Returns the index of the axis with the largest extent.
    pub fn maximum_extent(&self) -> usize {
        let d = self.diagonal();
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }

    /// Returns the point midway between the two corners.
    pub fn centroid(&self) -> Point3f {
        Point3f::new(
            0.5 * (self.p_min.x + self.p_max.x),
            0.5 * (self.p_min.y + self.p_max.y),
            0.5 * (self.p_min.z + self.p_max.z),
        )
    }
}

impl Default for Bounds3f {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_point_grows_the_box() {
        let b = Bounds3f::EMPTY
            .union_point(&Point3f::new(1.0, 2.0, 3.0))
            .union_point(&Point3f::new(-1.0, 0.0, 5.0));
        assert_eq!(b.p_min, Point3f::new(-1.0, 0.0, 3.0));
        assert_eq!(b.p_max, Point3f::new(1.0, 2.0, 5.0));
    }

    #[test]
    fn contains_is_inclusive_of_boundary() {
        let b = Bounds3f::new(Point3f::ZERO, Point3f::new(1.0, 1.0, 1.0));
        assert!(b.contains(&Point3f::new(1.0, 1.0, 1.0)));
        assert!(b.contains(&Point3f::new(0.5, 0.0, 0.5)));
        assert!(!b.contains(&Point3f::new(1.0001, 0.5, 0.5)));
    }
}
