//! 2-D Points

use crate::base::Float;
use std::ops::Index;

/// A 2-D point with single precision coordinates, used for samples and map
/// parameterizations.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Point2f {
    /// X-coordinate.
    pub x: Float,

    /// Y-coordinate.
    pub y: Float,
}

impl Point2f {
    /// The origin.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new point.
    ///
    /// * `x` - X-coordinate.
    /// * `y` - Y-coordinate.
    pub const fn new(x: Float, y: Float) -> Self {
        Self { x, y }
    }
}

impl Index<usize> for Point2f {
    type Output = Float;

    /// Indexes the coordinates as x=0, y=1.
    fn index(&self, axis: usize) -> &Float {
        match axis {
            0 => &self.x,
            1 => &self.y,
            _ => panic!("invalid point axis {axis}"),
        }
    }
}
