//! RGB Spectrum

use crate::base::Float;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub};

/// A radiance/flux value as a 3-channel RGB triple.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Spectrum {
    /// Red channel.
    pub r: Float,

    /// Green channel.
    pub g: Float,

    /// Blue channel.
    pub b: Float,
}

impl Spectrum {
    /// Black.
    pub const ZERO: Self = Self { r: 0.0, g: 0.0, b: 0.0 };

    /// Unit white.
    pub const ONE: Self = Self { r: 1.0, g: 1.0, b: 1.0 };

    /// Create a spectrum with all channels set to the same value.
    ///
    /// * `v` - The channel value.
    pub const fn new(v: Float) -> Self {
        Self { r: v, g: v, b: v }
    }

    /// Create a spectrum from individual channels.
    ///
    /// * `r` - Red channel.
    /// * `g` - Green channel.
    /// * `b` - Blue channel.
    pub const fn from_rgb(r: Float, g: Float, b: Float) -> Self {
        Self { r, g, b }
    }

    /// Returns `true` if every channel is zero.
    pub fn is_black(&self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }

    /// Returns the luminance (CIE Y) of the spectrum.
    pub fn y(&self) -> Float {
        0.212671 * self.r + 0.715160 * self.g + 0.072169 * self.b
    }

    /// Returns the largest channel value.
    pub fn max_component_value(&self) -> Float {
        self.r.max(self.g).max(self.b)
    }

    /// Returns `true` if any channel is NaN.
    pub fn has_nans(&self) -> bool {
        self.r.is_nan() || self.g.is_nan() || self.b.is_nan()
    }

    /// Returns `true` if any channel is infinite.
    pub fn is_infinite(&self) -> bool {
        self.r.is_infinite() || self.g.is_infinite() || self.b.is_infinite()
    }

    /// Returns `true` if any channel is negative.
    pub fn is_neg(&self) -> bool {
        self.r < 0.0 || self.g < 0.0 || self.b < 0.0
    }
}

impl Add for Spectrum {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::from_rgb(self.r + other.r, self.g + other.g, self.b + other.b)
    }
}

impl AddAssign for Spectrum {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Spectrum {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::from_rgb(self.r - other.r, self.g - other.g, self.b - other.b)
    }
}

impl Mul for Spectrum {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Self::from_rgb(self.r * other.r, self.g * other.g, self.b * other.b)
    }
}

impl MulAssign for Spectrum {
    fn mul_assign(&mut self, other: Self) {
        *self = *self * other;
    }
}

impl Mul<Float> for Spectrum {
    type Output = Self;

    fn mul(self, s: Float) -> Self {
        Self::from_rgb(self.r * s, self.g * s, self.b * s)
    }
}

impl Mul<Spectrum> for Float {
    type Output = Spectrum;

    fn mul(self, s: Spectrum) -> Spectrum {
        s * self
    }
}

impl MulAssign<Float> for Spectrum {
    fn mul_assign(&mut self, s: Float) {
        *self = *self * s;
    }
}

impl Div<Float> for Spectrum {
    type Output = Self;

    fn div(self, s: Float) -> Self {
        debug_assert!(s != 0.0);
        let inv = 1.0 / s;
        Self::from_rgb(self.r * inv, self.g * inv, self.b * inv)
    }
}

impl DivAssign<Float> for Spectrum {
    fn div_assign(&mut self, s: Float) {
        *self = *self / s;
    }
}

impl Sum for Spectrum {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, s| acc + s)
    }
}

impl fmt::Display for Spectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luminance_of_white_is_one() {
        assert!((Spectrum::ONE.y() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn black_detection() {
        assert!(Spectrum::ZERO.is_black());
        assert!(!Spectrum::from_rgb(0.0, 1e-8, 0.0).is_black());
    }
}
