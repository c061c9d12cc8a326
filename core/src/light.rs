//! Light Source Interface

use crate::base::*;
use crate::geometry::{Point2f, Point3f, Ray, Vector3f};
use crate::sampling::Distribution1D;
use crate::spectrum::Spectrum;
use std::sync::Arc;

/// The result of sampling a light source toward a receiving point.
#[derive(Clone, Debug)]
pub struct Illumination {
    /// Direction from the receiving point toward the light.
    pub dir: Vector3f,

    /// Distance to the sampled light point.
    pub distance: Float,

    /// Solid-angle PDF of the sampled direction.
    pub direct_pdf_w: Float,

    /// Unshadowed radiance arriving along `dir`.
    pub radiance: Spectrum,
}

/// The result of sampling an emitted light ray.
#[derive(Clone, Debug)]
pub struct Emission {
    /// The emitted ray, leaving the light surface.
    pub ray: Ray,

    /// Combined position/direction PDF of the emission sample.
    pub emit_pdf_w: Float,

    /// Emitted radiance along the ray.
    pub radiance: Spectrum,
}

/// A light source consumed by the integrator. Implementations live outside
/// this crate.
pub trait LightSource: Send + Sync {
    /// Returns the identifier assigned to this light.
    fn id(&self) -> usize;

    /// Sample a direction from a receiving point toward the light. Returns
    /// `None` for a degenerate sample.
    ///
    /// * `p`    - The receiving point.
    /// * `time` - Ray time.
    /// * `u`    - The random sample.
    fn illuminate(&self, p: &Point3f, time: Float, u: &Point2f) -> Option<Illumination>;

    /// Sample a light-carrying ray leaving the light. Returns `None` for a
    /// degenerate sample.
    ///
    /// * `u0`   - Position sample.
    /// * `u1`   - Direction sample.
    /// * `time` - Ray time.
    fn emit(&self, u0: &Point2f, u1: &Point2f, time: Float) -> Option<Emission>;

    /// Returns the solid-angle PDF of `illuminate` producing direction `wi`
    /// from point `p`.
    ///
    /// * `p`  - The receiving point.
    /// * `wi` - The direction toward the light.
    fn direct_pdf(&self, p: &Point3f, wi: &Vector3f) -> Float;

    /// Returns the total emitted power, used for power-weighted light
    /// selection.
    fn power(&self) -> Spectrum;

    /// Returns `true` for environment (infinite) lights.
    fn is_environmental(&self) -> bool {
        false
    }

    /// Returns `true` if `illuminate` samples a delta distribution.
    fn is_delta(&self) -> bool {
        false
    }

    /// Returns `true` if rays can intersect the light geometry directly.
    fn is_intersectable(&self) -> bool {
        false
    }

    /// Visibility of the light to indirect diffuse bounces.
    fn is_visible_indirect_diffuse(&self) -> bool {
        true
    }

    /// Visibility of the light to indirect glossy bounces.
    fn is_visible_indirect_glossy(&self) -> bool {
        true
    }

    /// Visibility of the light to indirect specular bounces.
    fn is_visible_indirect_specular(&self) -> bool {
        true
    }

    /// Returns the average transparency of materials between the light and
    /// the scene, folded into MIS weights.
    fn avg_pass_through_transparency(&self) -> Float {
        1.0
    }

    /// Returns the environment-light view of this light, when it is one.
    fn as_env(&self) -> Option<&dyn EnvLight> {
        None
    }
}

/// An environment light looked up by direction, parameterized over the
/// latitude-longitude unit square.
pub trait EnvLight: LightSource {
    /// Returns the radiance arriving from a world direction, with the
    /// solid-angle PDF of `illuminate` producing it.
    ///
    /// * `dir` - Direction toward the environment.
    fn radiance(&self, dir: &Vector3f) -> (Spectrum, Float);

    /// Transform a world direction into the light's local frame. Identity by
    /// default; lights carrying an orientation override this.
    ///
    /// * `dir` - The world direction.
    fn to_local(&self, dir: &Vector3f) -> Vector3f {
        *dir
    }

    /// Transform a light-local direction into the world frame.
    ///
    /// * `dir` - The local direction.
    fn to_world(&self, dir: &Vector3f) -> Vector3f {
        *dir
    }
}

pub type ArcLight = Arc<dyn LightSource>;
pub type ArcEnvLight = Arc<dyn EnvLight>;

/// Maps a unit direction to the latitude-longitude unit square, returning
/// `(u, v)` and the solid-angle density of the mapping. The density is zero
/// at the poles.
///
/// * `dir` - The direction.
pub fn to_lat_long_mapping(dir: &Vector3f) -> (Float, Float, Float) {
    let theta = clamp(dir.z, -1.0, 1.0).acos();
    let phi = dir.y.atan2(dir.x);
    let phi = if phi < 0.0 { phi + TWO_PI } else { phi };

    let sin_theta = theta.sin();
    let pdf = if sin_theta == 0.0 {
        0.0
    } else {
        1.0 / (2.0 * PI * PI * sin_theta)
    };

    (phi * INV_TWO_PI, theta * INV_PI, pdf)
}

/// Maps latitude-longitude coordinates back to a unit direction, returning
/// the direction and the solid-angle density of the mapping.
///
/// * `u` - Longitude coordinate in [0, 1).
/// * `v` - Latitude coordinate in [0, 1).
pub fn from_lat_long_mapping(u: Float, v: Float) -> (Vector3f, Float) {
    let phi = u * TWO_PI;
    let theta = v * PI;
    let sin_theta = theta.sin();

    let dir = Vector3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), theta.cos());
    let pdf = if sin_theta == 0.0 {
        0.0
    } else {
        1.0 / (2.0 * PI * PI * sin_theta)
    };

    (dir, pdf)
}

/// Picks lights with probability proportional to emitted power.
pub struct LightStrategy {
    lights: Vec<ArcLight>,
    distribution: Option<Distribution1D>,
}

impl LightStrategy {
    /// Build the strategy for a set of lights.
    ///
    /// * `lights` - The lights.
    pub fn new(lights: Vec<ArcLight>) -> Self {
        let distribution = if lights.is_empty() {
            None
        } else {
            let power: Vec<Float> = lights.iter().map(|light| light.power().y()).collect();
            Some(Distribution1D::new(&power))
        };
        Self { lights, distribution }
    }

    /// Returns the lights this strategy selects among.
    pub fn lights(&self) -> &[ArcLight] {
        &self.lights
    }

    /// Pick one light. Returns the light and its selection probability, or
    /// `None` when there are no lights or the pick is degenerate.
    ///
    /// * `u` - The random sample.
    pub fn sample_lights(&self, u: Float) -> Option<(&ArcLight, Float)> {
        let distribution = self.distribution.as_ref()?;
        let (index, pdf, _) = distribution.sample_discrete(u);
        if pdf == 0.0 {
            None
        } else {
            Some((&self.lights[index], pdf))
        }
    }

    /// Returns the selection probability of a given light.
    ///
    /// * `light_id` - The light identifier.
    pub fn sample_light_pdf(&self, light_id: usize) -> Float {
        match self.distribution.as_ref() {
            Some(distribution) => self
                .lights
                .iter()
                .position(|l| l.id() == light_id)
                .map_or(0.0, |index| distribution.discrete_pdf(index)),
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lat_long_mapping_round_trips() {
        for &(x, y, z) in &[(1.0, 0.0, 0.0), (0.0, 1.0, 0.0), (0.3, -0.4, 0.5)] {
            let dir = Vector3f::new(x, y, z).normalize();
            let (u, v, pdf) = to_lat_long_mapping(&dir);
            assert!(pdf > 0.0);
            let (back, back_pdf) = from_lat_long_mapping(u, v);
            assert!((back - dir).length() < 1e-4);
            assert!((back_pdf - pdf).abs() < 1e-4 * pdf.max(1.0));
        }
    }

    #[test]
    fn pole_directions_have_zero_mapping_pdf() {
        let (_, _, pdf) = to_lat_long_mapping(&Vector3f::new(0.0, 0.0, 1.0));
        assert_eq!(pdf, 0.0);
    }
}
