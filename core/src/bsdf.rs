//! BSDF Interface

use crate::base::{Float, SHADOW_EPSILON};
use crate::geometry::{Normal3f, Point3f, Vector3f};
use crate::spectrum::Spectrum;
use bitflags::bitflags;

bitflags! {
    /// Scattering event classification produced by BSDF evaluation and
    /// sampling.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct BsdfEvent: u32 {
        const NONE = 0;
        const DIFFUSE = 1;
        const GLOSSY = 1 << 1;
        const SPECULAR = 1 << 2;
        const REFLECT = 1 << 3;
        const TRANSMIT = 1 << 4;
    }
}

/// The geometric context of a surface or in-volume scattering point.
#[derive(Copy, Clone, Debug, Default)]
pub struct SurfacePoint {
    /// World position.
    pub p: Point3f,

    /// Geometric normal.
    pub geometry_n: Normal3f,

    /// Interpolated shading normal, oriented toward the object exterior.
    pub shade_n: Normal3f,

    /// `true` when the incoming ray entered from the front side.
    pub into_object: bool,

    /// `true` for a scattering point inside a participating medium.
    pub is_volume: bool,
}

impl SurfacePoint {
    /// Returns the shading normal oriented toward the side the incoming ray
    /// landed on.
    pub fn landing_shade_n(&self) -> Normal3f {
        if self.into_object {
            self.shade_n
        } else {
            -self.shade_n
        }
    }

    /// Returns an origin for a ray leaving the point in the given direction,
    /// offset along the geometric normal to dodge self-intersection.
    ///
    /// * `dir` - The outgoing direction.
    pub fn ray_origin(&self, dir: &Vector3f) -> Point3f {
        let n = Vector3f::from(self.geometry_n);
        if n.dot(dir) >= 0.0 {
            self.p + n * SHADOW_EPSILON
        } else {
            self.p - n * SHADOW_EPSILON
        }
    }
}

/// The result of importance sampling a BSDF.
///
/// `value` already folds in `|cos θ| / pdf`, so path throughput updates are a
/// plain multiply.
#[derive(Clone, Debug)]
pub struct BsdfSample {
    /// Sampled incident direction.
    pub wi: Vector3f,

    /// BSDF value times `|cos θ|` over the sampling PDF.
    pub value: Spectrum,

    /// Solid-angle PDF of the sampled direction.
    pub pdf_w: Float,

    /// Scattering event classification of the sampled lobe.
    pub event: BsdfEvent,
}

/// Material scattering behavior at a scene intersection. Implementations live
/// outside this crate; the renderer only consumes this interface.
///
/// `evaluate` returns the BSDF value with `|cos θ|` folded in, alongside the
/// event classification and the solid-angle PDF of sampling `wi`.
pub trait Bsdf: Send + Sync {
    /// Returns the geometric context of the scattering point.
    fn surface_point(&self) -> &SurfacePoint;

    /// Evaluate the BSDF toward an incident direction.
    ///
    /// * `wi` - The incident direction.
    fn evaluate(&self, wi: &Vector3f) -> (Spectrum, BsdfEvent, Float);

    /// Importance sample an incident direction. Returns `None` for a
    /// degenerate (black or zero-probability) sample.
    ///
    /// * `u0` - First random sample.
    /// * `u1` - Second random sample.
    fn sample(&self, u0: Float, u1: Float) -> Option<BsdfSample>;

    /// Sample the pass-through continuation used by shadow catcher
    /// materials. Default: no shadow catcher behavior.
    fn shadow_catcher_sample(&self) -> Option<BsdfSample> {
        None
    }

    /// Returns the approximate reflectance used for Russian roulette and
    /// radiance caching.
    fn albedo(&self) -> Spectrum;

    /// Returns emitted radiance and its area-measure PDF when the hit
    /// surface is a light source.
    fn emitted_radiance(&self) -> (Spectrum, Float) {
        (Spectrum::ZERO, 0.0)
    }

    /// Returns the union of scattering events this BSDF can produce.
    fn event_types(&self) -> BsdfEvent;

    /// Returns the roughness in [0, 1] of the dominant glossy lobe; 0 for
    /// perfectly specular.
    fn glossiness(&self) -> Float {
        0.0
    }

    /// Returns `true` if all lobes are delta distributions.
    fn is_delta(&self) -> bool;

    /// Returns `true` for a scattering point inside a participating medium.
    fn is_volume(&self) -> bool {
        self.surface_point().is_volume
    }

    /// Returns `true` if the hit surface emits light.
    fn is_light_source(&self) -> bool {
        false
    }

    /// Returns the identifier of the light source when `is_light_source()`.
    fn light_id(&self) -> usize {
        0
    }

    /// Returns `true` for shadow catcher materials.
    fn is_shadow_catcher(&self) -> bool {
        false
    }

    /// Returns `true` if the object must not be connected to the camera by
    /// light subpaths.
    fn is_camera_invisible(&self) -> bool {
        false
    }

    /// Returns the interior volume entered when a transmission event crosses
    /// this surface.
    fn interior_volume(&self) -> Option<u32> {
        None
    }
}
