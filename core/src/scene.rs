//! Scene Interface

use crate::base::Float;
use crate::bsdf::Bsdf;
use crate::geometry::{Bounds3f, Ray};
use crate::light::{ArcEnvLight, ArcLight, LightStrategy};
use crate::path::PathVolumeInfo;
use crate::spectrum::Spectrum;

/// The result of a scene intersection query. Transmission through crossed
/// pass-through surfaces and media accumulates into `connection_throughput`
/// whether or not anything solid was hit.
pub struct Intersection {
    /// Transmission accumulated along the queried segment.
    pub connection_throughput: Spectrum,

    /// The hit, if the ray struck solid geometry.
    pub hit: Option<SceneHit>,
}

/// A solid hit produced by a scene intersection query.
pub struct SceneHit {
    /// Parametric hit distance along the ray.
    pub t: Float,

    /// The BSDF context at the hit point.
    pub bsdf: Box<dyn Bsdf>,
}

/// Ray queries against the scene geometry. The intersection acceleration
/// structure lives outside this crate; the renderer only consumes this
/// interface.
pub trait Scene: Send + Sync {
    /// Intersect a ray with the scene. Pass-through surfaces are skipped
    /// inside this call, consuming `pass_through` and updating the volume
    /// stack; their transparency accumulates into the returned connection
    /// throughput.
    ///
    /// * `ray`          - The ray; `t_max` is updated on hit.
    /// * `vol_info`     - The path's volume stack.
    /// * `pass_through` - Random sample for pass-through events.
    fn intersect(&self, ray: &mut Ray, vol_info: &mut PathVolumeInfo, pass_through: Float) -> Intersection;

    /// Trace a shadow ray. Returns the accumulated transmission when the
    /// segment is clear, `None` when occluded.
    ///
    /// * `shadow_ray`   - The shadow ray segment.
    /// * `vol_info`     - The path's volume stack.
    /// * `pass_through` - Random sample for pass-through events.
    fn transmittance(
        &self,
        shadow_ray: &Ray,
        vol_info: &PathVolumeInfo,
        pass_through: Float,
    ) -> Option<Spectrum>;

    /// Returns the bounding box of the scene geometry.
    fn world_bound(&self) -> Bounds3f;

    /// Returns every light in the scene.
    fn lights(&self) -> &[ArcLight];

    /// Returns the environment lights in the scene.
    fn env_lights(&self) -> &[ArcEnvLight];

    /// Returns the strategy used to pick lights for direct light sampling.
    fn illuminate_strategy(&self) -> &LightStrategy;

    /// Returns the strategy used to pick lights for emission sampling.
    fn emit_strategy(&self) -> &LightStrategy;

    /// Returns the strategy restricted to environment lights, used for
    /// shadow catcher surfaces.
    fn infinite_strategy(&self) -> &LightStrategy;
}
