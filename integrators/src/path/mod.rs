//! Path Tracer
//!
//! Monte Carlo path integrator: traces eye subpaths with next-event
//! estimation and multiple importance sampling, optionally traces light
//! subpaths connected to the camera under hybrid back/forward routing, and
//! consumes the photon and environment-visibility caches.

mod eye;
mod light;

use lumen_caches::photongi::PhotonGICache;
use lumen_caches::visibility::EnvVisibilityCache;
use lumen_core::base::*;
use lumen_core::bsdf::{Bsdf, BsdfEvent};
use lumen_core::light::LightSource;
use lumen_core::paramset::ParamSet;
use lumen_core::path::PathDepthInfo;
use std::sync::Arc;

/// Sampler dimensions consumed before the first eye path vertex.
pub const EYE_SAMPLE_BOOT_SIZE: usize = 5;

/// Sampler dimensions consumed per eye path vertex.
pub const EYE_SAMPLE_STEP_SIZE: usize = 9;

/// Sampler dimensions consumed before the first light path vertex.
pub const LIGHT_SAMPLE_BOOT_SIZE: usize = 13;

/// Sampler dimensions consumed per light path vertex.
pub const LIGHT_SAMPLE_STEP_SIZE: usize = 5;

/// Outcome of one next-event estimation attempt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DirectLightResult {
    /// The light sample contributed radiance.
    Illuminated,

    /// The shadow ray was blocked.
    Shadowed,

    /// The sample was degenerate or the light not sampleable from here.
    NotVisible,
}

/// The path tracing integrator. Immutable while rendering; every worker
/// thread drives its own paths through a shared reference.
pub struct PathTracer {
    /// Per-bounce-type depth caps.
    pub max_path_depth: PathDepthInfo,

    /// Depth after which Russian roulette starts.
    pub rr_depth: u32,

    /// Russian roulette importance cap.
    pub rr_importance_cap: Float,

    /// Variance clamping bound, applied by the film; 0 disables.
    pub sqrt_variance_clamp_max_value: Float,

    /// Return black instead of environment radiance for camera rays that
    /// only crossed pass-through surfaces.
    pub force_black_background: bool,

    /// Defer caustic-like transport to light subpaths.
    pub hybrid_back_forward_enable: bool,

    /// Fraction of rendering devoted to eye subpaths under hybrid mode.
    pub hybrid_back_forward_partition: Float,

    /// Glossiness below which a glossy bounce counts as caustic transport.
    pub hybrid_back_forward_glossiness_threshold: Float,

    photon_gi: Option<Arc<PhotonGICache>>,
    env_visibility: Option<Arc<EnvVisibilityCache>>,
}

impl PathTracer {
    /// Attach the photon GI cache.
    ///
    /// * `cache` - The cache, or `None` to disable.
    pub fn set_photon_gi_cache(&mut self, cache: Option<Arc<PhotonGICache>>) {
        self.photon_gi = cache;
    }

    /// Attach the environment visibility cache.
    ///
    /// * `cache` - The cache, or `None` to disable.
    pub fn set_env_visibility_cache(&mut self, cache: Option<Arc<EnvVisibilityCache>>) {
        self.env_visibility = cache;
    }

    /// Returns the attached photon GI cache.
    pub fn photon_gi_cache(&self) -> Option<&Arc<PhotonGICache>> {
        self.photon_gi.as_ref()
    }

    /// Returns the number of sampler dimensions an eye sample consumes.
    pub fn eye_sample_size(&self) -> usize {
        EYE_SAMPLE_BOOT_SIZE + (self.max_path_depth.depth as usize + 1) * EYE_SAMPLE_STEP_SIZE
    }

    /// Returns the number of sampler dimensions a light sample consumes.
    pub fn light_sample_size(&self) -> usize {
        LIGHT_SAMPLE_BOOT_SIZE + self.max_path_depth.depth as usize * LIGHT_SAMPLE_STEP_SIZE
    }

    /// Classify whether the path is still a specular/glossy caustic
    /// candidate after a scattering event, for hybrid back/forward routing.
    ///
    /// * `is_specular_glossy_caustic_path` - Classification carried so far.
    /// * `bsdf`                            - The BSDF at the vertex.
    /// * `last_event`                      - The sampled event.
    /// * `depth_info`                      - The path depth counters.
    pub fn is_still_specular_glossy_caustic_path(
        &self,
        is_specular_glossy_caustic_path: bool,
        bsdf: &dyn Bsdf,
        last_event: BsdfEvent,
        depth_info: &PathDepthInfo,
    ) -> bool {
        // First bounce condition.
        if depth_info.depth == 0 {
            return last_event.contains(BsdfEvent::DIFFUSE)
                || (last_event.contains(BsdfEvent::GLOSSY)
                    && bsdf.glossiness() > self.hybrid_back_forward_glossiness_threshold);
        }

        // All other bounce conditions.
        is_specular_glossy_caustic_path
            && (last_event.contains(BsdfEvent::SPECULAR)
                || (last_event.contains(BsdfEvent::GLOSSY)
                    && bsdf.glossiness() <= self.hybrid_back_forward_glossiness_threshold))
    }

    /// Returns `true` when a direct light hit along an indirect bounce is
    /// visible according to the light's per-type visibility flags.
    ///
    /// * `light`      - The hit light.
    /// * `depth_info` - Depth counters of the path to the hit.
    /// * `last_event` - Event of the bounce that reached the light.
    pub(crate) fn check_direct_hit_visibility_flags<L: LightSource + ?Sized>(
        light: &L,
        depth_info: &PathDepthInfo,
        last_event: BsdfEvent,
    ) -> bool {
        if depth_info.depth == 0 {
            return true;
        }

        (last_event.contains(BsdfEvent::DIFFUSE) && light.is_visible_indirect_diffuse())
            || (last_event.contains(BsdfEvent::GLOSSY) && light.is_visible_indirect_glossy())
            || (last_event.contains(BsdfEvent::SPECULAR) && light.is_visible_indirect_specular())
    }
}

impl From<&ParamSet> for PathTracer {
    /// Create a `PathTracer` from a parameter set.
    ///
    /// * `params` - The parameter set.
    fn from(params: &ParamSet) -> Self {
        // Path depth settings, with the legacy single-cap fallback.
        let mut max_path_depth = PathDepthInfo {
            depth: max(0, params.find_one_int("path.pathdepth.total", 6)) as u32,
            diffuse_depth: max(0, params.find_one_int("path.pathdepth.diffuse", 4)) as u32,
            glossy_depth: max(0, params.find_one_int("path.pathdepth.glossy", 4)) as u32,
            specular_depth: max(0, params.find_one_int("path.pathdepth.specular", 6)) as u32,
        };
        if params.is_defined("path.maxdepth")
            && !params.is_defined("path.pathdepth.total")
            && !params.is_defined("path.pathdepth.diffuse")
            && !params.is_defined("path.pathdepth.glossy")
            && !params.is_defined("path.pathdepth.specular")
        {
            let depth = max(0, params.find_one_int("path.maxdepth", 6)) as u32;
            max_path_depth = PathDepthInfo {
                depth,
                diffuse_depth: depth,
                glossy_depth: depth,
                specular_depth: depth,
            };
        }

        // Russian roulette settings.
        let rr_depth = max(1, params.find_one_int("path.russianroulette.depth", 3)) as u32;
        let rr_importance_cap = clamp(params.find_one_float("path.russianroulette.cap", 0.5), 0.0, 1.0);

        // Clamping settings. The old radiance clamping key is honored as
        // variance clamping when the new key is absent.
        let mut sqrt_variance_clamp_max_value =
            params.find_one_float("path.clamping.radiance.maxvalue", 0.0);
        if params.is_defined("path.clamping.variance.maxvalue") {
            sqrt_variance_clamp_max_value = params.find_one_float("path.clamping.variance.maxvalue", 0.0);
        }
        let sqrt_variance_clamp_max_value = max(0.0, sqrt_variance_clamp_max_value);

        let hybrid_back_forward_enable = params.find_one_bool("path.hybridbackforward.enable", false);

        Self {
            max_path_depth,
            rr_depth,
            rr_importance_cap,
            sqrt_variance_clamp_max_value,
            force_black_background: params.find_one_bool("path.forceblackbackground.enable", false),
            hybrid_back_forward_enable,
            hybrid_back_forward_partition: clamp(
                params.find_one_float("path.hybridbackforward.partition", 0.8),
                0.0,
                1.0,
            ),
            hybrid_back_forward_glossiness_threshold: clamp(
                params.find_one_float("path.hybridbackforward.glossinessthreshold", 0.05),
                0.0,
                1.0,
            ),
            photon_gi: None,
            env_visibility: None,
        }
    }
}

impl Default for PathTracer {
    fn default() -> Self {
        Self::from(&ParamSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn defaults_match_documented_values() {
        let tracer = PathTracer::default();
        assert_eq!(tracer.max_path_depth.depth, 6);
        assert_eq!(tracer.max_path_depth.diffuse_depth, 4);
        assert_eq!(tracer.rr_depth, 3);
        assert!(approx_eq!(Float, tracer.rr_importance_cap, 0.5));
        assert!(!tracer.hybrid_back_forward_enable);
        assert!(!tracer.force_black_background);
    }

    #[test]
    fn legacy_maxdepth_caps_every_bounce_type() {
        let mut props = ParamSet::new();
        props.add_int("path.maxdepth", &[9]);
        let tracer = PathTracer::from(&props);
        assert_eq!(tracer.max_path_depth.depth, 9);
        assert_eq!(tracer.max_path_depth.diffuse_depth, 9);
        assert_eq!(tracer.max_path_depth.glossy_depth, 9);
        assert_eq!(tracer.max_path_depth.specular_depth, 9);
    }

    #[test]
    fn explicit_depths_shadow_the_legacy_key() {
        let mut props = ParamSet::new();
        props.add_int("path.maxdepth", &[9]);
        props.add_int("path.pathdepth.total", &[5]);
        let tracer = PathTracer::from(&props);
        assert_eq!(tracer.max_path_depth.depth, 5);
        assert_eq!(tracer.max_path_depth.diffuse_depth, 4);
    }

    #[test]
    fn old_radiance_clamping_key_is_honored() {
        let mut props = ParamSet::new();
        props.add_float("path.clamping.radiance.maxvalue", &[10.0]);
        assert!(approx_eq!(
            Float,
            PathTracer::from(&props).sqrt_variance_clamp_max_value,
            10.0
        ));

        props.add_float("path.clamping.variance.maxvalue", &[3.0]);
        assert!(approx_eq!(
            Float,
            PathTracer::from(&props).sqrt_variance_clamp_max_value,
            3.0
        ));
    }

    #[test]
    fn sample_sizes_follow_depth_caps() {
        let tracer = PathTracer::default();
        assert_eq!(tracer.eye_sample_size(), EYE_SAMPLE_BOOT_SIZE + 7 * EYE_SAMPLE_STEP_SIZE);
        assert_eq!(tracer.light_sample_size(), LIGHT_SAMPLE_BOOT_SIZE + 6 * LIGHT_SAMPLE_STEP_SIZE);
    }
}
