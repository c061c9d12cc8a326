//! Photon Global Illumination Cache
//!
//! Precomputes indirect and caustic radiance from light-emitted photons
//! indexed spatially. The caustic sub-cache is refreshed while rendering is
//! in progress: all render threads rendezvous at a barrier, thread 0 alone
//! retraces and rebuilds, and the new container is published as an immutable
//! snapshot before the threads resume.

mod trace;

use crate::scene_visibility::{trace_visibility_particles, VisibilityParticle, VisibilityTraceParams};
use arc_swap::ArcSwapOption;
use lumen_accelerators::{IndexBvh, SpatialEntry};
use lumen_core::base::*;
use lumen_core::bsdf::{Bsdf, BsdfEvent};
use lumen_core::camera::Camera;
use lumen_core::film::Film;
use lumen_core::geometry::{Normal3f, Point3f, Vector3f};
use lumen_core::paramset::ParamSet;
use lumen_core::path::PathDepthInfo;
use lumen_core::scene::Scene;
use lumen_core::spectrum::Spectrum;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use trace::trace_photons;

/// Debug visualization modes of the photon cache.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DebugMode {
    /// Normal rendering.
    #[default]
    Off,

    /// Output the indirect cache contents directly.
    ShowIndirect,

    /// Output the caustic cache contents directly.
    ShowCaustic,

    /// Paint where the indirect cache would terminate the path.
    ShowIndirectPathMix,
}

impl From<&str> for DebugMode {
    fn from(name: &str) -> Self {
        match name {
            "none" => Self::Off,
            "showindirect" => Self::ShowIndirect,
            "showcaustic" => Self::ShowCaustic,
            "showindirectpathmix" => Self::ShowIndirectPathMix,
            _ => {
                warn!("Unknown photon cache debug type '{name}', using 'none'");
                Self::Off
            }
        }
    }
}

/// Configuration of the indirect sub-cache.
#[derive(Clone, Debug)]
pub struct PhotonGIIndirectParams {
    /// Use the indirect cache at render time.
    pub enabled: bool,

    /// Photon gathering radius.
    pub lookup_radius: Float,

    /// Maximum angle in degrees between matching normals.
    pub lookup_normal_angle: Float,

    /// Below this glossiness a glossy bounce disables the cache.
    pub glossiness_usage_threshold: Float,

    /// Scales the hit-distance threshold gating cache usage.
    pub usage_threshold_scale: Float,
}

/// Configuration of the caustic sub-cache.
#[derive(Clone, Debug)]
pub struct PhotonGICausticParams {
    /// Use the caustic cache at render time.
    pub enabled: bool,

    /// Cap on photons gathered per lookup.
    pub lookup_max_count: u32,

    /// Photon gathering radius.
    pub lookup_radius: Float,

    /// Maximum angle in degrees between matching normals.
    pub lookup_normal_angle: Float,

    /// Refresh the cache every this many samples per pixel; 0 disables
    /// updates.
    pub update_spp: u32,

    /// Merge photons closer than this fraction of the lookup radius; 0
    /// disables merging.
    pub merge_radius_scale: Float,
}

/// Full configuration of the photon cache.
#[derive(Clone, Debug)]
pub struct PhotonGIParams {
    /// Photon path budget per tracing pass.
    pub photon_max_count: u32,

    /// Maximum photon path depth.
    pub photon_max_depth: u32,

    /// Clustering pass bounds for the visibility particles.
    pub visibility: VisibilityTraceParams,

    /// Indirect sub-cache configuration.
    pub indirect: PhotonGIIndirectParams,

    /// Caustic sub-cache configuration.
    pub caustic: PhotonGICausticParams,

    /// Debug visualization mode.
    pub debug: DebugMode,
}

impl Default for PhotonGIParams {
    fn default() -> Self {
        Self {
            photon_max_count: 500_000,
            photon_max_depth: 4,
            visibility: VisibilityTraceParams {
                lookup_radius: 0.15,
                lookup_normal_angle: 10.0,
                ..VisibilityTraceParams::default()
            },
            indirect: PhotonGIIndirectParams {
                enabled: false,
                lookup_radius: 0.15,
                lookup_normal_angle: 10.0,
                glossiness_usage_threshold: 0.05,
                usage_threshold_scale: 8.0,
            },
            caustic: PhotonGICausticParams {
                enabled: false,
                lookup_max_count: 128,
                lookup_radius: 0.15,
                lookup_normal_angle: 10.0,
                update_spp: 8,
                merge_radius_scale: 0.25,
            },
            debug: DebugMode::Off,
        }
    }
}

impl From<&ParamSet> for PhotonGIParams {
    /// Parse the photon cache configuration from a parameter set.
    ///
    /// * `params` - The parameter set.
    fn from(params: &ParamSet) -> Self {
        let indirect = PhotonGIIndirectParams {
            enabled: params.find_one_bool("path.photongi.indirect.enabled", false),
            lookup_radius: max(
                0.01,
                params.find_one_float("path.photongi.indirect.lookup.radius", 0.15),
            ),
            lookup_normal_angle: max(
                0.0,
                params.find_one_float("path.photongi.indirect.lookup.normalangle", 10.0),
            ),
            glossiness_usage_threshold: max(
                0.0,
                params.find_one_float("path.photongi.indirect.glossinessusagethreshold", 0.05),
            ),
            usage_threshold_scale: max(
                0.0,
                params.find_one_float("path.photongi.indirect.usagethresholdscale", 8.0),
            ),
        };

        Self {
            photon_max_count: max(1, params.find_one_int("path.photongi.photon.maxcount", 500_000)) as u32,
            photon_max_depth: max(1, params.find_one_int("path.photongi.photon.maxdepth", 4)) as u32,
            visibility: VisibilityTraceParams {
                max_sample_count: max(
                    1,
                    params.find_one_int("path.photongi.visibility.maxsamplecount", 1024 * 1024),
                ) as u32,
                max_path_depth: max(1, params.find_one_int("path.photongi.visibility.maxdepth", 4)) as u32,
                target_hit_rate: max(
                    0.0,
                    params.find_one_float("path.photongi.visibility.targethitrate", 0.99),
                ),
                lookup_radius: indirect.lookup_radius,
                lookup_normal_angle: indirect.lookup_normal_angle,
            },
            indirect,
            caustic: PhotonGICausticParams {
                enabled: params.find_one_bool("path.photongi.caustic.enabled", false),
                lookup_max_count: max(1, params.find_one_int("path.photongi.caustic.lookup.maxcount", 128))
                    as u32,
                lookup_radius: max(
                    0.01,
                    params.find_one_float("path.photongi.caustic.lookup.radius", 0.15),
                ),
                lookup_normal_angle: max(
                    0.0,
                    params.find_one_float("path.photongi.caustic.lookup.normalangle", 10.0),
                ),
                update_spp: max(0, params.find_one_int("path.photongi.caustic.updatespp", 8)) as u32,
                merge_radius_scale: max(
                    0.0,
                    params.find_one_float("path.photongi.caustic.merge.radiusscale", 0.25),
                ),
            },
            debug: DebugMode::from(
                params
                    .find_one_string("path.photongi.debug.type", String::from("none"))
                    .as_str(),
            ),
        }
    }
}

/// A light-emitted photon deposited on a storable surface.
pub struct Photon {
    /// Deposit position.
    pub p: Point3f,

    /// Deposited flux, normalized by the emitted path count.
    pub alpha: Spectrum,

    /// Direction the photon arrived from.
    pub dir: Vector3f,

    /// Landing-side shading normal at the deposit.
    pub landing_n: Normal3f,

    /// Deposit inside a participating medium.
    pub is_volume: bool,
}

impl SpatialEntry for Photon {
    fn position(&self) -> Point3f {
        self.p
    }

    fn normal(&self) -> Normal3f {
        self.landing_n
    }

    fn is_volume(&self) -> bool {
        self.is_volume
    }
}

/// A precomputed incident flux density at a visibility particle. Converted
/// to outgoing radiance at query time with the shading point's albedo.
pub struct RadiancePhoton {
    /// Particle position.
    pub p: Point3f,

    /// Particle normal.
    pub n: Normal3f,

    /// Particle volume flag.
    pub is_volume: bool,

    /// Gathered incident flux density.
    pub irradiance: Spectrum,
}

impl SpatialEntry for RadiancePhoton {
    fn position(&self) -> Point3f {
        self.p
    }

    fn normal(&self) -> Normal3f {
        self.n
    }

    fn is_volume(&self) -> bool {
        self.is_volume
    }
}

// The caustic photon container and its index, swapped atomically as one
// immutable snapshot.
struct CausticSnapshot {
    photons: Vec<Photon>,
    bvh: IndexBvh,
}

// Transient build-time state kept for caustic retracing.
struct VisibilityData {
    particles: Vec<VisibilityParticle>,
    bvh: Option<IndexBvh>,
}

/// The photon GI cache. Render threads query it lock-free; the caustic
/// sub-cache is refreshed under a two-phase barrier.
pub struct PhotonGICache {
    params: PhotonGIParams,
    scene: Arc<dyn Scene>,

    visibility: Mutex<VisibilityData>,

    radiance_photons: Vec<RadiancePhoton>,
    radiance_bvh: Option<IndexBvh>,

    caustic: ArcSwapOption<CausticSnapshot>,
    last_update_spp: AtomicU32,
    barrier: Barrier,
}

impl PhotonGICache {
    /// Create an empty cache; call `preprocess` before rendering.
    ///
    /// * `scene`               - The scene photons are traced in.
    /// * `params`              - The cache configuration.
    /// * `render_thread_count` - Number of threads that will call `update`.
    pub fn new(scene: Arc<dyn Scene>, params: PhotonGIParams, render_thread_count: usize) -> Self {
        Self {
            params,
            scene,
            visibility: Mutex::new(VisibilityData {
                particles: Vec::new(),
                bvh: None,
            }),
            radiance_photons: Vec::new(),
            radiance_bvh: None,
            caustic: ArcSwapOption::const_empty(),
            last_update_spp: AtomicU32::new(0),
            barrier: Barrier::new(render_thread_count),
        }
    }

    /// Returns the configuration the cache was built with.
    pub fn params(&self) -> &PhotonGIParams {
        &self.params
    }

    /// Returns the debug visualization mode.
    pub fn debug_mode(&self) -> DebugMode {
        self.params.debug
    }

    /// Returns `true` when the indirect sub-cache answers queries.
    pub fn is_indirect_enabled(&self) -> bool {
        self.params.indirect.enabled
    }

    /// Returns `true` when the caustic sub-cache answers queries.
    pub fn is_caustic_enabled(&self) -> bool {
        self.params.caustic.enabled
    }

    /// Returns `true` if a shading point can use the photon cache at all.
    ///
    /// * `bsdf` - The shading context.
    pub fn is_photon_gi_enabled(&self, bsdf: &dyn Bsdf) -> bool {
        !bsdf.is_delta()
            && bsdf
                .event_types()
                .intersects(BsdfEvent::DIFFUSE | BsdfEvent::GLOSSY)
    }

    /// Build the cache before rendering starts: capture visibility
    /// particles, trace photons, and derive the radiance photons and the
    /// initial caustic snapshot.
    ///
    /// * `camera` - The camera.
    /// * `film`   - The film, for its renderable sub-region.
    pub fn preprocess(&mut self, camera: &dyn Camera, film: &dyn Film) {
        if !self.params.indirect.enabled && !self.params.caustic.enabled {
            return;
        }

        let particles = trace_visibility_particles(
            self.scene.as_ref(),
            camera,
            film,
            &self.params.visibility,
            &|bsdf: &dyn Bsdf| self.is_photon_gi_enabled(bsdf),
        );
        if particles.is_empty() {
            return;
        }

        let particle_bvh = IndexBvh::new(
            &particles,
            self.params.visibility.lookup_radius,
            self.params.visibility.lookup_normal_angle,
        );

        let traced = trace_photons(
            self.scene.as_ref(),
            &particles,
            &particle_bvh,
            &self.params,
            self.params.indirect.enabled,
            self.params.caustic.enabled,
        );

        // Precompute the indirect radiance photons from the indirect
        // photons gathered around each particle.
        if self.params.indirect.enabled && !traced.indirect.is_empty() {
            let photon_bvh = IndexBvh::new(
                &traced.indirect,
                self.params.indirect.lookup_radius,
                self.params.indirect.lookup_normal_angle,
            );
            let radius2 = self.params.indirect.lookup_radius * self.params.indirect.lookup_radius;

            self.radiance_photons = particles
                .iter()
                .map(|particle| {
                    let p = particle.position();
                    let n = particle.normal();
                    let is_volume = particle.is_volume();

                    let mut flux = Spectrum::ZERO;
                    photon_bvh.for_each_near(&traced.indirect, &p, &n, is_volume, |index, _| {
                        flux += traced.indirect[index].alpha;
                    });

                    RadiancePhoton {
                        p,
                        n,
                        is_volume,
                        irradiance: flux / (PI * radius2),
                    }
                })
                .collect();
            self.radiance_bvh = Some(IndexBvh::new(
                &self.radiance_photons,
                self.params.indirect.lookup_radius,
                self.params.indirect.lookup_normal_angle,
            ));
        }

        // Build the initial caustic snapshot.
        if self.params.caustic.enabled {
            self.store_caustic_snapshot(traced.caustic);
        }

        // Keep the particles for later caustic retracing.
        let mut visibility = self.visibility.lock().expect("visibility lock poisoned");
        visibility.particles = particles;
        visibility.bvh = Some(particle_bvh);
    }

    /// Drop the transient visibility particles once no further caustic
    /// updates are wanted. A later `update` call degrades gracefully.
    pub fn destroy_visibility_particles(&self) {
        let mut visibility = self.visibility.lock().expect("visibility lock poisoned");
        visibility.particles = Vec::new();
        visibility.bvh = None;
    }

    /// Periodic caustic refresh, called by every render thread. When the
    /// per-pixel sample delta exceeds the configured threshold, all threads
    /// rendezvous, thread 0 rebuilds, and everyone rendezvous again before
    /// resuming. Returns `true` when a rendezvous took place so callers can
    /// re-sync state derived from the old snapshot.
    ///
    /// * `thread_index`         - Calling render thread index.
    /// * `film`                 - The film, for its sample statistics.
    /// * `thread_zero_callback` - Invoked by thread 0 after a successful rebuild.
    pub fn update<F: FnOnce()>(
        &self,
        thread_index: usize,
        film: &dyn Film,
        thread_zero_callback: Option<F>,
    ) -> bool {
        if !self.params.caustic.enabled || self.params.caustic.update_spp == 0 {
            return false;
        }

        // Check if it is time to update the caustic cache.
        let spp = (film.total_sample_count() / film.pixel_count() as f64) as u32;
        let delta_spp = spp.saturating_sub(self.last_update_spp.load(Ordering::Relaxed));
        if delta_spp <= self.params.caustic.update_spp {
            return false;
        }

        self.barrier.wait();

        let mut result = true;
        if thread_index == 0 {
            info!("Updating caustic photon cache: {spp} samples/pixel");

            let visibility = self.visibility.lock().expect("visibility lock poisoned");
            if visibility.particles.is_empty() {
                // The particles were already torn down; rendering continues
                // with the stale cache.
                error!("Updating the caustic photon cache is not possible without visibility information");
                self.last_update_spp.store(spp, Ordering::Relaxed);
                result = false;
            } else {
                let particle_bvh = visibility
                    .bvh
                    .as_ref()
                    .expect("visibility particles present without an index");

                // Drop the previous container and retrace.
                self.caustic.store(None);
                let traced = trace_photons(
                    self.scene.as_ref(),
                    &visibility.particles,
                    particle_bvh,
                    &self.params,
                    false,
                    true,
                );
                self.store_caustic_snapshot(traced.caustic);

                self.last_update_spp.store(spp, Ordering::Relaxed);

                if let Some(callback) = thread_zero_callback {
                    callback();
                }
            }
        }

        self.barrier.wait();

        result
    }

    // Publish a new caustic snapshot, merging nearby photons first when
    // configured. An empty photon set publishes no snapshot.
    fn store_caustic_snapshot(&self, mut photons: Vec<Photon>) {
        if photons.is_empty() {
            return;
        }

        if self.params.caustic.merge_radius_scale > 0.0 {
            info!("Merging {} caustic photons", photons.len());
            photons = merge_photons(
                photons,
                self.params.caustic.merge_radius_scale * self.params.caustic.lookup_radius,
                self.params.caustic.lookup_normal_angle,
            );
            info!("Caustic photons after merge: {}", photons.len());
        }

        let bvh = IndexBvh::new(
            &photons,
            self.params.caustic.lookup_radius,
            self.params.caustic.lookup_normal_angle,
        );
        self.caustic.store(Some(Arc::new(CausticSnapshot { photons, bvh })));
    }

    /// Returns the cached indirect radiance leaving a shading point.
    ///
    /// * `bsdf` - The shading context.
    pub fn indirect_radiance(&self, bsdf: &dyn Bsdf) -> Spectrum {
        let bvh = match self.radiance_bvh.as_ref() {
            Some(bvh) => bvh,
            None => return Spectrum::ZERO,
        };
        let sp = bsdf.surface_point();
        match bvh.nearest_entry(&self.radiance_photons, &sp.p, &sp.landing_shade_n(), sp.is_volume) {
            Some((index, _)) => bsdf.albedo() * INV_PI * self.radiance_photons[index].irradiance,
            None => Spectrum::ZERO,
        }
    }

    /// Returns the cached caustic radiance leaving a shading point via a
    /// bounded k-nearest photon density estimate.
    ///
    /// * `bsdf` - The shading context.
    pub fn caustic_radiance(&self, bsdf: &dyn Bsdf) -> Spectrum {
        let snapshot = self.caustic.load();
        let snapshot = match snapshot.as_ref() {
            Some(snapshot) => snapshot,
            None => return Spectrum::ZERO,
        };

        let sp = bsdf.surface_point();
        let mut near: Vec<(Float, usize)> = Vec::new();
        snapshot
            .bvh
            .for_each_near(&snapshot.photons, &sp.p, &sp.landing_shade_n(), sp.is_volume, |index, dist2| {
                near.push((dist2, index));
            });
        if near.is_empty() {
            return Spectrum::ZERO;
        }

        // Bound the estimate to the configured photon count; when truncated
        // the k-th neighbor distance becomes the estimation radius.
        let max_count = self.params.caustic.lookup_max_count as usize;
        let radius2 = if near.len() > max_count {
            near.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("NaN photon distance"));
            near.truncate(max_count);
            near[max_count - 1].0
        } else {
            self.params.caustic.lookup_radius * self.params.caustic.lookup_radius
        };

        let mut radiance = Spectrum::ZERO;
        for &(_, index) in &near {
            let photon = &snapshot.photons[index];
            let (value, _, _) = bsdf.evaluate(&photon.dir);
            radiance += value * photon.alpha;
        }
        radiance / (PI * radius2)
    }

    /// Returns the hit-distance threshold above which the indirect cache
    /// replaces further path tracing. Reuses the BSDF pass-through sample as
    /// a cheap extra source of randomness; the resulting sample correlation
    /// is a documented approximation of this cache.
    ///
    /// * `last_event`      - Event of the previous bounce.
    /// * `last_glossiness` - Glossiness of the previous bounce.
    /// * `u0`              - The reused pass-through sample.
    pub fn indirect_usage_threshold(&self, last_event: BsdfEvent, last_glossiness: Float, u0: Float) -> Float {
        if last_event.contains(BsdfEvent::GLOSSY)
            && last_glossiness < self.params.indirect.glossiness_usage_threshold
        {
            // The surface is nearly specular: the cache stays off.
            INFINITY
        } else {
            // Use a larger blend zone for glossy surfaces.
            let scale = if last_event.contains(BsdfEvent::GLOSSY) { 2.0 } else { 1.0 };
            scale * self.params.indirect.usage_threshold_scale * self.params.indirect.lookup_radius * u0
        }
    }

    /// Returns `true` when a direct light hit should still be accumulated,
    /// given how the caustic cache has been used along the path. Cuts the
    /// fireflies a glossy or specular bounce would double-count.
    ///
    /// * `caustic_cache_used` - The caustic cache was already added on this path.
    /// * `last_event`         - Event of the previous bounce.
    /// * `depth_info`         - The path depth counters.
    pub fn is_direct_light_hit_visible(
        &self,
        caustic_cache_used: bool,
        last_event: BsdfEvent,
        depth_info: &PathDepthInfo,
    ) -> bool {
        if !self.params.caustic.enabled && last_event.contains(BsdfEvent::GLOSSY) {
            true
        } else if !caustic_cache_used || !self.params.caustic.enabled {
            true
        } else {
            depth_info.diffuse_depth > 0 || depth_info.glossy_depth > 0
        }
    }
}

/// Greedily merge photons closer than the merge radius with agreeing
/// normals, summing their flux into the surviving photon. Total flux is
/// conserved.
///
/// * `photons`          - The photons to merge.
/// * `merge_radius`     - Merge distance.
/// * `normal_angle_deg` - Maximum angle between merged normals.
fn merge_photons(photons: Vec<Photon>, merge_radius: Float, normal_angle_deg: Float) -> Vec<Photon> {
    let bvh = IndexBvh::new(&photons, merge_radius, normal_angle_deg);
    let mut visited = vec![false; photons.len()];
    let mut merged: Vec<Photon> = Vec::with_capacity(photons.len());

    for i in 0..photons.len() {
        if visited[i] {
            continue;
        }

        let mut group = Vec::new();
        bvh.for_each_near(&photons, &photons[i].p, &photons[i].landing_n, photons[i].is_volume, |j, _| {
            if !visited[j] {
                group.push(j);
            }
        });

        let mut alpha = Spectrum::ZERO;
        for &j in &group {
            visited[j] = true;
            alpha += photons[j].alpha;
        }
        // The visitor always reports the seed photon itself.
        debug_assert!(group.contains(&i));

        merged.push(Photon {
            p: photons[i].p,
            alpha,
            dir: photons[i].dir,
            landing_n: photons[i].landing_n,
            is_volume: photons[i].is_volume,
        });
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::geometry::Ray;
    use lumen_core::light::{ArcEnvLight, ArcLight, LightStrategy};
    use lumen_core::scene::Intersection;

    struct EmptyScene {
        illuminate: LightStrategy,
        emit: LightStrategy,
        infinite: LightStrategy,
        lights: Vec<ArcLight>,
        env_lights: Vec<ArcEnvLight>,
    }

    impl EmptyScene {
        fn new() -> Self {
            Self {
                illuminate: LightStrategy::new(Vec::new()),
                emit: LightStrategy::new(Vec::new()),
                infinite: LightStrategy::new(Vec::new()),
                lights: Vec::new(),
                env_lights: Vec::new(),
            }
        }
    }

    impl Scene for EmptyScene {
        fn intersect(
            &self,
            _ray: &mut Ray,
            _vol_info: &mut lumen_core::path::PathVolumeInfo,
            _pass_through: Float,
        ) -> Intersection {
            Intersection {
                connection_throughput: Spectrum::ONE,
                hit: None,
            }
        }

        fn transmittance(
            &self,
            _shadow_ray: &Ray,
            _vol_info: &lumen_core::path::PathVolumeInfo,
            _pass_through: Float,
        ) -> Option<Spectrum> {
            Some(Spectrum::ONE)
        }

        fn world_bound(&self) -> lumen_core::geometry::Bounds3f {
            lumen_core::geometry::Bounds3f::new(Point3f::new(-1.0, -1.0, -1.0), Point3f::new(1.0, 1.0, 1.0))
        }

        fn lights(&self) -> &[ArcLight] {
            &self.lights
        }

        fn env_lights(&self) -> &[ArcEnvLight] {
            &self.env_lights
        }

        fn illuminate_strategy(&self) -> &LightStrategy {
            &self.illuminate
        }

        fn emit_strategy(&self) -> &LightStrategy {
            &self.emit
        }

        fn infinite_strategy(&self) -> &LightStrategy {
            &self.infinite
        }
    }

    struct StubFilm {
        samples: f64,
    }

    impl Film for StubFilm {
        fn total_sample_count(&self) -> f64 {
            self.samples
        }

        fn pixel_count(&self) -> usize {
            100
        }

        fn sub_region(&self) -> [u32; 4] {
            [0, 9, 0, 9]
        }
    }

    fn caustic_params(update_spp: u32) -> PhotonGIParams {
        PhotonGIParams {
            caustic: PhotonGICausticParams {
                enabled: true,
                update_spp,
                ..PhotonGIParams::default().caustic
            },
            ..PhotonGIParams::default()
        }
    }

    #[test]
    fn update_disabled_by_zero_update_spp() {
        let cache = PhotonGICache::new(Arc::new(EmptyScene::new()), caustic_params(0), 1);
        let film = StubFilm { samples: 1.0e6 };
        assert!(!cache.update(0, &film, None::<fn()>));
    }

    #[test]
    fn update_disabled_when_caustic_disabled() {
        let cache = PhotonGICache::new(Arc::new(EmptyScene::new()), PhotonGIParams::default(), 1);
        let film = StubFilm { samples: 1.0e6 };
        assert!(!cache.update(0, &film, None::<fn()>));
    }

    #[test]
    fn update_below_threshold_is_a_no_op() {
        let cache = PhotonGICache::new(Arc::new(EmptyScene::new()), caustic_params(8), 1);
        let film = StubFilm { samples: 500.0 }; // 5 spp over 100 pixels
        assert!(!cache.update(0, &film, None::<fn()>));
    }

    #[test]
    fn update_without_particles_degrades_gracefully() {
        let cache = PhotonGICache::new(Arc::new(EmptyScene::new()), caustic_params(8), 1);
        let film = StubFilm { samples: 10_000.0 }; // 100 spp, over threshold

        let mut callback_ran = false;
        // The particle buffer was never filled (or already torn down): the
        // rebuild is skipped without running the callback.
        assert!(!cache.update(0, &film, Some(|| callback_ran = true)));
        assert!(!callback_ran);

        // The sample counter still advanced, so the next call is a no-op.
        assert!(!cache.update(0, &film, None::<fn()>));
    }

    #[test]
    fn merge_conserves_total_flux() {
        let up = Normal3f::new(0.0, 0.0, 1.0);
        let photons: Vec<Photon> = (0..10)
            .map(|i| Photon {
                p: Point3f::new(i as Float * 0.001, 0.0, 0.0),
                alpha: Spectrum::new(0.5),
                dir: Vector3f::new(0.0, 0.0, 1.0),
                landing_n: up,
                is_volume: false,
            })
            .collect();

        let before: Float = photons.iter().map(|p| p.alpha.y()).sum();
        let merged = merge_photons(photons, 0.1, 10.0);
        let after: Float = merged.iter().map(|p| p.alpha.y()).sum();

        assert_eq!(merged.len(), 1);
        assert!((before - after).abs() < 1e-5);
    }

    #[test]
    fn distant_photons_survive_merging() {
        let up = Normal3f::new(0.0, 0.0, 1.0);
        let photons: Vec<Photon> = (0..4)
            .map(|i| Photon {
                p: Point3f::new(i as Float * 10.0, 0.0, 0.0),
                alpha: Spectrum::new(1.0),
                dir: Vector3f::new(0.0, 0.0, 1.0),
                landing_n: up,
                is_volume: false,
            })
            .collect();
        assert_eq!(merge_photons(photons, 0.1, 10.0).len(), 4);
    }

    #[test]
    fn nearly_specular_glossy_bounce_disables_indirect_cache() {
        let cache = PhotonGICache::new(Arc::new(EmptyScene::new()), PhotonGIParams::default(), 1);
        let threshold = cache.indirect_usage_threshold(BsdfEvent::GLOSSY | BsdfEvent::REFLECT, 0.01, 0.5);
        assert_eq!(threshold, INFINITY);

        let diffuse = cache.indirect_usage_threshold(BsdfEvent::DIFFUSE | BsdfEvent::REFLECT, 0.0, 0.5);
        assert!(diffuse.is_finite());
        assert!(diffuse > 0.0);

        // Glossy-but-rough surfaces get twice the blend zone.
        let glossy = cache.indirect_usage_threshold(BsdfEvent::GLOSSY | BsdfEvent::REFLECT, 0.5, 0.5);
        assert!((glossy - 2.0 * diffuse).abs() < 1e-6);
    }

    #[test]
    fn debug_mode_parses_known_names() {
        assert_eq!(DebugMode::from("none"), DebugMode::Off);
        assert_eq!(DebugMode::from("showindirect"), DebugMode::ShowIndirect);
        assert_eq!(DebugMode::from("showcaustic"), DebugMode::ShowCaustic);
        assert_eq!(DebugMode::from("showindirectpathmix"), DebugMode::ShowIndirectPathMix);
        assert_eq!(DebugMode::from("bogus"), DebugMode::Off);
    }
}
