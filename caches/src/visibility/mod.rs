//! Environment Light Visibility Cache
//!
//! Clusters scene-visible points and renders, per cluster, a directional
//! visibility map over the environment light's latitude-longitude
//! parameterization. At render time the map importance-samples visible
//! directions; clusters whose map came out empty fall back to uniform
//! sampling.

mod serialize;

use crate::scene_visibility::{
    film_to_scene_radius, trace_visibility_particles, VisibilityParticle, VisibilityTraceParams,
};
use crate::CacheError;
use crossbeam_channel::bounded;
use itertools::Itertools;
use lumen_accelerators::{IndexBvh, SpatialEntry};
use lumen_core::base::*;
use lumen_core::bsdf::Bsdf;
use lumen_core::camera::Camera;
use lumen_core::film::Film;
use lumen_core::geometry::{Normal3f, Point2f, Point3f, Ray};
use lumen_core::light::{to_lat_long_mapping, EnvLight};
use lumen_core::low_discrepency::radical_inverse;
use lumen_core::paramset::ParamSet;
use lumen_core::sampling::{uniform_sample_hemisphere, uniform_sample_sphere, Distribution2D};
use lumen_core::scene::Scene;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The percentage of image plane covered by an estimated lookup radius.
const IMAGE_PLANE_RADIUS: Float = 0.1;

/// Fallback lookup radius when estimation is infeasible.
const DEFAULT_RADIUS: Float = 0.15;

/// Cells that survived construction never drop below this probability, to
/// avoid fireflies from near-zero-probability directions.
const MIN_CELL_PROBABILITY: Float = 0.05;

/// Resolution and sampling effort of the per-cluster visibility maps.
#[derive(Clone, Debug)]
pub struct EnvVisibilityMapParams {
    /// Map width in cells.
    pub width: u32,

    /// Map height in cells.
    pub height: u32,

    /// Shadow ray samples per map cell.
    pub sample_count: u32,

    /// Zero the lower hemisphere of every map.
    pub sample_upper_hemisphere_only: bool,
}

/// Location and policy of the persistent cache file.
#[derive(Clone, Debug, Default)]
pub struct PersistentCacheParams {
    /// Cache file path; `None` disables persistence.
    pub file_name: Option<String>,

    /// Write to a temporary file and atomically rename it into place.
    pub safe_save: bool,
}

/// Full configuration of the visibility cache build.
#[derive(Clone, Debug)]
pub struct EnvVisibilityCacheParams {
    /// Map resolution and sampling effort.
    pub map: EnvVisibilityMapParams,

    /// Clustering pass bounds.
    pub visibility: VisibilityTraceParams,

    /// Persistence policy.
    pub persistent: PersistentCacheParams,
}

impl Default for EnvVisibilityCacheParams {
    fn default() -> Self {
        Self {
            map: EnvVisibilityMapParams {
                width: 512,
                height: 256,
                sample_count: 1,
                sample_upper_hemisphere_only: false,
            },
            visibility: VisibilityTraceParams::default(),
            persistent: PersistentCacheParams {
                file_name: None,
                safe_save: true,
            },
        }
    }
}

impl From<(&ParamSet, &str)> for EnvVisibilityCacheParams {
    /// Parse the cache configuration from a parameter set.
    ///
    /// * `p` - A tuple of the parameter set and the light's property prefix.
    fn from(p: (&ParamSet, &str)) -> Self {
        let (params, prefix) = p;
        let key = |suffix: &str| format!("{prefix}.visibilitymapcache.{suffix}");

        let file_name = params.find_one_string(&key("persistent.file"), String::new());

        Self {
            map: EnvVisibilityMapParams {
                width: max(16, params.find_one_int(&key("map.width"), 512)) as u32,
                height: max(8, params.find_one_int(&key("map.height"), 256)) as u32,
                sample_count: max(1, params.find_one_int(&key("map.samplecount"), 1)) as u32,
                sample_upper_hemisphere_only: params
                    .find_one_bool(&key("map.sampleupperhemisphereonly"), false),
            },
            visibility: VisibilityTraceParams {
                max_sample_count: max(1, params.find_one_int(&key("visibility.maxsamplecount"), 1024 * 1024))
                    as u32,
                max_path_depth: max(1, params.find_one_int(&key("visibility.maxdepth"), 4)) as u32,
                target_hit_rate: max(0.0, params.find_one_float(&key("visibility.targethitrate"), 0.99)),
                lookup_radius: max(0.0, params.find_one_float(&key("visibility.radius"), 0.0)),
                lookup_normal_angle: max(0.0, params.find_one_float(&key("visibility.normalangle"), 25.0)),
            },
            persistent: PersistentCacheParams {
                file_name: if file_name.is_empty() { None } else { Some(file_name) },
                safe_save: params.find_one_bool(&key("persistent.safesave"), true),
            },
        }
    }
}

/// One finished cache entry: a cluster representative and its visibility
/// map. A `None` map marks a degenerate cluster that falls back to uniform
/// sampling.
pub struct CacheEntry {
    /// Cluster position.
    pub p: Point3f,

    /// Cluster normal.
    pub n: Normal3f,

    /// Cluster volume flag.
    pub is_volume: bool,

    /// The visibility map distribution, if any direction was visible.
    pub map: Option<Distribution2D>,
}

impl SpatialEntry for CacheEntry {
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

/// The built cache: immutable after construction, queried lock-free from
/// every render thread.
pub struct EnvVisibilityCache {
    params: EnvVisibilityCacheParams,
    entries: Vec<CacheEntry>,
    bvh: Option<IndexBvh>,
}

impl EnvVisibilityCache {
    /// Returns `true` if a shading point can use the cache. Delta surfaces
    /// never do.
    ///
    /// * `bsdf` - The shading context.
    pub fn is_cache_enabled(bsdf: &dyn Bsdf) -> bool {
        !bsdf.is_delta()
    }

    /// Returns the configuration the cache was built with.
    pub fn params(&self) -> &EnvVisibilityCacheParams {
        &self.params
    }

    /// Returns the finished cache entries.
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Build the cache, short-circuiting to a deserialized copy when the
    /// persistent file already exists.
    ///
    /// * `scene`         - The scene.
    /// * `camera`        - The camera.
    /// * `film`          - The film, for its renderable sub-region.
    /// * `env`           - The environment light the maps are built against.
    /// * `luminance_map` - Optional env luminance grid at map resolution.
    /// * `params`        - The build configuration.
    pub fn build(
        scene: &dyn Scene,
        camera: &dyn Camera,
        film: &dyn Film,
        env: &dyn EnvLight,
        luminance_map: Option<&[Float]>,
        params: EnvVisibilityCacheParams,
    ) -> Result<Self, CacheError> {
        // Load the persistent cache file if one is already there.
        if let Some(file_name) = params.persistent.file_name.as_deref() {
            if std::path::Path::new(file_name).exists() {
                return serialize::load_persistent_cache(file_name);
            }
        }

        let mut params = params;

        // Evaluate the best lookup radius if not user-provided.
        if params.visibility.lookup_radius == 0.0 {
            params.visibility.lookup_radius = film_to_scene_radius(
                scene,
                camera,
                film,
                IMAGE_PLANE_RADIUS,
                DEFAULT_RADIUS,
                params.visibility.max_path_depth,
                &Self::is_cache_enabled,
            );
            info!("Visibility cache best lookup radius: {}", params.visibility.lookup_radius);
        }

        // Build the list of visible points.
        let particles =
            trace_visibility_particles(scene, camera, film, &params.visibility, &Self::is_cache_enabled);

        // Build the cache entries, in parallel over independent clusters.
        let entries = build_cache_entries(scene, env, &particles, &params.map, luminance_map);
        drop(particles);

        // Index the finished entries.
        let bvh = if entries.is_empty() {
            warn!("Visibility cache is empty");
            None
        } else {
            info!("Building visibility cache entries BVH");
            Some(IndexBvh::new(
                &entries,
                params.visibility.lookup_radius,
                params.visibility.lookup_normal_angle,
            ))
        };

        let cache = Self { params, entries, bvh };

        // Persist if configured.
        if let Some(file_name) = cache.params.persistent.file_name.clone() {
            serialize::save_persistent_cache(&cache, &file_name, cache.params.persistent.safe_save)?;
        }

        Ok(cache)
    }

    /// Returns the visibility map covering a shading point, or `None` when
    /// no entry is in range, the entry is degenerate, or the point is not
    /// cache-eligible.
    ///
    /// * `bsdf` - The shading context.
    pub fn visibility_map(&self, bsdf: &dyn Bsdf) -> Option<&Distribution2D> {
        if !Self::is_cache_enabled(bsdf) {
            return None;
        }
        let sp = bsdf.surface_point();
        self.lookup(&sp.p, &sp.landing_shade_n(), sp.is_volume)
    }

    /// Nearest-entry lookup by position and classification.
    ///
    /// * `p`         - The query point.
    /// * `n`         - The query normal.
    /// * `is_volume` - The query volume flag.
    pub fn lookup(&self, p: &Point3f, n: &Normal3f, is_volume: bool) -> Option<&Distribution2D> {
        let bvh = self.bvh.as_ref()?;
        let (index, _) = bvh.nearest_entry(&self.entries, p, n, is_volume)?;
        self.entries[index].map.as_ref()
    }

    // Used by serialization to reassemble a loaded cache.
    pub(crate) fn from_parts(
        params: EnvVisibilityCacheParams,
        entries: Vec<CacheEntry>,
        bvh: Option<IndexBvh>,
    ) -> Self {
        Self { params, entries, bvh }
    }

    pub(crate) fn bvh(&self) -> Option<&IndexBvh> {
        self.bvh.as_ref()
    }
}

// Log clustering progress roughly this often.
const PROGRESS_LOG_STEP: usize = 1000;

/// Build every cluster's cache entry on a worker pool. Clusters are
/// independent; the only shared state is an approximate progress counter.
fn build_cache_entries(
    scene: &dyn Scene,
    env: &dyn EnvLight,
    particles: &[VisibilityParticle],
    map_params: &EnvVisibilityMapParams,
    luminance_map: Option<&[Float]>,
) -> Vec<CacheEntry> {
    if particles.is_empty() {
        return Vec::new();
    }

    info!("Building visibility cache entries: {}", particles.len());

    let n_threads = crate::build_thread_count();
    let counter = AtomicUsize::new(0);
    let mut entries: Vec<Option<CacheEntry>> = (0..particles.len()).map(|_| None).collect();

    std::thread::scope(|scope| {
        let (tx_work, rx_work) = bounded::<usize>(8192);
        let (tx_result, rx_result) = bounded::<(usize, CacheEntry)>(8192);

        for _ in 0..n_threads {
            let rx_work = rx_work.clone();
            let tx_result = tx_result.clone();
            let counter = &counter;
            scope.spawn(move || {
                for index in rx_work.iter() {
                    let entry = build_cache_entry(scene, env, &particles[index], map_params, luminance_map);

                    let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % PROGRESS_LOG_STEP == 0 {
                        info!("Visibility map distributions: {done}/{}", particles.len());
                    }

                    if tx_result.send((index, entry)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(rx_work);
        drop(tx_result);

        scope.spawn(move || {
            for index in 0..particles.len() {
                if tx_work.send(index).is_err() {
                    break;
                }
            }
        });

        for (index, entry) in rx_result.iter() {
            entries[index] = Some(entry);
        }
    });

    entries.into_iter().flatten().collect()
}

/// Render one cluster's visibility map by shooting stratified shadow rays
/// toward the environment and accumulating transmission per map cell.
fn build_cache_entry(
    scene: &dyn Scene,
    env: &dyn EnvLight,
    particle: &VisibilityParticle,
    map_params: &EnvVisibilityMapParams,
    luminance_map: Option<&[Float]>,
) -> CacheEntry {
    let first = &particle.points[0];
    let width = map_params.width as usize;
    let height = map_params.height as usize;
    let pixel_count = width * height;

    let mut visibility_map = vec![0.0_f32; pixel_count];
    let mut sample_count = vec![0_u32; pixel_count];

    // Trace all shadow rays. Pass starts at 1 to avoid the all-zero
    // radical-inverse sample.
    let tot_samples = (pixel_count as u64) * map_params.sample_count as u64;
    for pass in 1..=tot_samples {
        let u0 = radical_inverse(1, pass);
        let u1 = radical_inverse(2, pass);
        let u2 = radical_inverse(3, pass);
        let u3 = radical_inverse(4, pass);
        let u4 = radical_inverse(5, pass);

        // Pick a representative point of the cluster.
        let point_index = min(
            (u0 * particle.points.len() as Float) as usize,
            particle.points.len() - 1,
        );
        let sp = &particle.points[point_index];
        let vol_info = &particle.vol_infos[point_index];

        // Build the local sampling direction. The shading frame faces the
        // front side, so flip z when the surface was entered from the back.
        let mut local_dir = if sp.is_volume {
            uniform_sample_sphere(&Point2f::new(u1, u2))
        } else {
            uniform_sample_hemisphere(&Point2f::new(u1, u2))
        };
        if !sp.into_object {
            local_dir.z = -local_dir.z;
        }

        let frame = lumen_core::geometry::Frame::from_normal(&sp.shade_n);
        let global_dir = frame.to_world(&local_dir);

        // Locate the map cell for this direction.
        let local_light_dir = env.to_local(&global_dir).normalize();
        let (u, v, mapping_pdf) = to_lat_long_mapping(&local_light_dir);
        if mapping_pdf == 0.0 {
            continue;
        }

        let s = u * width as Float - 0.5;
        let t = v * height as Float - 0.5;
        let x = rem(s.floor() as Int, width as Int) as usize;
        let y = rem(t.floor() as Int, height as Int) as usize;
        let pixel_index = x + y * width;

        // Check if the environment is visible along the direction.
        let mut shadow_ray = Ray::new(sp.ray_origin(&global_dir), global_dir);
        shadow_ray.time = u3;
        if let Some(throughput) = scene.transmittance(&shadow_ray, vol_info, u4) {
            visibility_map[pixel_index] += throughput.y();
        }
        sample_count[pixel_index] += 1;
    }

    // Normalize cells by their sample counts.
    for (cell, &count) in visibility_map.iter_mut().zip(sample_count.iter()) {
        if count > 0 {
            *cell /= count as Float;
        }
    }

    // Filter the map to knock down sampling noise.
    gaussian_blur_3x3(width, height, &mut visibility_map);

    // Zero the lower hemisphere if configured.
    if map_params.sample_upper_hemisphere_only {
        for (y, x) in (height / 2 + 1..height).cartesian_product(0..width) {
            visibility_map[x + y * width] = 0.0;
        }
    }

    let max_val = visibility_map.iter().cloned().fold(0.0_f32, Float::max);
    if max_val == 0.0 {
        // Nothing was visible from this cluster; fall back to uniform
        // sampling at render time.
        return CacheEntry {
            p: first.p,
            n: first.landing_shade_n(),
            is_volume: first.is_volume,
            map: None,
        };
    }

    let inv_max = 1.0 / max_val;
    for cell in visibility_map.iter_mut() {
        *cell *= inv_max;
    }

    // Modulate by the normalized environment luminance when provided.
    if let Some(luminance) = luminance_map {
        debug_assert_eq!(luminance.len(), pixel_count);
        let luminance_max = luminance.iter().cloned().fold(0.0_f32, Float::max);
        if luminance_max > 0.0 {
            let inv_luminance_max = 1.0 / luminance_max;
            for (cell, &lum) in visibility_map.iter_mut().zip(luminance.iter()) {
                *cell *= lum * inv_luminance_max;
            }
        }
    }

    // Avoid cells with a very low probability.
    for cell in visibility_map.iter_mut() {
        if *cell > 0.0 {
            *cell = cell.max(MIN_CELL_PROBABILITY);
        }
    }

    CacheEntry {
        p: first.p,
        n: first.landing_shade_n(),
        is_volume: first.is_volume,
        map: Some(Distribution2D::new(&visibility_map, width, height)),
    }
}

/// Apply a separable 3x3 Gaussian blur (weights .5/1/.5) in place, with
/// clamped edges.
///
/// * `width`  - Grid width.
/// * `height` - Grid height.
/// * `pixels` - The grid values.
pub fn gaussian_blur_3x3(width: usize, height: usize, pixels: &mut [Float]) {
    debug_assert_eq!(pixels.len(), width * height);
    let mut tmp = vec![0.0_f32; pixels.len()];

    // Horizontal pass.
    for (y, x) in (0..height).cartesian_product(0..width) {
        let left = pixels[x.saturating_sub(1) + y * width];
        let center = pixels[x + y * width];
        let right = pixels[min(x + 1, width - 1) + y * width];
        tmp[x + y * width] = (0.5 * left + center + 0.5 * right) / 2.0;
    }

    // Vertical pass.
    for (y, x) in (0..height).cartesian_product(0..width) {
        let up = tmp[x + y.saturating_sub(1) * width];
        let center = tmp[x + y * width];
        let down = tmp[x + min(y + 1, height - 1) * width];
        pixels[x + y * width] = (0.5 * up + center + 0.5 * down) / 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_preserves_a_constant_field() {
        let (w, h) = (8, 4);
        let mut pixels = vec![0.75_f32; w * h];
        gaussian_blur_3x3(w, h, &mut pixels);
        for &p in &pixels {
            assert!((p - 0.75).abs() < 1e-6);
        }
    }

    #[test]
    fn blur_spreads_an_impulse_to_neighbors() {
        let (w, h) = (5, 5);
        let mut pixels = vec![0.0_f32; w * h];
        pixels[2 + 2 * w] = 1.0;
        gaussian_blur_3x3(w, h, &mut pixels);
        assert!(pixels[2 + 2 * w] > pixels[1 + 2 * w]);
        assert!(pixels[1 + 2 * w] > 0.0);
        assert!(pixels[1 + 1 * w] > 0.0);
        assert_eq!(pixels[0 + 4 * w], 0.0);
    }

    #[test]
    fn params_parse_with_clamped_defaults() {
        let mut props = ParamSet::new();
        props.add_int("env.visibilitymapcache.map.width", &[4]); // below floor
        props.add_float("env.visibilitymapcache.visibility.radius", &[0.5]);
        props.add_string("env.visibilitymapcache.persistent.file", &[String::from("elvc.bin")]);

        let params = EnvVisibilityCacheParams::from((&props, "env"));
        assert_eq!(params.map.width, 16);
        assert_eq!(params.map.height, 256);
        assert_eq!(params.visibility.lookup_radius, 0.5);
        assert_eq!(params.persistent.file_name.as_deref(), Some("elvc.bin"));
        assert!(params.persistent.safe_save);
    }
}
