//! Scene Visibility
//!
//! Shared clustering pass used by both caches: traces camera sub-paths
//! through the scene and clusters the visited points into visibility
//! particles with an incrementally updated octree.

use crossbeam_channel::bounded;
use lumen_accelerators::{IndexOctree, SpatialEntry};
use lumen_core::base::*;
use lumen_core::bsdf::{Bsdf, SurfacePoint};
use lumen_core::camera::Camera;
use lumen_core::film::Film;
use lumen_core::geometry::{Normal3f, Point3f};
use lumen_core::path::PathVolumeInfo;
use lumen_core::sampler::{RandomSampler, Sampler};
use lumen_core::scene::Scene;
use std::sync::atomic::{AtomicBool, Ordering};

/// Bounds and thresholds of the clustering trace shared by the caches.
#[derive(Clone, Debug)]
pub struct VisibilityTraceParams {
    /// Budget of camera sub-paths to trace.
    pub max_sample_count: u32,

    /// Maximum camera sub-path depth.
    pub max_path_depth: u32,

    /// Clustering stops early once this cache hit rate is reached.
    pub target_hit_rate: Float,

    /// Clustering radius; 0 requests estimation from the image plane.
    pub lookup_radius: Float,

    /// Maximum angle in degrees between normals merged into one cluster.
    pub lookup_normal_angle: Float,
}

impl Default for VisibilityTraceParams {
    fn default() -> Self {
        Self {
            max_sample_count: 1024 * 1024,
            max_path_depth: 4,
            target_hit_rate: 0.99,
            lookup_radius: 0.0,
            lookup_normal_angle: 25.0,
        }
    }
}

/// A cluster of scene-visible points accumulated during the clustering pass.
/// Transient build-time state: discarded once cache entries are built.
pub struct VisibilityParticle {
    /// Representative hit records, used to jitter directional sampling.
    pub points: Vec<SurfacePoint>,

    /// The volume stack at each representative hit.
    pub vol_infos: Vec<PathVolumeInfo>,
}

impl VisibilityParticle {
    /// Seed a cluster from its first hit point.
    ///
    /// * `point`    - The hit record.
    /// * `vol_info` - The volume stack at the hit.
    pub fn new(point: SurfacePoint, vol_info: PathVolumeInfo) -> Self {
        Self {
            points: vec![point],
            vol_infos: vec![vol_info],
        }
    }

    /// Add a representative to the cluster.
    ///
    /// * `point`    - The hit record.
    /// * `vol_info` - The volume stack at the hit.
    pub fn add(&mut self, point: SurfacePoint, vol_info: PathVolumeInfo) {
        self.points.push(point);
        self.vol_infos.push(vol_info);
    }
}

impl SpatialEntry for VisibilityParticle {
    fn position(&self) -> Point3f {
        self.points[0].p
    }

    fn normal(&self) -> Normal3f {
        self.points[0].landing_shade_n()
    }

    fn is_volume(&self) -> bool {
        self.points[0].is_volume
    }
}

// Minimum number of traced sub-paths before the hit rate is trusted.
const HIT_RATE_WARMUP: u64 = 512;

// One candidate hit point produced by a tracing worker.
type Candidate = (SurfacePoint, PathVolumeInfo);

/// Trace camera sub-paths and cluster the eligible hit points. Tracing runs
/// on a worker pool; clustering stays on the calling thread, which owns the
/// octree. An empty result is valid and simply yields an empty cache.
///
/// * `scene`    - The scene.
/// * `camera`   - The camera.
/// * `film`     - The film, for its renderable sub-region.
/// * `params`   - Clustering bounds; `lookup_radius` must be resolved.
/// * `eligible` - Predicate selecting cache-eligible hit points.
pub fn trace_visibility_particles(
    scene: &dyn Scene,
    camera: &dyn Camera,
    film: &dyn Film,
    params: &VisibilityTraceParams,
    eligible: &(dyn Fn(&dyn Bsdf) -> bool + Sync),
) -> Vec<VisibilityParticle> {
    debug_assert!(params.lookup_radius > 0.0);

    info!(
        "Tracing visibility particles: {} sub-paths max, radius {}",
        params.max_sample_count, params.lookup_radius
    );

    let mut particles: Vec<VisibilityParticle> = Vec::new();
    let mut octree = IndexOctree::new(
        scene.world_bound(),
        params.lookup_radius,
        params.lookup_normal_angle,
    );
    let max_distance2 = params.lookup_radius * params.lookup_radius;

    let stop = AtomicBool::new(false);
    let n_threads = crate::build_thread_count();

    std::thread::scope(|scope| {
        let (tx_work, rx_work) = bounded::<u64>(8192);
        let (tx_result, rx_result) = bounded::<Vec<Candidate>>(8192);

        // Spawn tracing workers.
        for _ in 0..n_threads {
            let rx_work = rx_work.clone();
            let tx_result = tx_result.clone();
            let stop = &stop;
            scope.spawn(move || {
                for path_index in rx_work.iter() {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let candidates =
                        trace_sub_path(scene, camera, film, params.max_path_depth, eligible, path_index);
                    if tx_result.send(candidates).is_err() {
                        break;
                    }
                }
            });
        }
        drop(rx_work);
        drop(tx_result);

        // Feed path indices until the consumer asks to stop.
        {
            let stop = &stop;
            scope.spawn(move || {
                for path_index in 0..params.max_sample_count as u64 {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    if tx_work.send(path_index).is_err() {
                        break;
                    }
                }
            });
        }

        // Cluster on this thread.
        let mut paths_done = 0_u64;
        let mut total_points = 0_u64;
        let mut merged_points = 0_u64;
        for candidates in rx_result.iter() {
            paths_done += 1;

            for (point, vol_info) in candidates {
                total_points += 1;

                let nearest = octree.nearest_entry(
                    &particles,
                    &point.p,
                    &point.landing_shade_n(),
                    point.is_volume,
                );
                match nearest {
                    Some(index)
                        if point.p.distance_squared(&particles[index].position()) <= max_distance2 =>
                    {
                        particles[index].add(point, vol_info);
                        merged_points += 1;
                    }
                    _ => {
                        particles.push(VisibilityParticle::new(point, vol_info));
                        octree.add(&particles, particles.len() - 1);
                    }
                }
            }

            if paths_done >= params.max_sample_count as u64 {
                stop.store(true, Ordering::Relaxed);
            }
            if total_points >= HIT_RATE_WARMUP {
                let hit_rate = merged_points as Float / total_points as Float;
                if hit_rate >= params.target_hit_rate {
                    debug!("Visibility clustering hit rate {hit_rate} reached after {paths_done} sub-paths");
                    stop.store(true, Ordering::Relaxed);
                }
            }
        }
    });

    if particles.is_empty() {
        warn!("No visible and cache-eligible points found in the scene");
    } else {
        info!("Traced {} visibility particles", particles.len());
    }

    particles
}

// Trace one camera sub-path, collecting eligible hit points.
fn trace_sub_path(
    scene: &dyn Scene,
    camera: &dyn Camera,
    film: &dyn Film,
    max_path_depth: u32,
    eligible: &(dyn Fn(&dyn Bsdf) -> bool + Sync),
    path_index: u64,
) -> Vec<Candidate> {
    let mut sampler = RandomSampler::new(path_index + 1);
    let sub_region = film.sub_region();

    let film_x = lerp(
        sampler.get_sample(0),
        sub_region[0] as Float,
        (sub_region[1] + 1) as Float,
    );
    let film_y = lerp(
        sampler.get_sample(1),
        sub_region[2] as Float,
        (sub_region[3] + 1) as Float,
    );
    let time = camera.generate_ray_time(sampler.get_sample(4));

    let mut vol_info = PathVolumeInfo::new();
    let mut ray = camera.generate_ray(
        film_x,
        film_y,
        time,
        sampler.get_sample(2),
        sampler.get_sample(3),
        &mut vol_info,
    );

    let mut candidates = Vec::new();
    let mut depth = 0;
    while depth < max_path_depth {
        let hit = match scene.intersect(&mut ray, &mut vol_info, sampler.get_sample(5)).hit {
            Some(hit) => hit,
            None => break,
        };

        if eligible(hit.bsdf.as_ref()) {
            candidates.push((*hit.bsdf.surface_point(), vol_info.clone()));
        }

        let sample = match hit.bsdf.sample(sampler.get_sample(6), sampler.get_sample(7)) {
            Some(sample) => sample,
            None => break,
        };

        vol_info.update(sample.event, hit.bsdf.as_ref());
        ray.update(hit.bsdf.surface_point().ray_origin(&sample.wi), sample.wi);
        depth += 1;
    }

    candidates
}

// Number of probe rays used to estimate the lookup radius.
const RADIUS_PROBE_COUNT: u32 = 1024;

/// Estimate a scene-space lookup radius from a fraction of the projected
/// image plane: pairs of camera rays one footprint apart are traced and their
/// separation at the first eligible hit is averaged. Falls back to the
/// default radius when nothing eligible is hit.
///
/// * `scene`                - The scene.
/// * `camera`               - The camera.
/// * `film`                 - The film, for its renderable sub-region.
/// * `image_plane_fraction` - Footprint as a fraction of image width.
/// * `default_radius`       - Fallback radius.
/// * `max_path_depth`       - How deep to follow paths looking for an eligible hit.
/// * `eligible`             - Predicate selecting cache-eligible hit points.
pub fn film_to_scene_radius(
    scene: &dyn Scene,
    camera: &dyn Camera,
    film: &dyn Film,
    image_plane_fraction: Float,
    default_radius: Float,
    max_path_depth: u32,
    eligible: &dyn Fn(&dyn Bsdf) -> bool,
) -> Float {
    let sub_region = film.sub_region();
    let film_width = (sub_region[1] - sub_region[0] + 1) as Float;
    let footprint = image_plane_fraction * film_width;

    let mut sampler = RandomSampler::new(1);
    let mut radius_sum = 0.0;
    let mut radius_count = 0_u32;

    for _ in 0..RADIUS_PROBE_COUNT {
        let film_x = lerp(
            sampler.get_sample(0),
            sub_region[0] as Float,
            (sub_region[1] + 1) as Float,
        );
        let film_y = lerp(
            sampler.get_sample(1),
            sub_region[2] as Float,
            (sub_region[3] + 1) as Float,
        );
        let time = camera.generate_ray_time(sampler.get_sample(4));

        let mut vol_info = PathVolumeInfo::new();
        let u0 = sampler.get_sample(2);
        let u1 = sampler.get_sample(3);
        let mut ray = camera.generate_ray(film_x, film_y, time, u0, u1, &mut vol_info);

        // The eye ray and its cumulative length up to the current vertex.
        let eye_ray = ray;
        let mut eye_distance = 0.0;

        let mut depth = 0;
        while depth < max_path_depth {
            let hit = match scene.intersect(&mut ray, &mut vol_info, sampler.get_sample(5)).hit {
                Some(hit) => hit,
                None => break,
            };
            eye_distance += hit.t;

            if eligible(hit.bsdf.as_ref()) {
                // Separation of a parallel ray one footprint away on the
                // image plane, measured at the hit distance.
                let mut shifted_vol = PathVolumeInfo::new();
                let shifted =
                    camera.generate_ray(film_x + footprint, film_y, time, u0, u1, &mut shifted_vol);
                let radius = eye_ray.at(eye_distance).distance(&shifted.at(eye_distance));
                if radius > 0.0 && radius.is_finite() {
                    radius_sum += radius;
                    radius_count += 1;
                }
                break;
            }

            let sample = match hit.bsdf.sample(sampler.get_sample(6), sampler.get_sample(7)) {
                Some(sample) => sample,
                None => break,
            };
            vol_info.update(sample.event, hit.bsdf.as_ref());
            ray.update(hit.bsdf.surface_point().ray_origin(&sample.wi), sample.wi);
            depth += 1;
        }
    }

    if radius_count == 0 {
        debug!("Lookup radius estimation infeasible, using default {default_radius}");
        default_radius
    } else {
        radius_sum / radius_count as Float
    }
}
