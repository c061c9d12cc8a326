//! Photon Tracing

use crate::photongi::{Photon, PhotonGIParams};
use crate::scene_visibility::VisibilityParticle;
use crossbeam_channel::bounded;
use lumen_accelerators::IndexBvh;
use lumen_core::base::*;
use lumen_core::bsdf::{Bsdf, BsdfEvent};
use lumen_core::geometry::Point2f;
use lumen_core::light::LightSource;
use lumen_core::low_discrepency::radical_inverse;
use lumen_core::path::PathVolumeInfo;
use lumen_core::rng::Rng;
use lumen_core::sampling::russian_roulette_prob;
use lumen_core::scene::Scene;

// Russian roulette kicks in past this depth during photon tracing.
const PHOTON_RR_DEPTH: u32 = 3;
const PHOTON_RR_CAP: Float = 0.5;

/// The photons produced by one tracing pass, split by transport class.
pub(crate) struct TracedPhotons {
    /// Photons that bounced at least once off a non-specular surface.
    pub indirect: Vec<Photon>,

    /// Photons that reached a storable surface through specular bounces
    /// only.
    pub caustic: Vec<Photon>,
}

/// Trace photon paths from the lights, depositing photons only in the
/// vicinity of previously captured visibility particles. Photon flux is
/// normalized by the path budget before returning.
///
/// * `scene`         - The scene.
/// * `particles`     - The captured visibility particles.
/// * `particle_bvh`  - Index over the particles.
/// * `params`        - The cache configuration.
/// * `want_indirect` - Collect indirect photons.
/// * `want_caustic`  - Collect caustic photons.
pub(crate) fn trace_photons(
    scene: &dyn Scene,
    particles: &[VisibilityParticle],
    particle_bvh: &IndexBvh,
    params: &PhotonGIParams,
    want_indirect: bool,
    want_caustic: bool,
) -> TracedPhotons {
    let path_count = params.photon_max_count;
    info!("Tracing {path_count} photon paths (indirect: {want_indirect}, caustic: {want_caustic})");

    let n_threads = crate::build_thread_count();
    let mut result = TracedPhotons {
        indirect: Vec::new(),
        caustic: Vec::new(),
    };

    std::thread::scope(|scope| {
        let (tx_work, rx_work) = bounded::<u64>(8192);
        let (tx_result, rx_result) = bounded::<TracedPhotons>(n_threads);

        for _ in 0..n_threads {
            let rx_work = rx_work.clone();
            let tx_result = tx_result.clone();
            scope.spawn(move || {
                let mut local = TracedPhotons {
                    indirect: Vec::new(),
                    caustic: Vec::new(),
                };
                for path_index in rx_work.iter() {
                    trace_photon_path(
                        scene,
                        particles,
                        particle_bvh,
                        params,
                        want_indirect,
                        want_caustic,
                        path_index,
                        &mut local,
                    );
                }
                let _ = tx_result.send(local);
            });
        }
        drop(rx_work);
        drop(tx_result);

        scope.spawn(move || {
            for path_index in 0..path_count as u64 {
                if tx_work.send(path_index).is_err() {
                    break;
                }
            }
        });

        for local in rx_result.iter() {
            result.indirect.extend(local.indirect);
            result.caustic.extend(local.caustic);
        }
    });

    // Normalize deposited flux by the number of emitted paths.
    let inv_path_count = 1.0 / path_count as Float;
    for photon in result.indirect.iter_mut().chain(result.caustic.iter_mut()) {
        photon.alpha *= inv_path_count;
    }

    info!(
        "Photon tracing done: {} indirect, {} caustic",
        result.indirect.len(),
        result.caustic.len()
    );

    result
}

// Follow one photon path. Low-discrepancy samples drive the emission;
// a per-path random stream drives the walk.
#[allow(clippy::too_many_arguments)]
fn trace_photon_path(
    scene: &dyn Scene,
    particles: &[VisibilityParticle],
    particle_bvh: &IndexBvh,
    params: &PhotonGIParams,
    want_indirect: bool,
    want_caustic: bool,
    path_index: u64,
    out: &mut TracedPhotons,
) {
    let mut rng = Rng::new(path_index);

    // Choose the light to shoot the photon from.
    let (light, light_pick_pdf) = match scene.emit_strategy().sample_lights(radical_inverse(0, path_index)) {
        Some(pick) => pick,
        None => return,
    };

    let u0 = Point2f::new(radical_inverse(1, path_index), radical_inverse(2, path_index));
    let u1 = Point2f::new(radical_inverse(3, path_index), radical_inverse(4, path_index));
    let time = radical_inverse(5, path_index);

    let emission = match light.emit(&u0, &u1, time) {
        Some(emission) => emission,
        None => return,
    };

    let mut alpha = emission.radiance / (emission.emit_pdf_w * light_pick_pdf);
    if alpha.is_black() {
        return;
    }

    let mut ray = emission.ray;
    let mut vol_info = PathVolumeInfo::new();
    let mut specular_only_path = true;

    let mut depth = 0;
    while depth < params.photon_max_depth {
        let intersection = scene.intersect(&mut ray, &mut vol_info, rng.uniform_float());
        alpha *= intersection.connection_throughput;
        let hit = match intersection.hit {
            Some(hit) => hit,
            None => break,
        };

        // Deposit after the first bounce, on storable surfaces near a
        // captured visibility particle. The first segment is direct
        // lighting and is handled by next-event estimation instead.
        if depth > 0 && !hit.bsdf.is_delta() {
            let sp = hit.bsdf.surface_point();
            let near_particle = particle_bvh
                .nearest_entry(particles, &sp.p, &sp.landing_shade_n(), sp.is_volume)
                .is_some();
            if near_particle {
                let photon = Photon {
                    p: sp.p,
                    alpha,
                    dir: -ray.d,
                    landing_n: sp.landing_shade_n(),
                    is_volume: sp.is_volume,
                };
                if specular_only_path && want_caustic {
                    out.caustic.push(photon);
                } else if !specular_only_path && want_indirect {
                    out.indirect.push(photon);
                }
            }
        }

        let sample = match hit.bsdf.sample(rng.uniform_float(), rng.uniform_float()) {
            Some(sample) => sample,
            None => break,
        };

        specular_only_path = specular_only_path && sample.event.contains(BsdfEvent::SPECULAR);
        alpha *= sample.value;

        // Russian roulette.
        if depth >= PHOTON_RR_DEPTH {
            let prob = russian_roulette_prob(&sample.value, PHOTON_RR_CAP);
            if rng.uniform_float() >= prob {
                break;
            }
            alpha /= prob;
        }

        if alpha.is_black() {
            break;
        }

        vol_info.update(sample.event, hit.bsdf.as_ref());
        ray.update(hit.bsdf.surface_point().ray_origin(&sample.wi), sample.wi);
        depth += 1;
    }
}
