//! Eye Subpath Tracing

use crate::path::{DirectLightResult, PathTracer, EYE_SAMPLE_BOOT_SIZE, EYE_SAMPLE_STEP_SIZE};
use crate::SampleResult;
use lumen_caches::visibility::EnvVisibilityCache;
use lumen_core::base::*;
use lumen_core::bsdf::{Bsdf, BsdfEvent};
use lumen_core::camera::Camera;
use lumen_core::film::Film;
use lumen_core::geometry::{Point2f, Ray, Vector3f};
use lumen_core::light::{from_lat_long_mapping, EnvLight, Illumination, LightSource};
use lumen_core::path::{PathDepthInfo, PathVolumeInfo};
use lumen_core::sampler::Sampler;
use lumen_core::sampling::{pdf_a_to_w, power_heuristic, russian_roulette_prob};
use lumen_core::scene::Scene;
use lumen_core::spectrum::Spectrum;
use lumen_caches::photongi::DebugMode;

// Connection distance used for environment light shadow rays.
const ENV_CONNECTION_DISTANCE: Float = 1e30;

impl PathTracer {
    /// Trace one eye subpath and append its sample to `sample_results`.
    ///
    /// * `scene`          - The scene.
    /// * `camera`         - The camera.
    /// * `film`           - The film, for its renderable sub-region.
    /// * `sampler`        - The sampler stream for this sample.
    /// * `sample_results` - Receives the finished eye sample.
    pub fn render_eye_sample(
        &self,
        scene: &dyn Scene,
        camera: &dyn Camera,
        film: &dyn Film,
        sampler: &mut dyn Sampler,
        sample_results: &mut Vec<SampleResult>,
    ) {
        let sub_region = film.sub_region();
        let film_x = lerp(sampler.get_sample(0), sub_region[0] as Float, (sub_region[1] + 1) as Float);
        let film_y = lerp(sampler.get_sample(1), sub_region[2] as Float, (sub_region[3] + 1) as Float);
        let mut sample_result = SampleResult::new_eye(film_x, film_y);

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

        let mut show_indirect_path_mix_used = false;
        let mut caustic_cache_already_used = false;
        let mut cache_enabled_on_last_hit = false;
        let mut albedo_to_do = true;
        // SPECULAR is required to avoid MIS on the first vertex.
        let mut last_event = BsdfEvent::SPECULAR;
        let mut last_pdf_w = 1.0;
        let mut last_glossiness = 0.0;
        let mut path_throughput = Spectrum::ONE;
        let mut depth_info = PathDepthInfo::new();

        loop {
            debug!(
                "Eye path bounce {}, L = {}, throughput = {}",
                depth_info.depth, sample_result.radiance, path_throughput
            );

            sample_result.first_path_vertex = depth_info.depth == 0;
            let sample_offset = EYE_SAMPLE_BOOT_SIZE + depth_info.depth as usize * EYE_SAMPLE_STEP_SIZE;

            let pass_through = sampler.get_sample(sample_offset);
            let intersection = scene.intersect(&mut ray, &mut vol_info, pass_through);
            path_throughput *= intersection.connection_throughput;

            let hit = match intersection.hit {
                Some(hit) => hit,
                None => {
                    // Nothing was hit, look for environment lights.
                    let photon_gi_visible = self.photon_gi_cache().map_or(true, |cache| {
                        cache.is_direct_light_hit_visible(caustic_cache_already_used, last_event, &depth_info)
                    });
                    if (!self.force_black_background || !sample_result.pass_through_path)
                        && (!self.hybrid_back_forward_enable
                            || depth_info.depth <= 1
                            || !sample_result.specular_glossy_caustic_path)
                        && photon_gi_visible
                    {
                        self.direct_hit_infinite_light(
                            scene,
                            &depth_info,
                            last_event,
                            &path_throughput,
                            &ray.d,
                            last_pdf_w,
                            &mut sample_result,
                        );
                    }

                    if sample_result.first_path_vertex {
                        sample_result.alpha = 0.0;
                    }
                    break;
                }
            };
            let bsdf = hit.bsdf.as_ref();

            // Something was hit.

            if albedo_to_do && !bsdf.is_delta() {
                sample_result.albedo = path_throughput * bsdf.albedo();
                albedo_to_do = false;
            }

            if sample_result.first_path_vertex {
                // The alpha value can still change if the material is a
                // shadow catcher (see below).
                let sp = bsdf.surface_point();
                sample_result.alpha = 1.0;
                sample_result.position = sp.p;
                sample_result.geometry_normal = sp.geometry_n;
                sample_result.shading_normal = sp.shade_n;
            }
            sample_result.last_path_vertex =
                depth_info.is_last_path_vertex(&self.max_path_depth, bsdf.event_types());

            // Check if it is a light source and emission has to be added.
            if bsdf.is_light_source()
                && (!self.hybrid_back_forward_enable
                    || depth_info.depth <= 1
                    || !sample_result.specular_glossy_caustic_path)
                && self.photon_gi_cache().map_or(true, |cache| {
                    cache.is_direct_light_hit_visible(caustic_cache_already_used, last_event, &depth_info)
                })
            {
                self.direct_hit_finite_light(
                    scene,
                    &depth_info,
                    last_event,
                    &path_throughput,
                    &ray.d,
                    hit.t,
                    bsdf,
                    last_pdf_w,
                    &mut sample_result,
                );
            }

            // Check if the photon cache can be used, in priority order.
            if let Some(cache) = self.photon_gi_cache() {
                let is_photon_gi_enabled = cache.is_photon_gi_enabled(bsdf);

                match cache.debug_mode() {
                    DebugMode::ShowIndirect => {
                        if is_photon_gi_enabled {
                            sample_result.radiance += cache.indirect_radiance(bsdf);
                        }
                        break;
                    }
                    DebugMode::ShowCaustic => {
                        if is_photon_gi_enabled {
                            sample_result.radiance += cache.caustic_radiance(bsdf);
                        }
                        break;
                    }
                    DebugMode::ShowIndirectPathMix => {
                        if is_photon_gi_enabled
                            && cache_enabled_on_last_hit
                            && hit.t > cache.indirect_usage_threshold(last_event, last_glossiness, pass_through)
                        {
                            sample_result.radiance = Spectrum::from_rgb(0.0, 0.0, 1.0);
                            show_indirect_path_mix_used = true;
                            break;
                        }
                    }
                    DebugMode::Off => {}
                }

                if is_photon_gi_enabled {
                    // The pass-through sample is reused here as a cheap
                    // extra random source; see the cache documentation.
                    if cache.is_indirect_enabled()
                        && cache_enabled_on_last_hit
                        && hit.t > cache.indirect_usage_threshold(last_event, last_glossiness, pass_through)
                    {
                        sample_result.radiance += path_throughput * cache.indirect_radiance(bsdf);
                        // The path can terminate here, all done.
                        break;
                    }

                    if cache.is_caustic_enabled() && !caustic_cache_already_used {
                        sample_result.radiance += path_throughput * cache.caustic_radiance(bsdf);
                    }

                    caustic_cache_already_used = true;
                    cache_enabled_on_last_hit = true;
                } else {
                    cache_enabled_on_last_hit = false;
                }
            }

            // Direct light sampling. It is avoided on the last vertex
            // because MIS with the unreachable BSDF strategy would only add
            // noise; the single first-and-last vertex case still samples,
            // without MIS.
            if sample_result.last_path_vertex && !sample_result.first_path_vertex {
                break;
            }

            let direct_light_result = self.direct_light_sampling(
                scene,
                time,
                [
                    sampler.get_sample(sample_offset + 1),
                    sampler.get_sample(sample_offset + 2),
                    sampler.get_sample(sample_offset + 3),
                    sampler.get_sample(sample_offset + 4),
                    sampler.get_sample(sample_offset + 5),
                ],
                &depth_info,
                &path_throughput,
                bsdf,
                &vol_info,
                &mut sample_result,
            );

            if sample_result.last_path_vertex {
                break;
            }

            // Build the next vertex path ray.
            let bsdf_sample = if bsdf.is_shadow_catcher() && direct_light_result != DirectLightResult::Shadowed
            {
                if sample_result.first_path_vertex {
                    sample_result.alpha = 0.0;
                }
                bsdf.shadow_catcher_sample()
            } else {
                sample_result.pass_through_path = false;
                bsdf.sample(
                    sampler.get_sample(sample_offset + 6),
                    sampler.get_sample(sample_offset + 7),
                )
            };
            let sample = match bsdf_sample {
                Some(sample) if !sample.value.is_black() => sample,
                _ => break,
            };
            debug_assert!(!sample.value.has_nans() && !sample.value.is_infinite() && !sample.value.is_neg());
            debug_assert!(!sample.pdf_w.is_nan() && !sample.pdf_w.is_infinite() && sample.pdf_w >= 0.0);

            sample_result.specular_glossy_caustic_path = self.is_still_specular_glossy_caustic_path(
                sample_result.specular_glossy_caustic_path,
                bsdf,
                sample.event,
                &depth_info,
            );

            depth_info.inc_depths(sample.event);

            // Russian roulette.
            let mut throughput_factor = Spectrum::ONE;
            if !sample.event.contains(BsdfEvent::SPECULAR) && depth_info.rr_depth() >= self.rr_depth {
                let rr_prob = russian_roulette_prob(&sample.value, self.rr_importance_cap);
                if rr_prob < sampler.get_sample(sample_offset + 8) {
                    break;
                }
                // Increase path contribution.
                throughput_factor /= rr_prob;
            }
            throughput_factor *= sample.value;

            path_throughput *= throughput_factor;
            debug_assert!(!path_throughput.has_nans() && !path_throughput.is_infinite());

            vol_info.update(sample.event, bsdf);
            ray.update(bsdf.surface_point().ray_origin(&sample.wi), sample.wi);
            last_event = sample.event;
            last_pdf_w = sample.pdf_w;
            last_glossiness = bsdf.glossiness();
        }

        if let Some(cache) = self.photon_gi_cache() {
            if cache.debug_mode() == DebugMode::ShowIndirectPathMix && !show_indirect_path_mix_used {
                sample_result.radiance = Spectrum::from_rgb(1.0, 0.0, 0.0);
            }
        }

        sample_results.push(sample_result);
    }

    /// Sample one light with next-event estimation, weighting the
    /// contribution with the power heuristic against BSDF sampling.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn direct_light_sampling(
        &self,
        scene: &dyn Scene,
        time: Float,
        u: [Float; 5],
        depth_info: &PathDepthInfo,
        path_throughput: &Spectrum,
        bsdf: &dyn Bsdf,
        vol_info: &PathVolumeInfo,
        sample_result: &mut SampleResult,
    ) -> DirectLightResult {
        if bsdf.is_delta() {
            return DirectLightResult::NotVisible;
        }

        // Select the light strategy to use.
        let strategy = if bsdf.is_shadow_catcher() {
            scene.infinite_strategy()
        } else {
            scene.illuminate_strategy()
        };

        let (light, light_pick_pdf) = match strategy.sample_lights(u[0]) {
            Some(pick) => pick,
            None => return DirectLightResult::NotVisible,
        };

        let sp = bsdf.surface_point();

        // Environment lights go through the visibility cache when one is
        // attached; a missing or degenerate cache entry falls back to the
        // light's own sampling.
        let illumination = match (light.as_env(), self.env_visibility.as_ref()) {
            (Some(env), Some(cache)) => sample_env_with_cache(cache, env, bsdf, u[1], u[2])
                .or_else(|| light.illuminate(&sp.p, time, &Point2f::new(u[1], u[2]))),
            _ => light.illuminate(&sp.p, time, &Point2f::new(u[1], u[2])),
        };
        let illumination = match illumination {
            Some(illumination) => illumination,
            None => return DirectLightResult::NotVisible,
        };
        debug_assert!(!illumination.radiance.has_nans() && !illumination.radiance.is_infinite());

        let (bsdf_eval, event, mut bsdf_pdf_w) = bsdf.evaluate(&illumination.dir);
        if bsdf_eval.is_black() {
            return DirectLightResult::NotVisible;
        }

        // Under hybrid routing, caustic-candidate vertices leave this
        // transport to the light subpaths.
        if self.hybrid_back_forward_enable
            && depth_info.depth != 0
            && self.is_still_specular_glossy_caustic_path(
                sample_result.specular_glossy_caustic_path,
                bsdf,
                event,
                depth_info,
            )
        {
            return DirectLightResult::NotVisible;
        }

        // Depth counters of the implied path to the light source.
        let mut direct_light_depth_info = *depth_info;
        direct_light_depth_info.inc_depths(event);

        let shadow_ray =
            Ray::new_segment(sp.ray_origin(&illumination.dir), illumination.dir, illumination.distance, time);

        // Check if the light source is visible.
        match scene.transmittance(&shadow_ray, vol_info, u[4]) {
            Some(connection_throughput) => {
                // Add the light contribution only if the material is not a
                // shadow catcher (a visible light makes it transparent).
                if !bsdf.is_shadow_catcher() {
                    let direct_light_sampling_pdf_w = illumination.direct_pdf_w * light_pick_pdf;
                    let factor = 1.0 / direct_light_sampling_pdf_w;

                    if direct_light_depth_info.rr_depth() >= self.rr_depth {
                        // Russian roulette would have been applied to the
                        // BSDF-sampled version of this path.
                        bsdf_pdf_w *= russian_roulette_prob(&bsdf_eval, self.rr_importance_cap);
                    }

                    // Account for material transparency between the light
                    // and the scene.
                    bsdf_pdf_w *= light.avg_pass_through_transparency();

                    // MIS between direct light sampling and BSDF sampling,
                    // avoided on the last path vertex where the BSDF
                    // strategy cannot reach the light.
                    let mis_enabled = !sample_result.last_path_vertex
                        && (light.is_environmental() || light.is_intersectable())
                        && Self::check_direct_hit_visibility_flags(
                            light.as_ref(),
                            &direct_light_depth_info,
                            event,
                        );
                    let weight = if mis_enabled {
                        power_heuristic(1, direct_light_sampling_pdf_w, 1, bsdf_pdf_w)
                    } else {
                        1.0
                    };

                    let incoming_radiance =
                        bsdf_eval * (weight * factor) * connection_throughput * illumination.radiance;
                    sample_result.radiance += *path_throughput * incoming_radiance;

                    // First-vertex irradiance estimate; light sources are
                    // only sampled here for it, so no MIS.
                    if sample_result.first_path_vertex && !bsdf.event_types().contains(BsdfEvent::SPECULAR) {
                        sample_result.irradiance = (INV_PI
                            * sp.shade_n.abs_dot_vector(&illumination.dir)
                            * factor)
                            * connection_throughput
                            * illumination.radiance;
                    }
                }

                DirectLightResult::Illuminated
            }
            None => DirectLightResult::Shadowed,
        }
    }

    /// Accumulate emission from a directly hit, intersectable light source,
    /// MIS-weighted against direct light sampling.
    #[allow(clippy::too_many_arguments)]
    fn direct_hit_finite_light(
        &self,
        scene: &dyn Scene,
        depth_info: &PathDepthInfo,
        last_event: BsdfEvent,
        path_throughput: &Spectrum,
        ray_dir: &Vector3f,
        distance: Float,
        bsdf: &dyn Bsdf,
        last_pdf_w: Float,
        sample_result: &mut SampleResult,
    ) {
        let light = match scene.lights().get(bsdf.light_id()) {
            Some(light) => light,
            None => return,
        };

        // Check if the light source is visible according to the settings.
        if !Self::check_direct_hit_visibility_flags(light.as_ref(), depth_info, last_event) {
            return;
        }

        let (emitted_radiance, direct_pdf_a) = bsdf.emitted_radiance();
        if emitted_radiance.is_black() {
            return;
        }

        let weight = if !last_event.contains(BsdfEvent::SPECULAR) {
            let light_pick_prob = scene.illuminate_strategy().sample_light_pdf(light.id());
            let direct_pdf_w = pdf_a_to_w(
                direct_pdf_a,
                distance,
                bsdf.surface_point().shade_n.abs_dot_vector(ray_dir),
            );

            // MIS between BSDF sampling and direct light sampling.
            power_heuristic(
                1,
                last_pdf_w * light.avg_pass_through_transparency(),
                1,
                direct_pdf_w * light_pick_prob,
            )
        } else {
            1.0
        };

        sample_result.radiance += *path_throughput * weight * emitted_radiance;
    }

    /// Accumulate emission from the environment lights for an escaped ray,
    /// MIS-weighted against direct light sampling.
    pub(crate) fn direct_hit_infinite_light(
        &self,
        scene: &dyn Scene,
        depth_info: &PathDepthInfo,
        last_event: BsdfEvent,
        path_throughput: &Spectrum,
        ray_dir: &Vector3f,
        last_pdf_w: Float,
        sample_result: &mut SampleResult,
    ) {
        for env_light in scene.env_lights() {
            // Check if the light source is visible according to the settings.
            if !Self::check_direct_hit_visibility_flags(env_light.as_ref(), depth_info, last_event) {
                continue;
            }

            let (env_radiance, direct_pdf_w) = env_light.radiance(ray_dir);
            if env_radiance.is_black() {
                continue;
            }

            let weight = if !last_event.contains(BsdfEvent::SPECULAR) {
                let light_pick_prob = scene.illuminate_strategy().sample_light_pdf(env_light.id());

                // MIS between BSDF sampling and direct light sampling.
                power_heuristic(1, last_pdf_w, 1, direct_pdf_w * light_pick_prob)
            } else {
                1.0
            };

            sample_result.radiance += *path_throughput * weight * env_radiance;
        }
    }
}

/// Importance-sample the environment through a cluster's visibility map.
/// Returns `None` when no usable map covers the shading point, or the
/// sample is degenerate.
///
/// * `cache` - The visibility cache.
/// * `env`   - The environment light.
/// * `bsdf`  - The shading context.
/// * `u0`    - First random sample.
/// * `u1`    - Second random sample.
fn sample_env_with_cache(
    cache: &EnvVisibilityCache,
    env: &dyn EnvLight,
    bsdf: &dyn Bsdf,
    u0: Float,
    u1: Float,
) -> Option<Illumination> {
    let map = cache.visibility_map(bsdf)?;

    let (uv, map_pdf) = map.sample_continuous(&Point2f::new(u0, u1));
    if map_pdf <= 0.0 {
        return None;
    }

    let (local_dir, mapping_pdf) = from_lat_long_mapping(uv.x, uv.y);
    if mapping_pdf == 0.0 {
        return None;
    }

    let dir = env.to_world(&local_dir);
    let (radiance, _) = env.radiance(&dir);
    if radiance.is_black() {
        return None;
    }

    Some(Illumination {
        dir,
        distance: ENV_CONNECTION_DISTANCE,
        direct_pdf_w: map_pdf * mapping_pdf,
        radiance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use lumen_caches::visibility::{EnvVisibilityCache, EnvVisibilityCacheParams};
    use lumen_core::paramset::ParamSet;
    use lumen_core::sampler::RandomSampler;
    use std::sync::Arc;

    fn average_eye_radiance(tracer: &PathTracer, scene: &PlaneScene, n_samples: usize) -> Float {
        let camera = DownCamera { footprint: 4.0 };
        let film = StubFilm::new();

        let mut sum = 0.0;
        let mut results = Vec::new();
        for i in 0..n_samples {
            let mut sampler = RandomSampler::new(i as u64 + 1);
            results.clear();
            tracer.render_eye_sample(scene, &camera, &film, &mut sampler, &mut results);
            assert_eq!(results.len(), 1);
            assert!(!results[0].radiance.has_nans());
            sum += results[0].radiance.y();
        }
        sum / n_samples as Float
    }

    // A diffuse plane under a constant environment light has the analytic
    // reflected radiance rho * L.
    #[test]
    fn constant_env_over_lambertian_plane_matches_analytic_value() {
        let rho = 0.5;
        let scene = PlaneScene::new(Spectrum::new(rho), Spectrum::ONE);
        let tracer = PathTracer::default();

        let estimate = average_eye_radiance(&tracer, &scene, 10_000);
        assert!(
            (estimate - rho).abs() < 0.04,
            "estimate {estimate} deviates from analytic {rho}"
        );
    }

    // Capping the diffuse depth at one keeps the estimator unbiased: the
    // first vertex becomes terminal and is lit by next-event estimation
    // alone.
    #[test]
    fn terminal_first_vertex_is_lit_without_mis() {
        let rho = 0.5;
        let scene = PlaneScene::new(Spectrum::new(rho), Spectrum::ONE);
        let mut props = ParamSet::new();
        props.add_int("path.pathdepth.diffuse", &[1]);
        let tracer = PathTracer::from(&props);

        let estimate = average_eye_radiance(&tracer, &scene, 10_000);
        assert!(
            (estimate - rho).abs() < 0.05,
            "estimate {estimate} deviates from analytic {rho}"
        );
    }

    // A scene whose every shadow ray is occluded produces clusters with
    // null visibility maps; illumination queries fall back to uniform
    // sampling without crashing.
    #[test]
    fn all_occluded_clusters_fall_back_to_uniform_sampling() {
        let mut scene = PlaneScene::new(Spectrum::new(0.5), Spectrum::ONE);
        scene.occlude_shadow_rays = true;

        let camera = DownCamera { footprint: 4.0 };
        let film = StubFilm::new();

        let mut params = EnvVisibilityCacheParams::default();
        params.map.width = 16;
        params.map.height = 8;
        params.visibility.max_sample_count = 64;
        params.visibility.max_path_depth = 2;
        params.visibility.lookup_radius = 1.0;

        let env = ConstantEnvLight {
            id: 0,
            radiance: Spectrum::ONE,
        };
        let cache = EnvVisibilityCache::build(&scene, &camera, &film, &env, None, params).unwrap();

        assert!(!cache.entries().is_empty());
        assert!(cache.entries().iter().all(|entry| entry.map.is_none()));

        let mut tracer = PathTracer::default();
        tracer.set_env_visibility_cache(Some(Arc::new(cache)));

        // Every illumination query now falls back to the light's own
        // sampling; nothing panics and the result stays finite.
        let estimate = average_eye_radiance(&tracer, &scene, 256);
        assert!(estimate.is_finite());
    }

    // With the shadow rays clear, built visibility maps exist and cache
    // driven sampling still produces a finite, unbiased-looking estimate.
    #[test]
    fn visibility_cache_sampling_produces_reasonable_radiance() {
        let rho = 0.5;
        let scene = PlaneScene::new(Spectrum::new(rho), Spectrum::ONE);

        let camera = DownCamera { footprint: 4.0 };
        let film = StubFilm::new();

        let mut params = EnvVisibilityCacheParams::default();
        params.map.width = 16;
        params.map.height = 8;
        params.visibility.max_sample_count = 64;
        params.visibility.max_path_depth = 2;
        params.visibility.lookup_radius = 1.0;

        let env = ConstantEnvLight {
            id: 0,
            radiance: Spectrum::ONE,
        };
        let cache = EnvVisibilityCache::build(&scene, &camera, &film, &env, None, params).unwrap();
        assert!(cache.entries().iter().any(|entry| entry.map.is_some()));

        let mut tracer = PathTracer::default();
        tracer.set_env_visibility_cache(Some(Arc::new(cache)));

        let estimate = average_eye_radiance(&tracer, &scene, 4_096);
        assert!(estimate.is_finite());
        assert!(estimate > 0.0);
    }
}
