//! Light Subpath Tracing
//!
//! Traces subpaths from the lights and connects their vertices to the
//! camera. Under hybrid back/forward mode this is the half that handles the
//! specular/glossy caustic transport the eye subpaths intentionally skip.

use crate::path::{PathTracer, LIGHT_SAMPLE_BOOT_SIZE, LIGHT_SAMPLE_STEP_SIZE};
use crate::SampleResult;
use lumen_core::base::*;
use lumen_core::bsdf::{Bsdf, BsdfEvent};
use lumen_core::camera::Camera;
use lumen_core::film::Film;
use lumen_core::geometry::{Point2f, Point3f, Ray};
use lumen_core::light::LightSource;
use lumen_core::path::{PathDepthInfo, PathVolumeInfo};
use lumen_core::sampler::Sampler;
use lumen_core::sampling::russian_roulette_prob;
use lumen_core::scene::Scene;
use lumen_core::spectrum::Spectrum;

impl PathTracer {
    /// Trace one light subpath, connecting its vertices to the camera, and
    /// append any screen-space contributions to `sample_results`.
    ///
    /// * `scene`          - The scene.
    /// * `camera`         - The camera.
    /// * `film`           - The film, for its renderable sub-region.
    /// * `sampler`        - The sampler stream for this sample.
    /// * `sample_results` - Receives the camera connections.
    pub fn render_light_sample(
        &self,
        scene: &dyn Scene,
        camera: &dyn Camera,
        film: &dyn Film,
        sampler: &mut dyn Sampler,
        sample_results: &mut Vec<SampleResult>,
    ) {
        sample_results.clear();

        let time = camera.generate_ray_time(sampler.get_sample(12));

        // Select one light source by emission strategy.
        let (light, light_pick_pdf) = match scene.emit_strategy().sample_lights(sampler.get_sample(2)) {
            Some(pick) => pick,
            None => return,
        };

        // Initialize the light path.
        let emission = match light.emit(
            &Point2f::new(sampler.get_sample(3), sampler.get_sample(4)),
            &Point2f::new(sampler.get_sample(5), sampler.get_sample(6)),
            time,
        ) {
            Some(emission) => emission,
            None => return,
        };
        if emission.radiance.is_black() {
            return;
        }

        let mut light_path_flux = emission.radiance / (emission.emit_pdf_w * light_pick_pdf);
        debug_assert!(!light_path_flux.has_nans() && !light_path_flux.is_infinite());

        // Sample a point on the camera lens.
        let lens_point = match camera.sample_lens(
            time,
            &Point2f::new(sampler.get_sample(8), sampler.get_sample(9)),
        ) {
            Some(lens_point) => lens_point,
            None => return,
        };

        // Trace the light path.
        let mut next_event_ray = emission.ray;
        let mut vol_info = PathVolumeInfo::new();
        let mut depth_info = PathDepthInfo::new();

        while depth_info.depth < self.max_path_depth.depth {
            let sample_offset =
                LIGHT_SAMPLE_BOOT_SIZE + depth_info.depth as usize * LIGHT_SAMPLE_STEP_SIZE;

            let intersection =
                scene.intersect(&mut next_event_ray, &mut vol_info, sampler.get_sample(sample_offset));
            let hit = match intersection.hit {
                Some(hit) => hit,
                None => break, // Ray lost in space.
            };
            light_path_flux *= intersection.connection_throughput;

            // Try to connect the light path vertex with the eye. The first
            // vertex is skipped under hybrid mode: the eye subpaths already
            // handle direct lighting.
            if !self.hybrid_back_forward_enable || depth_info.depth > 0 {
                self.connect_to_camera(
                    scene,
                    camera,
                    film,
                    time,
                    sampler.get_sample(sample_offset + 1),
                    light.as_ref(),
                    hit.bsdf.as_ref(),
                    &lens_point,
                    &light_path_flux,
                    &vol_info,
                    sample_results,
                );
            }

            if depth_info.depth == self.max_path_depth.depth - 1 {
                break;
            }

            // Build the next vertex path ray.
            let bsdf = hit.bsdf.as_ref();
            let sample = match bsdf.sample(
                sampler.get_sample(sample_offset + 2),
                sampler.get_sample(sample_offset + 3),
            ) {
                Some(sample) if !sample.value.is_black() => sample,
                _ => break,
            };

            // This subpath exists to carry the transport the eye subpath
            // skips: continue only along specular or caustic-glossy
            // directions when hybrid mode is on.
            if self.hybrid_back_forward_enable
                && !(sample.event.contains(BsdfEvent::SPECULAR)
                    || (sample.event.contains(BsdfEvent::GLOSSY)
                        && bsdf.glossiness() <= self.hybrid_back_forward_glossiness_threshold))
            {
                break;
            }

            if depth_info.rr_depth() >= self.rr_depth {
                // Russian roulette.
                let prob = russian_roulette_prob(&sample.value, self.rr_importance_cap);
                if sampler.get_sample(sample_offset + 4) < prob {
                    light_path_flux /= prob;
                } else {
                    break;
                }
            }

            light_path_flux *= sample.value;
            debug_assert!(!light_path_flux.has_nans() && !light_path_flux.is_infinite());

            vol_info.update(sample.event, bsdf);
            depth_info.inc_depths(sample.event);
            next_event_ray.update(bsdf.surface_point().ray_origin(&sample.wi), sample.wi);
        }
    }

    /// Project a light path vertex through the camera; if the projection
    /// lands inside the visible sub-region and the lens is unoccluded,
    /// accumulate a screen-space radiance contribution.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn connect_to_camera(
        &self,
        scene: &dyn Scene,
        camera: &dyn Camera,
        film: &dyn Film,
        time: Float,
        u0: Float,
        _light: &dyn LightSource,
        bsdf: &dyn Bsdf,
        lens_point: &Point3f,
        flux: &Spectrum,
        vol_info: &PathVolumeInfo,
        sample_results: &mut Vec<SampleResult>,
    ) {
        // Camera invisible objects are never connected to the eye.
        if bsdf.is_camera_invisible() {
            return;
        }

        let sp = bsdf.surface_point();
        let mut eye_dir = sp.p - *lens_point;
        let eye_distance = eye_dir.length();
        if eye_distance == 0.0 {
            return;
        }
        eye_dir /= eye_distance;

        let (bsdf_eval, _, _) = bsdf.evaluate(&-eye_dir);
        if bsdf_eval.is_black() {
            return;
        }

        let mut eye_ray = Ray::new_segment(*lens_point, eye_dir, eye_distance, time);
        camera.clamp_ray(&mut eye_ray);

        let film_position = match camera.sample_position(&eye_ray) {
            Some(film_position) => film_position,
            None => return,
        };
        let sub_region = film.sub_region();
        if film_position.x < sub_region[0] as Float
            || film_position.x > sub_region[1] as Float
            || film_position.y < sub_region[2] as Float
            || film_position.y > sub_region[3] as Float
        {
            return;
        }

        // Trace the visibility ray from the surface back toward the lens;
        // the volume information describes the path from the light, so the
        // traced direction has to be flipped.
        let trace_ray = Ray::new_segment(sp.ray_origin(&-eye_dir), -eye_dir, eye_distance, time);
        let connection_throughput = match scene.transmittance(&trace_ray, vol_info, u0) {
            Some(connection_throughput) => connection_throughput,
            None => return, // The lens is occluded.
        };

        // Nothing was hit, the light path vertex is visible.
        let camera_pdf_w = camera.pdf_w(&eye_ray, film_position.x, film_position.y);
        if camera_pdf_w <= 0.0 {
            return;
        }
        let flux_to_radiance_factor = camera_pdf_w / (eye_distance * eye_distance);

        let mut sample_result = SampleResult::new_light(film_position.x, film_position.y);
        sample_result.radiance = connection_throughput * *flux * flux_to_radiance_factor * bsdf_eval;
        sample_results.push(sample_result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use lumen_core::paramset::ParamSet;
    use lumen_core::sampler::RandomSampler;

    #[test]
    fn light_subpaths_connect_to_the_camera() {
        let scene = PlaneScene::new(Spectrum::new(0.5), Spectrum::ONE);
        let camera = DownCamera { footprint: 4.0 };
        let film = StubFilm::new();
        let tracer = PathTracer::default();

        let mut connections = 0;
        let mut results = Vec::new();
        for i in 0..512 {
            let mut sampler = RandomSampler::new(i + 1);
            tracer.render_light_sample(&scene, &camera, &film, &mut sampler, &mut results);
            for result in &results {
                assert!(result.is_screen_normalized);
                assert!(!result.radiance.has_nans());
                assert!(!result.radiance.is_neg());
                let sub_region = film.sub_region();
                assert!(result.film_x >= sub_region[0] as Float);
                assert!(result.film_x <= (sub_region[1] + 1) as Float);
            }
            connections += results.len();
        }
        assert!(connections > 0, "no light subpath ever reached the camera");
    }

    #[test]
    fn hybrid_mode_skips_the_first_vertex_connection() {
        let scene = PlaneScene::new(Spectrum::new(0.5), Spectrum::ONE);
        let camera = DownCamera { footprint: 4.0 };
        let film = StubFilm::new();

        let mut props = ParamSet::new();
        props.add_bool("path.hybridbackforward.enable", &[true]);
        let tracer = PathTracer::from(&props);

        // Diffuse-only scene: under hybrid mode the first vertex is never
        // connected and diffuse continuations are cut, so no contribution
        // can ever be produced.
        let mut results = Vec::new();
        for i in 0..256 {
            let mut sampler = RandomSampler::new(i + 1);
            tracer.render_light_sample(&scene, &camera, &film, &mut sampler, &mut results);
            assert!(results.is_empty());
        }
    }
}
