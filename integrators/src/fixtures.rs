//! Test Fixtures
//!
//! Minimal scene collaborators used by the integrator tests: a Lambertian
//! plane, a constant environment light and an orthographic downward camera.

use lumen_core::base::*;
use lumen_core::bsdf::{Bsdf, BsdfEvent, BsdfSample, SurfacePoint};
use lumen_core::camera::Camera;
use lumen_core::film::Film;
use lumen_core::geometry::{Bounds3f, Frame, Normal3f, Point2f, Point3f, Ray, Vector3f};
use lumen_core::light::{
    ArcEnvLight, ArcLight, Emission, EnvLight, Illumination, LightSource, LightStrategy,
};
use lumen_core::path::PathVolumeInfo;
use lumen_core::sampling::{
    cosine_sample_hemisphere, uniform_sample_sphere, uniform_sphere_pdf, cosine_hemisphere_pdf,
};
use lumen_core::scene::{Intersection, Scene, SceneHit};
use lumen_core::spectrum::Spectrum;
use std::sync::Arc;

pub const WORLD_RADIUS: Float = 1.0e4;

/// A Lambertian BSDF at a surface point.
pub struct LambertianBsdf {
    pub sp: SurfacePoint,
    pub rho: Spectrum,
}

impl Bsdf for LambertianBsdf {
    fn surface_point(&self) -> &SurfacePoint {
        &self.sp
    }

    fn evaluate(&self, wi: &Vector3f) -> (Spectrum, BsdfEvent, Float) {
        let cos = self.sp.landing_shade_n().dot_vector(wi);
        if cos <= 0.0 {
            return (Spectrum::ZERO, BsdfEvent::NONE, 0.0);
        }
        (
            self.rho * INV_PI * cos,
            BsdfEvent::DIFFUSE | BsdfEvent::REFLECT,
            cosine_hemisphere_pdf(cos),
        )
    }

    fn sample(&self, u0: Float, u1: Float) -> Option<BsdfSample> {
        let local = cosine_sample_hemisphere(&Point2f::new(u0, u1));
        if local.z <= 0.0 {
            return None;
        }
        let frame = Frame::from_normal(&self.sp.landing_shade_n());
        Some(BsdfSample {
            wi: frame.to_world(&local),
            // f * cos / pdf collapses to the albedo for a Lambertian lobe.
            value: self.rho,
            pdf_w: cosine_hemisphere_pdf(local.z),
            event: BsdfEvent::DIFFUSE | BsdfEvent::REFLECT,
        })
    }

    fn albedo(&self) -> Spectrum {
        self.rho
    }

    fn event_types(&self) -> BsdfEvent {
        BsdfEvent::DIFFUSE | BsdfEvent::REFLECT
    }

    fn is_delta(&self) -> bool {
        false
    }
}

/// A constant-radiance environment light.
pub struct ConstantEnvLight {
    pub id: usize,
    pub radiance: Spectrum,
}

impl LightSource for ConstantEnvLight {
    fn id(&self) -> usize {
        self.id
    }

    fn illuminate(&self, _p: &Point3f, _time: Float, u: &Point2f) -> Option<Illumination> {
        Some(Illumination {
            dir: uniform_sample_sphere(u),
            distance: WORLD_RADIUS,
            direct_pdf_w: uniform_sphere_pdf(),
            radiance: self.radiance,
        })
    }

    fn emit(&self, u0: &Point2f, _u1: &Point2f, time: Float) -> Option<Emission> {
        // Shoot from the bounding sphere toward the scene center.
        let to_light = uniform_sample_sphere(u0);
        let origin = Point3f::ZERO + to_light * WORLD_RADIUS;
        let mut ray = Ray::new(origin, -to_light);
        ray.time = time;
        Some(Emission {
            ray,
            emit_pdf_w: uniform_sphere_pdf(),
            radiance: self.radiance,
        })
    }

    fn direct_pdf(&self, _p: &Point3f, _wi: &Vector3f) -> Float {
        uniform_sphere_pdf()
    }

    fn power(&self) -> Spectrum {
        self.radiance
    }

    fn is_environmental(&self) -> bool {
        true
    }

    fn as_env(&self) -> Option<&dyn EnvLight> {
        Some(self)
    }
}

impl EnvLight for ConstantEnvLight {
    fn radiance(&self, _dir: &Vector3f) -> (Spectrum, Float) {
        (self.radiance, uniform_sphere_pdf())
    }
}

/// An infinite Lambertian plane at y=0 under a constant environment light.
/// `occlude_shadow_rays` turns every transmittance query opaque, for
/// all-occluded visibility cache scenarios.
pub struct PlaneScene {
    pub rho: Spectrum,
    pub occlude_shadow_rays: bool,
    lights: Vec<ArcLight>,
    env_lights: Vec<ArcEnvLight>,
    illuminate: LightStrategy,
    emit: LightStrategy,
    infinite: LightStrategy,
}

impl PlaneScene {
    pub fn new(rho: Spectrum, env_radiance: Spectrum) -> Self {
        let env = Arc::new(ConstantEnvLight {
            id: 0,
            radiance: env_radiance,
        });
        let lights: Vec<ArcLight> = vec![Arc::clone(&env) as ArcLight];
        let env_lights: Vec<ArcEnvLight> = vec![env as ArcEnvLight];
        Self {
            rho,
            occlude_shadow_rays: false,
            illuminate: LightStrategy::new(lights.clone()),
            emit: LightStrategy::new(lights.clone()),
            infinite: LightStrategy::new(lights.clone()),
            lights,
            env_lights,
        }
    }

    fn intersect_plane(&self, ray: &Ray) -> Option<(Float, Point3f)> {
        if ray.d.y.abs() < 1e-9 {
            return None;
        }
        let t = -ray.o.y / ray.d.y;
        if t <= ray.t_min || t >= ray.t_max {
            return None;
        }
        Some((t, ray.at(t)))
    }
}

impl Scene for PlaneScene {
    fn intersect(&self, ray: &mut Ray, _vol_info: &mut PathVolumeInfo, _pass_through: Float) -> Intersection {
        let hit = self.intersect_plane(ray).map(|(t, p)| {
            ray.t_max = t;
            let up = Normal3f::new(0.0, 1.0, 0.0);
            SceneHit {
                t,
                bsdf: Box::new(LambertianBsdf {
                    sp: SurfacePoint {
                        p,
                        geometry_n: up,
                        shade_n: up,
                        into_object: ray.d.y < 0.0,
                        is_volume: false,
                    },
                    rho: self.rho,
                }) as Box<dyn Bsdf>,
            }
        });
        Intersection {
            connection_throughput: Spectrum::ONE,
            hit,
        }
    }

    fn transmittance(
        &self,
        shadow_ray: &Ray,
        _vol_info: &PathVolumeInfo,
        _pass_through: Float,
    ) -> Option<Spectrum> {
        if self.occlude_shadow_rays || self.intersect_plane(shadow_ray).is_some() {
            None
        } else {
            Some(Spectrum::ONE)
        }
    }

    fn world_bound(&self) -> Bounds3f {
        Bounds3f::new(Point3f::new(-100.0, -1.0, -100.0), Point3f::new(100.0, 20.0, 100.0))
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

/// An orthographic camera 10 units above the plane looking straight down,
/// mapping film coordinates to a square footprint around the origin.
pub struct DownCamera {
    pub footprint: Float,
}

impl DownCamera {
    const HEIGHT: Float = 10.0;
    const FILM_SIZE: Float = 16.0;
}

impl Camera for DownCamera {
    fn generate_ray(
        &self,
        film_x: Float,
        film_y: Float,
        time: Float,
        _u0: Float,
        _u1: Float,
        _vol_info: &mut PathVolumeInfo,
    ) -> Ray {
        let x = (film_x / Self::FILM_SIZE - 0.5) * self.footprint;
        let z = (film_y / Self::FILM_SIZE - 0.5) * self.footprint;
        let mut ray = Ray::new(Point3f::new(x, Self::HEIGHT, z), Vector3f::new(0.0, -1.0, 0.0));
        ray.time = time;
        ray
    }

    fn sample_lens(&self, _time: Float, _u: &Point2f) -> Option<Point3f> {
        Some(Point3f::new(0.0, Self::HEIGHT, 0.0))
    }

    fn sample_position(&self, ray: &Ray) -> Option<Point2f> {
        // Project the arriving ray's target onto the film square.
        let target = ray.at(ray.t_max.min(2.0 * Self::HEIGHT));
        let film_x = (target.x / self.footprint + 0.5) * Self::FILM_SIZE;
        let film_y = (target.z / self.footprint + 0.5) * Self::FILM_SIZE;
        if (0.0..Self::FILM_SIZE).contains(&film_x) && (0.0..Self::FILM_SIZE).contains(&film_y) {
            Some(Point2f::new(film_x, film_y))
        } else {
            None
        }
    }

    fn pdf_w(&self, _ray: &Ray, _film_x: Float, _film_y: Float) -> Float {
        1.0
    }

    fn clamp_ray(&self, _ray: &mut Ray) {}
}

/// A film stub exposing only the statistics the integrator reads.
pub struct StubFilm {
    pub samples: f64,
    pub pixels: usize,
}

impl StubFilm {
    pub fn new() -> Self {
        Self {
            samples: 0.0,
            pixels: 256,
        }
    }
}

impl Film for StubFilm {
    fn total_sample_count(&self) -> f64 {
        self.samples
    }

    fn pixel_count(&self) -> usize {
        self.pixels
    }

    fn sub_region(&self) -> [u32; 4] {
        [0, 15, 0, 15]
    }
}
