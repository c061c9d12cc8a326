//! Camera Interface

use crate::base::Float;
use crate::geometry::{Point2f, Point3f, Ray};
use crate::path::PathVolumeInfo;

/// The camera model consumed by the integrator. Ray generation and lens
/// sampling implementations live outside this crate.
pub trait Camera: Send + Sync {
    /// Generate a primary ray through a film position.
    ///
    /// * `film_x`   - Film x coordinate.
    /// * `film_y`   - Film y coordinate.
    /// * `time`     - Ray time.
    /// * `u0`       - Lens sample.
    /// * `u1`       - Lens sample.
    /// * `vol_info` - Receives the camera's initial volume stack.
    fn generate_ray(
        &self,
        film_x: Float,
        film_y: Float,
        time: Float,
        u0: Float,
        u1: Float,
        vol_info: &mut PathVolumeInfo,
    ) -> Ray;

    /// Map a shutter sample to a ray time.
    ///
    /// * `u` - The random sample.
    fn generate_ray_time(&self, u: Float) -> Float {
        u
    }

    /// Sample a point on the lens. Returns `None` for camera models without
    /// a samplable lens.
    ///
    /// * `time` - Ray time.
    /// * `u`    - The random sample.
    fn sample_lens(&self, time: Float, u: &Point2f) -> Option<Point3f>;

    /// Project a ray arriving at the lens back to its film position. Returns
    /// `None` when the ray misses the film.
    ///
    /// * `ray` - The arriving ray.
    fn sample_position(&self, ray: &Ray) -> Option<Point2f>;

    /// Returns the solid-angle PDF of the camera generating the given ray,
    /// used for flux-to-radiance conversion of light subpath connections.
    ///
    /// * `ray`    - The ray.
    /// * `film_x` - Film x coordinate of the projection.
    /// * `film_y` - Film y coordinate of the projection.
    fn pdf_w(&self, ray: &Ray, film_x: Float, film_y: Float) -> Float;

    /// Clip a ray against the camera near/far planes.
    ///
    /// * `ray` - The ray to clip.
    fn clamp_ray(&self, ray: &mut Ray);
}
