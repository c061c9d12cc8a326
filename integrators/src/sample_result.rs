//! Sample Results

use lumen_core::base::{Float, INFINITY};
use lumen_core::geometry::{Normal3f, Point3f};
use lumen_core::spectrum::Spectrum;

/// One radiance sample produced by the integrator, destined for the film.
/// Eye samples are per-pixel normalized; light-subpath camera connections
/// are screen normalized.
#[derive(Clone, Debug)]
pub struct SampleResult {
    /// Film x coordinate.
    pub film_x: Float,

    /// Film y coordinate.
    pub film_y: Float,

    /// Accumulated radiance.
    pub radiance: Spectrum,

    /// Alpha channel; 0 when the eye ray escaped the scene.
    pub alpha: Float,

    /// First-hit albedo.
    pub albedo: Spectrum,

    /// First-hit world position.
    pub position: Point3f,

    /// First-hit geometric normal.
    pub geometry_normal: Normal3f,

    /// First-hit shading normal.
    pub shading_normal: Normal3f,

    /// First-hit irradiance estimate.
    pub irradiance: Spectrum,

    /// `true` for light-subpath results, which the film divides by the
    /// total screen sample count instead of the per-pixel count.
    pub is_screen_normalized: bool,

    /// The current vertex is the first of the path.
    pub first_path_vertex: bool,

    /// The current vertex cannot spawn another bounce.
    pub last_path_vertex: bool,

    /// The path has only crossed pass-through surfaces so far.
    pub pass_through_path: bool,

    /// The path is still a specular/glossy caustic candidate under hybrid
    /// back/forward routing.
    pub specular_glossy_caustic_path: bool,
}

impl SampleResult {
    /// Create a fresh eye sample.
    ///
    /// * `film_x` - Film x coordinate.
    /// * `film_y` - Film y coordinate.
    pub fn new_eye(film_x: Float, film_y: Float) -> Self {
        Self {
            film_x,
            film_y,
            radiance: Spectrum::ZERO,
            alpha: 1.0,
            albedo: Spectrum::ZERO,
            position: Point3f::new(INFINITY, INFINITY, INFINITY),
            geometry_normal: Normal3f::ZERO,
            shading_normal: Normal3f::ZERO,
            irradiance: Spectrum::ZERO,
            is_screen_normalized: false,
            first_path_vertex: true,
            last_path_vertex: false,
            pass_through_path: true,
            specular_glossy_caustic_path: true,
        }
    }

    /// Create a screen-normalized light-subpath sample.
    ///
    /// * `film_x` - Film x coordinate.
    /// * `film_y` - Film y coordinate.
    pub fn new_light(film_x: Float, film_y: Float) -> Self {
        Self {
            is_screen_normalized: true,
            ..Self::new_eye(film_x, film_y)
        }
    }
}
