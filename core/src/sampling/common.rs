//! Common

use crate::base::*;
use crate::geometry::{Point2f, Vector3f};
use crate::spectrum::Spectrum;

/// Uniformly sample a direction on the hemisphere around +z.
///
/// * `u` - The random sample.
pub fn uniform_sample_hemisphere(u: &Point2f) -> Vector3f {
    let z = u[0];
    let r = max(0.0, 1.0 - z * z).sqrt();
    let phi = TWO_PI * u[1];
    Vector3f::new(r * phi.cos(), r * phi.sin(), z)
}

/// Returns the PDF for uniform hemisphere sampling.
pub fn uniform_hemisphere_pdf() -> Float {
    INV_TWO_PI
}

/// Uniformly sample a direction on the full sphere.
///
/// * `u` - The random sample.
pub fn uniform_sample_sphere(u: &Point2f) -> Vector3f {
    let z = 1.0 - 2.0 * u[0];
    let r = max(0.0, 1.0 - z * z).sqrt();
    let phi = TWO_PI * u[1];
    Vector3f::new(r * phi.cos(), r * phi.sin(), z)
}

/// Returns the PDF for uniform sphere sampling.
pub fn uniform_sphere_pdf() -> Float {
    1.0 / FOUR_PI
}

/// Sample a point on the unit disk by mapping the unit square to concentric
/// rings, preserving stratification.
///
/// * `u` - The random sample.
pub fn concentric_sample_disk(u: &Point2f) -> Point2f {
    // Map uniform random numbers to [-1, 1]^2.
    let offset = Point2f::new(2.0 * u[0] - 1.0, 2.0 * u[1] - 1.0);

    // Handle degeneracy at the origin.
    if offset.x == 0.0 && offset.y == 0.0 {
        return Point2f::ZERO;
    }

    // Apply concentric mapping to point.
    let (r, theta) = if offset.x.abs() > offset.y.abs() {
        (offset.x, (PI / 4.0) * (offset.y / offset.x))
    } else {
        (offset.y, PI_OVER_TWO - (PI / 4.0) * (offset.x / offset.y))
    };
    Point2f::new(r * theta.cos(), r * theta.sin())
}

/// Cosine-weighted hemisphere sampling around +z via Malley's method.
///
/// * `u` - The random sample.
pub fn cosine_sample_hemisphere(u: &Point2f) -> Vector3f {
    let d = concentric_sample_disk(u);
    let z = max(0.0, 1.0 - d.x * d.x - d.y * d.y).sqrt();
    Vector3f::new(d.x, d.y, z)
}

/// Returns the PDF for cosine-weighted hemisphere sampling.
///
/// * `cos_theta` - Cosine of the sampled direction with the normal.
pub fn cosine_hemisphere_pdf(cos_theta: Float) -> Float {
    cos_theta * INV_PI
}

/// Computes the balance heuristic weight for two-strategy multiple importance
/// sampling.
///
/// * `nf`    - Number of samples for strategy f.
/// * `f_pdf` - PDF of strategy f.
/// * `ng`    - Number of samples for strategy g.
/// * `g_pdf` - PDF of strategy g.
pub fn balance_heuristic(nf: Int, f_pdf: Float, ng: Int, g_pdf: Float) -> Float {
    (nf as Float * f_pdf) / (nf as Float * f_pdf + ng as Float * g_pdf)
}

/// Computes the power heuristic (exponent 2) weight for two-strategy multiple
/// importance sampling.
///
/// * `nf`    - Number of samples for strategy f.
/// * `f_pdf` - PDF of strategy f.
/// * `ng`    - Number of samples for strategy g.
/// * `g_pdf` - PDF of strategy g.
pub fn power_heuristic(nf: Int, f_pdf: Float, ng: Int, g_pdf: Float) -> Float {
    let f = nf as Float * f_pdf;
    let g = ng as Float * g_pdf;
    if f * f + g * g == 0.0 {
        0.0
    } else {
        (f * f) / (f * f + g * g)
    }
}

/// Returns the Russian roulette survival probability for a sampled
/// throughput factor, bounded below by an importance cap.
///
/// * `value` - The sampled throughput factor.
/// * `cap`   - The importance cap.
pub fn russian_roulette_prob(value: &Spectrum, cap: Float) -> Float {
    clamp(value.max_component_value(), cap, 1.0)
}

/// Converts an area-measure PDF to a solid-angle-measure PDF.
///
/// * `pdf_a`     - Area PDF.
/// * `distance`  - Distance from the receiving point.
/// * `cos_there` - Cosine at the emitting surface.
pub fn pdf_a_to_w(pdf_a: Float, distance: Float, cos_there: Float) -> Float {
    if cos_there == 0.0 {
        0.0
    } else {
        pdf_a * distance * distance / cos_there.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_weights_of_paired_strategies_sum_to_one() {
        for &(f, g) in &[(0.25, 1.5), (3.0, 0.01), (1.0, 1.0)] {
            let p = power_heuristic(1, f, 1, g) + power_heuristic(1, g, 1, f);
            let b = balance_heuristic(1, f, 1, g) + balance_heuristic(1, g, 1, f);
            assert!((p - 1.0).abs() < 1e-5);
            assert!((b - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn russian_roulette_reweighting_is_unbiased() {
        use crate::rng::Rng;

        let value = Spectrum::new(0.4);
        for cap in [0.1, 0.7] {
            let prob = russian_roulette_prob(&value, cap);
            let mut rng = Rng::new(99);
            let trials = 200_000;
            let mut sum = 0.0_f64;
            for _ in 0..trials {
                if rng.uniform_float() < prob {
                    sum += (value.y() / prob) as f64;
                }
            }
            let estimate = sum / trials as f64;
            assert!(
                (estimate - value.y() as f64).abs() < 0.005,
                "estimate {estimate} deviates from {}",
                value.y()
            );
        }
    }

    #[test]
    fn russian_roulette_prob_is_capped() {
        assert_eq!(russian_roulette_prob(&Spectrum::new(0.01), 0.25), 0.25);
        assert_eq!(russian_roulette_prob(&Spectrum::new(0.6), 0.25), 0.6);
        assert_eq!(russian_roulette_prob(&Spectrum::new(4.0), 0.25), 1.0);
    }

    #[test]
    fn sphere_samples_are_unit_length() {
        for i in 0..64 {
            let u = Point2f::new((i as Float + 0.5) / 64.0, ((i * 7) % 64) as Float / 64.0);
            assert!((uniform_sample_sphere(&u).length() - 1.0).abs() < 1e-4);
            let h = uniform_sample_hemisphere(&u);
            assert!((h.length() - 1.0).abs() < 1e-4);
            assert!(h.z >= 0.0);
        }
    }
}
