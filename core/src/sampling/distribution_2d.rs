//! 2D Distribution.

use crate::base::*;
use crate::geometry::Point2f;
use crate::sampling::Distribution1D;

/// A piecewise-constant 2-D function over `[0,1]²`, stored as a conditional
/// distribution per row plus the row marginal. Built from a flat row-major
/// grid of `width * height` values.
#[derive(Clone, Debug)]
pub struct Distribution2D {
    /// 1-D conditional sampling density `p[ũ|ṽ]` for each row.
    p_conditional_v: Vec<Distribution1D>,

    /// Marginal sampling density `p[ṽ]`.
    p_marginal: Distribution1D,

    /// Grid width.
    width: usize,

    /// Grid height.
    height: usize,
}

impl Distribution2D {
    /// Build the distribution from a flat row-major grid.
    ///
    /// * `func`   - The grid values, `width * height` entries.
    /// * `width`  - Grid width.
    /// * `height` - Grid height.
    pub fn new(func: &[Float], width: usize, height: usize) -> Self {
        debug_assert_eq!(func.len(), width * height);

        let p_conditional_v: Vec<Distribution1D> = (0..height)
            .map(|v| Distribution1D::new(&func[v * width..(v + 1) * width]))
            .collect();
        let marginal_func: Vec<Float> = p_conditional_v.iter().map(|pcv| pcv.func_int()).collect();
        let p_marginal = Distribution1D::new(&marginal_func);

        Self {
            p_conditional_v,
            p_marginal,
            width,
            height,
        }
    }

    /// Returns the grid width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the grid height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the function value at a grid cell.
    ///
    /// * `x` - Column index.
    /// * `y` - Row index.
    pub fn func_value(&self, x: usize, y: usize) -> Float {
        self.p_conditional_v[y].func_value(x)
    }

    /// Return a sample point and PDF from the distribution given a random
    /// sample.
    ///
    /// * `u` - The random sample.
    pub fn sample_continuous(&self, u: &Point2f) -> (Point2f, Float) {
        // Sample the marginal to pick the row.
        let (d1, pdf1, v) = self.p_marginal.sample_continuous(u[1]);

        // Sample the conditional distribution of that row.
        let (d0, pdf0, _) = self.p_conditional_v[v].sample_continuous(u[0]);

        (Point2f::new(d0, d1), pdf0 * pdf1)
    }

    /// Return the PDF value for a given sample position.
    ///
    /// * `p` - Sample position in `[0,1]²`.
    pub fn pdf(&self, p: &Point2f) -> Float {
        let iu = clamp((p[0] * self.width as Float) as usize, 0_usize, self.width - 1);
        let iv = clamp((p[1] * self.height as Float) as usize, 0_usize, self.height - 1);
        if self.p_marginal.func_int() == 0.0 {
            0.0
        } else {
            self.p_conditional_v[iv].func_value(iu) / self.p_marginal.func_int()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_land_in_nonzero_cells() {
        // Only the right half of a 4x2 grid is nonzero.
        let func = [0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0];
        let d = Distribution2D::new(&func, 4, 2);
        for i in 0..64 {
            let u = Point2f::new((i as Float + 0.5) / 64.0, ((i * 13) % 64) as Float / 64.0);
            let (p, pdf) = d.sample_continuous(&u);
            assert!(p.x >= 0.5, "sampled zero-probability cell at {p:?}");
            assert!(pdf > 0.0);
        }
    }

    #[test]
    fn pdf_integrates_to_one() {
        let func = [0.5, 2.0, 0.0, 1.0, 1.5, 3.0];
        let d = Distribution2D::new(&func, 3, 2);
        let (w, h) = (d.width(), d.height());
        let mut integral = 0.0;
        for y in 0..h {
            for x in 0..w {
                let p = Point2f::new((x as Float + 0.5) / w as Float, (y as Float + 0.5) / h as Float);
                integral += d.pdf(&p) / (w * h) as Float;
            }
        }
        assert!((integral - 1.0).abs() < 1e-4);
    }
}
