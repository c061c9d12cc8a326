//! 1D Distribution.

use crate::base::*;

/// A piecewise-constant 1-D function with its CDF, supporting continuous and
/// discrete sampling.
#[derive(Clone, Debug)]
pub struct Distribution1D {
    /// The piecewise-constant function values.
    func: Vec<Float>,

    /// CDF over `func`, with `count + 1` entries.
    cdf: Vec<Float>,

    /// Integral of `func` over [0, 1].
    func_int: Float,
}

impl Distribution1D {
    /// Build the distribution for a piecewise-constant function. An all-zero
    /// function degrades to uniform sampling with zero PDF.
    ///
    /// * `f` - The function values.
    pub fn new(f: &[Float]) -> Self {
        let n = f.len();
        debug_assert!(n > 0);

        // Integrate the step function.
        let mut cdf = Vec::with_capacity(n + 1);
        cdf.push(0.0);
        for i in 1..=n {
            cdf.push(cdf[i - 1] + f[i - 1] / n as Float);
        }

        // Normalize to a CDF.
        let func_int = cdf[n];
        if func_int == 0.0 {
            for (i, v) in cdf.iter_mut().enumerate().skip(1) {
                *v = i as Float / n as Float;
            }
        } else {
            for v in cdf.iter_mut().skip(1) {
                *v /= func_int;
            }
        }

        Self {
            func: f.to_vec(),
            cdf,
            func_int,
        }
    }

    /// Returns the number of function values.
    pub fn count(&self) -> usize {
        self.func.len()
    }

    /// Returns the function value at a cell.
    ///
    /// * `index` - Cell index.
    pub fn func_value(&self, index: usize) -> Float {
        self.func[index]
    }

    /// Returns the integral of the function.
    pub fn func_int(&self) -> Float {
        self.func_int
    }

    /// Sample the continuous distribution, returning the sampled position in
    /// [0, 1), the PDF, and the cell index.
    ///
    /// * `u` - The random sample.
    pub fn sample_continuous(&self, u: Float) -> (Float, Float, usize) {
        let offset = find_interval(self.cdf.len(), |index| self.cdf[index] <= u);

        let mut du = u - self.cdf[offset];
        let delta = self.cdf[offset + 1] - self.cdf[offset];
        if delta > 0.0 {
            du /= delta;
        }
        debug_assert!(!du.is_nan());

        let pdf = if self.func_int > 0.0 {
            self.func[offset] / self.func_int
        } else {
            0.0
        };

        ((offset as Float + du) / self.count() as Float, pdf, offset)
    }

    /// Sample the discrete distribution, returning the cell index, its
    /// probability, and the remapped random value.
    ///
    /// * `u` - The random sample.
    pub fn sample_discrete(&self, u: Float) -> (usize, Float, Float) {
        let offset = find_interval(self.cdf.len(), |index| self.cdf[index] <= u);
        let pdf = self.discrete_pdf(offset);
        let delta = self.cdf[offset + 1] - self.cdf[offset];
        let u_remapped = if delta > 0.0 { (u - self.cdf[offset]) / delta } else { 0.0 };
        (offset, pdf, u_remapped)
    }

    /// Returns the probability of sampling a given cell from the discrete
    /// distribution.
    ///
    /// * `index` - Cell index.
    pub fn discrete_pdf(&self, index: usize) -> Float {
        if self.func_int > 0.0 {
            self.func[index] / (self.func_int * self.count() as Float)
        } else {
            0.0
        }
    }
}
