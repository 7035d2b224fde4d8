//! Per-segment diagnostic output, the "optional results" product (spec §4.7).
//!
//! Grounded on `utils.py::output_optional` and `utils.py::shrink_crmag`: the
//! per-pixel segment lists are ragged (different pixels keep different
//! numbers of segments and detected jumps), so the product is built by
//! accumulating into ragged per-pixel `Vec`s and only committing to a dense
//! `Array4` once every pixel has been visited and the true maximum depth is
//! known — this is `shrink_crmag`'s whole point: never over-allocate to a
//! worst-case bound.

use ndarray::{Array2, Array4};

use crate::consts::{LARGE_VARIANCE, LARGE_VARIANCE_THRESHOLD_FRACTION};
use crate::types::SegmentFit;

/// Dense optional-results product: per-integration, per-segment diagnostics.
#[derive(Clone, Debug)]
pub struct OptionalResults {
    /// Shape `[n_ints, max_segments, n_rows, n_cols]`, electrons/second.
    pub slope: Array4<f32>,
    pub intercept: Array4<f32>,
    pub var_poisson: Array4<f32>,
    pub var_read: Array4<f32>,
    /// Standard error of each segment's slope estimate.
    pub sig_slope: Array4<f32>,
    /// Standard error of each segment's intercept estimate.
    pub sig_intercept: Array4<f32>,
    pub weight: Array4<f32>,
    /// Shape `[n_ints, max_crs, n_rows, n_cols]`; 0.0 where no jump occurred.
    pub cr_mag: Array4<f32>,
}

/// Accumulates ragged per-pixel segment/jump diagnostics during a ramp fit,
/// then compacts them into a dense [`OptionalResults`] at the end.
pub struct OptionalAccumulator {
    n_ints: usize,
    n_rows: usize,
    n_cols: usize,
    effintim: f32,
    segments: Array2<Vec<SegmentFit>>,
    cr_mags: Array2<Vec<f32>>,
    per_integration_segments: Vec<Array2<Vec<SegmentFit>>>,
    per_integration_cr_mags: Vec<Array2<Vec<f32>>>,
}

impl OptionalAccumulator {
    pub fn new(n_ints: usize, n_rows: usize, n_cols: usize, effintim: f32) -> Self {
        Self {
            n_ints,
            n_rows,
            n_cols,
            effintim,
            segments: Array2::from_elem((n_rows, n_cols), Vec::new()),
            cr_mags: Array2::from_elem((n_rows, n_cols), Vec::new()),
            per_integration_segments: Vec::with_capacity(n_ints),
            per_integration_cr_mags: Vec::with_capacity(n_ints),
        }
    }

    /// Record one segment fit for a pixel within the integration currently
    /// being accumulated.
    pub fn record_segment(&mut self, row: usize, col: usize, fit: SegmentFit) {
        self.segments[[row, col]].push(fit);
    }

    /// Record one cosmic-ray magnitude (jump in first-difference units) for
    /// a pixel within the integration currently being accumulated.
    pub fn record_cr_magnitude(&mut self, row: usize, col: usize, magnitude: f32) {
        self.cr_mags[[row, col]].push(magnitude);
    }

    /// Close out the integration currently being accumulated and start a
    /// fresh one. Must be called once per integration, in order.
    pub fn finish_integration(&mut self) {
        let segs = std::mem::replace(&mut self.segments, Array2::from_elem((self.n_rows, self.n_cols), Vec::new()));
        let crs = std::mem::replace(&mut self.cr_mags, Array2::from_elem((self.n_rows, self.n_cols), Vec::new()));
        self.per_integration_segments.push(segs);
        self.per_integration_cr_mags.push(crs);
    }

    /// Compact all accumulated integrations into a dense product.
    pub fn finish(self) -> OptionalResults {
        let max_segments = self
            .per_integration_segments
            .iter()
            .flat_map(|plane| plane.iter())
            .map(|v| v.len())
            .max()
            .unwrap_or(0)
            .max(1);
        let max_crs = self
            .per_integration_cr_mags
            .iter()
            .flat_map(|plane| plane.iter())
            .map(|v| v.len())
            .max()
            .unwrap_or(0)
            .max(1);

        let shape4 = (self.n_ints, max_segments, self.n_rows, self.n_cols);
        let mut slope = Array4::<f32>::zeros(shape4);
        let mut intercept = Array4::<f32>::zeros(shape4);
        let mut var_poisson = Array4::<f32>::zeros(shape4);
        let mut var_read = Array4::<f32>::zeros(shape4);
        let mut sig_slope = Array4::<f32>::zeros(shape4);
        let mut sig_intercept = Array4::<f32>::zeros(shape4);
        let mut weight = Array4::<f32>::zeros(shape4);
        let mut cr_mag = Array4::<f32>::zeros((self.n_ints, max_crs, self.n_rows, self.n_cols));

        let threshold = LARGE_VARIANCE_THRESHOLD_FRACTION * LARGE_VARIANCE;

        for (integ, plane) in self.per_integration_segments.iter().enumerate() {
            for row in 0..self.n_rows {
                for col in 0..self.n_cols {
                    for (seg_idx, fit) in plane[[row, col]].iter().enumerate() {
                        let vp = if fit.var_poisson > threshold { 0.0 } else { fit.var_poisson };
                        let vr = if fit.var_read > threshold { 0.0 } else { fit.var_read };
                        let ss = if fit.sig_slope * fit.sig_slope > threshold { 0.0 } else { fit.sig_slope };
                        let si = if fit.sig_intercept * fit.sig_intercept > threshold {
                            0.0
                        } else {
                            fit.sig_intercept
                        };
                        let w = if fit.weight_sum <= 0.0 || 1.0 / fit.weight_sum > threshold {
                            0.0
                        } else {
                            fit.weight_sum
                        };
                        slope[[integ, seg_idx, row, col]] = fit.slope / self.effintim;
                        intercept[[integ, seg_idx, row, col]] = fit.intercept;
                        var_poisson[[integ, seg_idx, row, col]] = vp;
                        var_read[[integ, seg_idx, row, col]] = vr;
                        sig_slope[[integ, seg_idx, row, col]] = ss;
                        sig_intercept[[integ, seg_idx, row, col]] = si;
                        weight[[integ, seg_idx, row, col]] = w;
                    }
                }
            }
        }

        for (integ, plane) in self.per_integration_cr_mags.iter().enumerate() {
            for row in 0..self.n_rows {
                for col in 0..self.n_cols {
                    for (cr_idx, &mag) in plane[[row, col]].iter().enumerate() {
                        cr_mag[[integ, cr_idx, row, col]] = mag;
                    }
                }
            }
        }

        OptionalResults {
            slope,
            intercept,
            var_poisson,
            var_read,
            sig_slope,
            sig_intercept,
            weight,
            cr_mag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(slope: f32, var_poisson: f32, var_read: f32, weight_sum: f32) -> SegmentFit {
        SegmentFit {
            slope,
            intercept: 0.0,
            var_poisson,
            var_read,
            sig_slope: 0.1,
            sig_intercept: 0.1,
            weight_sum,
            length: 4,
        }
    }

    #[test]
    fn compacts_to_the_true_max_depth() {
        let mut acc = OptionalAccumulator::new(1, 1, 2, 10.0);
        acc.record_segment(0, 0, fit(100.0, 1.0, 1.0, 1.0));
        acc.record_segment(0, 1, fit(200.0, 1.0, 1.0, 1.0));
        acc.record_segment(0, 1, fit(210.0, 1.0, 1.0, 1.0));
        acc.finish_integration();
        let result = acc.finish();
        assert_eq!(result.slope.dim(), (1, 2, 1, 2));
        assert_eq!(result.slope[[0, 0, 0, 0]], 10.0);
        assert_eq!(result.slope[[0, 1, 0, 0]], 0.0);
        assert_eq!(result.slope[[0, 1, 0, 1]], 21.0);
    }

    #[test]
    fn zeroes_oversized_variance_and_weight() {
        let mut acc = OptionalAccumulator::new(1, 1, 1, 1.0);
        acc.record_segment(0, 0, fit(0.0, LARGE_VARIANCE, 1.0, 1.0));
        acc.finish_integration();
        let result = acc.finish();
        assert_eq!(result.var_poisson[[0, 0, 0, 0]], 0.0);
        assert_eq!(result.var_read[[0, 0, 0, 0]], 1.0);
    }

    #[test]
    fn no_crs_still_produces_a_one_deep_plane() {
        let mut acc = OptionalAccumulator::new(1, 1, 1, 1.0);
        acc.finish_integration();
        let result = acc.finish();
        assert_eq!(result.cr_mag.dim(), (1, 1, 1, 1));
        assert_eq!(result.cr_mag[[0, 0, 0, 0]], 0.0);
    }
}
