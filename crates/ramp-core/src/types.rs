use ndarray::{Array2, Array4};

/// Photoelectron-count ramp data, shape `[n_ints, n_groups, n_rows, n_cols]`.
/// Gain has already been applied by the caller (spec §6).
pub type RampCube = Array4<f32>;

/// Group-level DQ flags, same shape as [`RampCube`].
pub type GroupDq = Array4<u32>;

/// Exposure-level per-pixel DQ flags, shape `[n_rows, n_cols]`.
pub type PixelDq = Array2<u32>;

/// Per-pixel read noise in electrons, shape `[n_rows, n_cols]`.
pub type ReadNoise2D = Array2<f32>;

/// Per-pixel gain in electrons/DN, shape `[n_rows, n_cols]`.
pub type Gain2D = Array2<f32>;

/// Exposure timing metadata (spec §3).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RampMeta {
    /// Frame readout time, in seconds.
    pub frame_time: f32,
    /// Time between the start of consecutive groups, in seconds.
    pub group_time: f32,
    /// Number of frames averaged per group.
    pub nframes: u32,
    /// Frames skipped between groups (not included in the group average).
    pub group_gap: u32,
    /// Frames dropped at the start of each integration.
    pub drop_frames1: u32,
}

impl RampMeta {
    /// `(nframes + group_gap) * frame_time`.
    pub fn effective_group_time(&self) -> f32 {
        (self.nframes + self.group_gap) as f32 * self.frame_time
    }

    /// Effective integration time used to convert optional-result slopes
    /// from electrons to electrons/second (`utils.py::output_optional`).
    pub fn effective_integration_time(&self) -> f32 {
        self.group_time
    }
}

/// Per-(integration, segment, pixel) weighted linear fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentFit {
    pub slope: f32,
    pub intercept: f32,
    pub var_poisson: f32,
    pub var_read: f32,
    /// Standard error of `slope`, from the weighted-regression covariance.
    pub sig_slope: f32,
    /// Standard error of `intercept`, from the weighted-regression covariance.
    pub sig_intercept: f32,
    pub weight_sum: f32,
    pub length: usize,
}

impl SegmentFit {
    /// The degenerate fit for a segment that could not be fit at all
    /// (e.g. zero-length or fully masked): zero slope, maximal variance.
    pub fn degenerate(length: usize) -> Self {
        Self {
            slope: 0.0,
            intercept: 0.0,
            var_poisson: crate::consts::LARGE_VARIANCE,
            var_read: crate::consts::LARGE_VARIANCE,
            sig_slope: crate::consts::LARGE_VARIANCE.sqrt(),
            sig_intercept: crate::consts::LARGE_VARIANCE.sqrt(),
            weight_sum: 0.0,
            length,
        }
    }
}

/// Combined per-pixel, per-integration ramp fit result.
#[derive(Clone, Debug)]
pub struct IntegrationResult {
    pub slope: Array2<f32>,
    pub var_poisson: Array2<f32>,
    pub var_read: Array2<f32>,
    pub var_total: Array2<f32>,
    pub dq: Array2<u32>,
}

/// Final exposure-level ramp fit result.
#[derive(Clone, Debug)]
pub struct ExposureResult {
    pub slope: Array2<f32>,
    pub err: Array2<f32>,
    pub var_poisson: Array2<f32>,
    pub var_read: Array2<f32>,
    pub dq: Array2<u32>,
}
