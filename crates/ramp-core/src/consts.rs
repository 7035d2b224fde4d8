/// Sentinel variance for nonexistent or fully degenerate segments/ramps.
pub const LARGE_VARIANCE: f32 = 1.0e8;

/// Variance values above this fraction of `LARGE_VARIANCE` are treated as
/// "no such segment" and zeroed on optional-result output.
pub const LARGE_VARIANCE_THRESHOLD_FRACTION: f32 = 0.4;

/// Minimum pixel count (rows * cols) to split work across row bands.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 4_096;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;
