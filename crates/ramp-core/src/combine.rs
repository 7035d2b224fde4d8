//! Inverse-variance combination: segments -> integration, integrations ->
//! exposure (spec §4.5, §4.6).
//!
//! Grounded on `ramp_fit.py`'s `ols_ramp_fit_single`/`compute_integration`
//! combination path: poisson and read variance are combined independently
//! by inverse-variance, then summed; the slope itself is combined using the
//! inverse of their sum as its weight.

use ndarray::Array2;

use crate::consts::LARGE_VARIANCE;
use crate::flags::DqFlags;
use crate::types::{IntegrationResult, SegmentFit};

fn inv_var(v: f32) -> f32 {
    if v.is_finite() && v > 0.0 {
        1.0 / v
    } else {
        0.0
    }
}

/// Combine one pixel's per-segment fits into a single integration-level
/// result. `initial_group_saturated` marks a ramp whose very first group
/// was already saturated, which has no usable segments by construction.
pub fn combine_segments(
    fits: &[SegmentFit],
    initial_group_saturated: bool,
    flags: &DqFlags,
) -> (f32, f32, f32, f32, u32) {
    if initial_group_saturated {
        return (
            0.0,
            LARGE_VARIANCE,
            LARGE_VARIANCE,
            LARGE_VARIANCE,
            flags.saturated | flags.do_not_use,
        );
    }

    if fits.is_empty() {
        return (
            0.0,
            LARGE_VARIANCE,
            LARGE_VARIANCE,
            LARGE_VARIANCE,
            flags.do_not_use | flags.unreliable_slope,
        );
    }

    let inv_poisson_sum: f32 = fits.iter().map(|f| inv_var(f.var_poisson)).sum();
    let inv_read_sum: f32 = fits.iter().map(|f| inv_var(f.var_read)).sum();

    let var_poisson = if inv_poisson_sum > 0.0 {
        1.0 / inv_poisson_sum
    } else {
        LARGE_VARIANCE
    };
    let var_read = if inv_read_sum > 0.0 {
        1.0 / inv_read_sum
    } else {
        LARGE_VARIANCE
    };
    let var_total = var_poisson + var_read;

    let weight_sum: f32 = fits.iter().map(|f| inv_var(f.var_poisson + f.var_read)).sum();

    if weight_sum <= 0.0 {
        return (0.0, LARGE_VARIANCE, LARGE_VARIANCE, LARGE_VARIANCE, flags.unreliable_slope);
    }

    let slope = fits
        .iter()
        .map(|f| f.slope * inv_var(f.var_poisson + f.var_read))
        .sum::<f32>()
        / weight_sum;

    // A kept one-group segment contributes an unreliable slope estimate
    // even when other segments in the ramp are well-determined (spec §4.4).
    let dq = if fits.iter().any(|f| f.length == 1) {
        flags.unreliable_slope
    } else {
        0
    };

    (slope, var_poisson, var_read, var_total, dq)
}

/// Combine a set of per-integration results into the final exposure-level
/// result, pixel by pixel. `DO_NOT_USE` on a pixel survives only if it is
/// set in *every* integration (spec §4.6); all other DQ bits OR together.
pub fn combine_integrations(integrations: &[IntegrationResult], flags: &DqFlags) -> crate::types::ExposureResult {
    assert!(!integrations.is_empty());
    let shape = integrations[0].slope.dim();

    let mut slope = Array2::<f32>::zeros(shape);
    let mut var_poisson = Array2::<f32>::zeros(shape);
    let mut var_read = Array2::<f32>::zeros(shape);
    let mut err = Array2::<f32>::zeros(shape);
    let mut dq = Array2::<u32>::zeros(shape);

    for row in 0..shape.0 {
        for col in 0..shape.1 {
            let inv_poisson_sum: f32 = integrations
                .iter()
                .map(|r| inv_var(r.var_poisson[[row, col]]))
                .sum();
            let inv_read_sum: f32 = integrations
                .iter()
                .map(|r| inv_var(r.var_read[[row, col]]))
                .sum();
            let weight_sum: f32 = integrations
                .iter()
                .map(|r| inv_var(r.var_total[[row, col]]))
                .sum();

            let vp = if inv_poisson_sum > 0.0 {
                1.0 / inv_poisson_sum
            } else {
                LARGE_VARIANCE
            };
            let vr = if inv_read_sum > 0.0 {
                1.0 / inv_read_sum
            } else {
                LARGE_VARIANCE
            };

            let s = if weight_sum > 0.0 {
                integrations
                    .iter()
                    .map(|r| r.slope[[row, col]] * inv_var(r.var_total[[row, col]]))
                    .sum::<f32>()
                    / weight_sum
            } else {
                0.0
            };

            var_poisson[[row, col]] = vp;
            var_read[[row, col]] = vr;
            let vt = vp + vr;
            err[[row, col]] = vt.sqrt();
            slope[[row, col]] = s;

            let dnu_in_all = integrations
                .iter()
                .all(|r| DqFlags::is_set(r.dq[[row, col]], flags.do_not_use));
            let other_bits_or: u32 = integrations
                .iter()
                .fold(0u32, |acc, r| acc | (r.dq[[row, col]] & !flags.do_not_use));
            dq[[row, col]] = other_bits_or | if dnu_in_all { flags.do_not_use } else { 0 };
        }
    }

    crate::types::ExposureResult {
        slope,
        err,
        var_poisson,
        var_read,
        dq,
    }
}
