//! Fixsen optimally-weighted linear fit of a single ramp segment (spec §4.4).
//!
//! Grounded on the classic Fixsen (2000) rank-weighted regression as
//! implemented in `ramp_fit.py`'s segment-slope path: each group in the
//! segment gets a weight that rises toward the middle of the segment, with
//! the steepness of that rise (`P`) chosen from the segment's own SNR. The
//! variance formulas themselves are the literal `utils.py` ones
//! (`calc_power`'s poisson/read-noise split), not a weighted generalization.

use crate::consts::{EPSILON, LARGE_VARIANCE};
use crate::diffstats::{first_diffs, median_diff};
use crate::segment::Segment;
use crate::types::SegmentFit;

/// SNR-to-power lookup used by the Fixsen weighting scheme.
///
/// `snr = |median first difference| * sqrt(segment length) / read_noise`.
pub fn weight_power_for_snr(snr: f32) -> f32 {
    if !snr.is_finite() || snr < 5.0 {
        0.0
    } else if snr < 10.0 {
        0.4
    } else if snr < 20.0 {
        1.0
    } else if snr < 50.0 {
        3.0
    } else if snr < 100.0 {
        6.0
    } else {
        10.0
    }
}

/// The literal read-noise variance term, `12*(readNoise/groupTime)^2 /
/// (n^3 - n)` (spec §4.4, `utils.py:571-581`). A one-group segment is
/// treated as `n = 2` (the formula's floor), which this folds into a single
/// expression: `n.max(2)` cubed minus itself is exactly `6` at `n = 2`.
fn var_read_for_n(n: usize, read_noise: f32, group_time: f32) -> f32 {
    let m = (n as f32).max(2.0);
    let dt = group_time.max(EPSILON);
    12.0 * (read_noise / dt).powi(2) / (m.powi(3) - m)
}

/// Fit one segment of one pixel's ramp.
///
/// `ramp` and `group_time` describe the whole ramp; `segment` selects the
/// sub-range to fit. `read_noise` is that pixel's per-group read noise in
/// electrons (already rescaled per spec §3). `gain` is the raw per-pixel
/// gain in electrons/DN, used directly in the Poisson-variance denominator
/// (spec §4.4), not the gain-rescaled read noise computed upstream.
pub fn fit_segment(ramp: &[f32], group_time: f32, segment: Segment, read_noise: f32, gain: f32) -> SegmentFit {
    let n = segment.len();
    if n == 0 {
        return SegmentFit::degenerate(0);
    }
    if n == 1 {
        // Spec §4.4: a one-group segment's slope is unreliable by
        // construction (no baseline to differ against), so var_poisson is
        // the sentinel, but var_read still gets the literal formula.
        return SegmentFit {
            slope: 0.0,
            intercept: ramp[segment.start],
            var_poisson: LARGE_VARIANCE,
            var_read: var_read_for_n(1, read_noise, group_time),
            sig_slope: LARGE_VARIANCE.sqrt(),
            sig_intercept: LARGE_VARIANCE.sqrt(),
            weight_sum: 0.0,
            length: 1,
        };
    }

    let values = &ramp[segment.start..segment.end];

    let diffs = first_diffs(values);
    let med_diff = median_diff(&diffs);
    let snr = if read_noise > EPSILON {
        med_diff.abs() * (n as f32).sqrt() / read_noise
    } else {
        f32::INFINITY
    };
    let p = weight_power_for_snr(snr);

    let weights: Vec<f32> = (1..=n)
        .map(|k| {
            let rank_weight = (k * (n + 1 - k)) as f32;
            rank_weight.powf(p)
        })
        .collect();

    let xs: Vec<f32> = (0..n).map(|i| i as f32 * group_time).collect();

    let w_sum: f32 = weights.iter().sum();
    let x_bar: f32 = xs.iter().zip(&weights).map(|(x, w)| x * w).sum::<f32>() / w_sum;
    let y_bar: f32 = values.iter().zip(&weights).map(|(y, w)| y * w).sum::<f32>() / w_sum;

    let sxx: f32 = xs
        .iter()
        .zip(&weights)
        .map(|(x, w)| w * (x - x_bar) * (x - x_bar))
        .sum();
    let sxy: f32 = xs
        .iter()
        .zip(values.iter())
        .zip(&weights)
        .map(|((x, y), w)| w * (x - x_bar) * (y - y_bar))
        .sum();

    if sxx <= EPSILON {
        return SegmentFit::degenerate(n);
    }

    let slope = sxy / sxx;
    let intercept = y_bar - slope * x_bar;

    let dt = group_time.max(EPSILON);
    let var_poisson_den = 1.0 / (dt * gain.max(EPSILON) * (n as f32 - 1.0).max(1.0));
    let var_poisson = slope.max(0.0) * var_poisson_den;
    let var_read = var_read_for_n(n, read_noise, group_time);

    // Standard weighted-least-squares parameter covariance: Var(slope) =
    // 1/Sxx, Var(intercept) = 1/Sw + xbar^2/Sxx.
    let sig_slope = (1.0 / sxx).sqrt();
    let sig_intercept = (1.0 / w_sum + x_bar * x_bar / sxx).sqrt();

    SegmentFit {
        slope,
        intercept,
        var_poisson,
        var_read,
        sig_slope,
        sig_intercept,
        weight_sum: w_sum,
        length: n,
    }
}
