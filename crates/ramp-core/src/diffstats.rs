//! First differences and the robust median-of-differences policy (spec §4.1).
//!
//! Grounded on `twopoint_difference.py::calc_med_first_diffs`. The design
//! notes (spec §9) prefer an explicit per-pixel loop over the source's
//! vectorized "mask the argmax along axis 0" trick, so these operate on a
//! single pixel's diff slice at a time; callers loop over pixels.

/// `diffs[i] = ramp[i+1] - ramp[i]`. A diff touching a non-finite endpoint
/// is itself `NaN`.
pub fn first_diffs(ramp: &[f32]) -> Vec<f32> {
    ramp.windows(2)
        .map(|pair| {
            let (a, b) = (pair[0], pair[1]);
            if a.is_finite() && b.is_finite() {
                b - a
            } else {
                f32::NAN
            }
        })
        .collect()
}

/// Index of the finite entry with the largest `|value|`, ties broken by
/// the lowest index.
fn argmax_abs(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        let a = v.abs();
        match best {
            Some((_, best_a)) if a <= best_a => {}
            _ => best = Some((i, a)),
        }
    }
    best.map(|(i, _)| i)
}

fn median_of(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// The small-sample median-of-differences policy (spec §4.1).
///
/// k = count of finite entries:
/// - k >= 4: clip the single entry with the largest |value|, return the
///   median of the rest.
/// - k == 3: return the median of all three (no clipping).
/// - k == 2: return the smaller-magnitude finite entry (matches the
///   original source's `nanmin(abs(diffs))`: always non-negative).
/// - k <= 1: `NaN`.
pub fn median_diff(diffs: &[f32]) -> f32 {
    let finite_count = diffs.iter().filter(|v| v.is_finite()).count();

    match finite_count {
        0 | 1 => f32::NAN,
        2 => diffs
            .iter()
            .filter(|v| v.is_finite())
            .map(|v| v.abs())
            .fold(f32::INFINITY, f32::min),
        3 => {
            let mut finite: Vec<f32> = diffs.iter().copied().filter(|v| v.is_finite()).collect();
            median_of(&mut finite)
        }
        _ => {
            let clip = argmax_abs(diffs);
            let mut finite: Vec<f32> = diffs
                .iter()
                .enumerate()
                .filter(|(i, v)| v.is_finite() && Some(*i) != clip)
                .map(|(_, v)| *v)
                .collect();
            median_of(&mut finite)
        }
    }
}

/// Count of finite entries — the `k` used to select a rejection threshold.
pub fn count_usable(diffs: &[f32]) -> usize {
    diffs.iter().filter(|v| v.is_finite()).count()
}
