//! Iterative two-point-difference jump (cosmic-ray) detection (spec §4.2).
//!
//! Grounded on `twopoint_difference.py::find_crs`. Operates on whatever
//! row-band slice of the cube it is given — row-level parallelism across
//! bands is the caller's concern (see `pipeline::RowSplitter`), not this
//! module's; within a band, pixels are processed by a plain sequential
//! loop (spec §9 prefers an explicit loop over a vectorized broadcast).

use ndarray::{Array3, ArrayView2, ArrayView4, ArrayViewMut4};
use serde::{Deserialize, Serialize};

use crate::diffstats::{count_usable, first_diffs, median_diff};
use crate::flags::DqFlags;

/// Sigma-rejection thresholds for the three small-sample regimes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JumpThresholds {
    /// Threshold when >= 4 usable diffs remain.
    pub rej4: f32,
    /// Threshold when exactly 3 usable diffs remain.
    pub rej3: f32,
    /// Threshold when exactly 2 usable diffs remain.
    pub rej2: f32,
}

impl Default for JumpThresholds {
    fn default() -> Self {
        Self {
            rej4: 5.5,
            rej3: 5.5,
            rej2: 5.0,
        }
    }
}

impl JumpThresholds {
    fn for_usable_count(&self, k: usize) -> f32 {
        match k {
            0 | 1 => f32::NAN,
            2 => self.rej2,
            3 => self.rej3,
            _ => self.rej4,
        }
    }
}

/// Four-neighbor flagging policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeighborPolicy {
    pub enabled: bool,
    /// Strict lower bound on the *initial* ratio for neighbor flagging.
    pub min_ratio: f32,
    /// Strict upper bound on the *initial* ratio for neighbor flagging.
    pub max_ratio: f32,
}

impl Default for NeighborPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_ratio: 4.0,
            max_ratio: 1000.0,
        }
    }
}

fn sigma_from_median(median: f32, read_noise_sq: f32, nframes: u32) -> f32 {
    let sigma = (median.abs() + read_noise_sq / nframes as f32).sqrt();
    if sigma == 0.0 {
        f32::NAN
    } else {
        sigma
    }
}

fn nanargmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, bv)) if v <= bv => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Result of running the per-pixel detector: which diffs were flagged, plus
/// the ratio array computed *before* any iterative refinement (used for
/// the neighbor-flagging test per spec §9's documented asymmetry).
struct PixelDetection {
    flagged: Vec<usize>,
    initial_ratio: Vec<f32>,
}

/// Run the per-pixel iterative two-point-difference test on one ramp.
fn detect_pixel(ramp: &[f32], read_noise_sq: f32, nframes: u32, thresholds: &JumpThresholds) -> Option<PixelDetection> {
    let diffs = first_diffs(ramp);
    let ndiffs = diffs.len();
    let median = median_diff(&diffs);
    let sigma = sigma_from_median(median, read_noise_sq, nframes);

    let initial_ratio: Vec<f32> = diffs.iter().map(|d| (d - median).abs() / sigma).collect();
    let k = count_usable(&diffs);
    let max_ratio = initial_ratio.iter().cloned().fold(f32::NAN, |acc, v| {
        if v.is_finite() && (acc.is_nan() || v > acc) {
            v
        } else {
            acc
        }
    });

    if !(max_ratio > thresholds.for_usable_count(k)) {
        return None;
    }

    let mut mask = vec![true; ndiffs]; // true = kept, false = flagged as CR
    let first_idx = nanargmax(&initial_ratio)?;
    mask[first_idx] = false;

    let mut working = diffs.clone();
    let mut new_cr_found = true;

    loop {
        let usable_before = count_usable(&working);
        if !new_cr_found || usable_before <= 2 {
            break;
        }
        new_cr_found = false;

        for (i, keep) in mask.iter().enumerate() {
            if !keep {
                working[i] = f32::NAN;
            }
        }

        let new_median = median_diff(&working);
        let new_sigma = sigma_from_median(new_median, read_noise_sq, nframes);
        let new_ratio: Vec<f32> = working
            .iter()
            .map(|d| (d - new_median).abs() / new_sigma)
            .collect();
        let usable_after = count_usable(&working);
        let rej_thresh = thresholds.for_usable_count(usable_after);

        if let Some(idx) = nanargmax(&new_ratio) {
            if new_ratio[idx] > rej_thresh {
                new_cr_found = true;
                mask[idx] = false;
            }
        }
    }

    let flagged: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter(|(_, keep)| !**keep)
        .map(|(i, _)| i)
        .collect();

    Some(PixelDetection {
        flagged,
        initial_ratio,
    })
}

/// Run jump detection on `cube`/`group_dq` (same shape), mutating `group_dq`
/// in place. Returns `(row_above, row_below)` spill-over arrays, each shaped
/// `[n_ints, n_groups, n_cols]`, carrying `JUMP_DET` bits that belong to a
/// row outside this slice (spec §5's row-band join).
pub fn detect(
    cube: ArrayView4<f32>,
    mut group_dq: ArrayViewMut4<u32>,
    read_noise: ArrayView2<f32>,
    nframes: u32,
    thresholds: &JumpThresholds,
    neighbor_policy: &NeighborPolicy,
    flags: &DqFlags,
) -> (Array3<u32>, Array3<u32>) {
    let (n_ints, n_groups, n_rows, n_cols) = cube.dim();
    let mut row_above = Array3::<u32>::zeros((n_ints, n_groups, n_cols));
    let mut row_below = Array3::<u32>::zeros((n_ints, n_groups, n_cols));

    let mut ramp_buf = vec![0.0f32; n_groups];

    for integ in 0..n_ints {
        for row in 0..n_rows {
            for col in 0..n_cols {
                for g in 0..n_groups {
                    let dq = group_dq[[integ, g, row, col]];
                    ramp_buf[g] = if flags.is_unusable(dq) {
                        f32::NAN
                    } else {
                        cube[[integ, g, row, col]]
                    };
                }

                let rn = read_noise[[row, col]];
                let rn2 = rn * rn;

                let Some(detection) = detect_pixel(&ramp_buf, rn2, nframes, thresholds) else {
                    continue;
                };

                for &diff_idx in &detection.flagged {
                    let g = diff_idx + 1;
                    group_dq[[integ, g, row, col]] =
                        DqFlags::set(group_dq[[integ, g, row, col]], flags.jump_det);
                }

                if neighbor_policy.enabled {
                    for &diff_idx in &detection.flagged {
                        let ratio = detection.initial_ratio[diff_idx];
                        if !(ratio > neighbor_policy.min_ratio && ratio < neighbor_policy.max_ratio) {
                            continue;
                        }
                        let g = diff_idx + 1;

                        if row > 0 {
                            group_dq[[integ, g, row - 1, col]] =
                                DqFlags::set(group_dq[[integ, g, row - 1, col]], flags.jump_det);
                        } else {
                            row_below[[integ, g, col]] = flags.jump_det;
                        }

                        if row < n_rows - 1 {
                            group_dq[[integ, g, row + 1, col]] =
                                DqFlags::set(group_dq[[integ, g, row + 1, col]], flags.jump_det);
                        } else {
                            row_above[[integ, g, col]] = flags.jump_det;
                        }

                        if col > 0 {
                            group_dq[[integ, g, row, col - 1]] =
                                DqFlags::set(group_dq[[integ, g, row, col - 1]], flags.jump_det);
                        }
                        if col < n_cols - 1 {
                            group_dq[[integ, g, row, col + 1]] =
                                DqFlags::set(group_dq[[integ, g, row, col + 1]], flags.jump_det);
                        }
                    }
                }
            }
        }
    }

    (row_above, row_below)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GroupDq, ReadNoise2D};
    use ndarray::Array4;

    fn make_cube(ramp: &[f32]) -> (Array4<f32>, GroupDq) {
        let n = ramp.len();
        let mut cube = Array4::<f32>::zeros((1, n, 1, 1));
        for (g, &v) in ramp.iter().enumerate() {
            cube[[0, g, 0, 0]] = v;
        }
        let dq = GroupDq::zeros((1, n, 1, 1));
        (cube, dq)
    }

    #[test]
    fn clean_ramp_no_jump() {
        let (cube, mut dq) = make_cube(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let rn = ReadNoise2D::from_elem((1, 1), 1.0);
        let flags = DqFlags::default();
        detect(
            cube.view(),
            dq.view_mut(),
            rn.view(),
            1,
            &JumpThresholds::default(),
            &NeighborPolicy {
                enabled: false,
                ..Default::default()
            },
            &flags,
        );
        for g in 0..5 {
            assert_eq!(dq[[0, g, 0, 0]] & flags.jump_det, 0);
        }
    }

    #[test]
    fn single_jump_detected_on_later_group() {
        let (cube, mut dq) = make_cube(&[10.0, 20.0, 30.0, 130.0, 140.0]);
        let rn = ReadNoise2D::from_elem((1, 1), 1.0);
        let flags = DqFlags::default();
        let thresholds = JumpThresholds {
            rej4: 4.0,
            rej3: 4.0,
            rej2: 4.0,
        };
        detect(
            cube.view(),
            dq.view_mut(),
            rn.view(),
            1,
            &thresholds,
            &NeighborPolicy {
                enabled: false,
                ..Default::default()
            },
            &flags,
        );
        assert_ne!(dq[[0, 3, 0, 0]] & flags.jump_det, 0);
        for g in [0, 1, 2, 4] {
            assert_eq!(dq[[0, g, 0, 0]] & flags.jump_det, 0, "group {g} should be clean");
        }
    }

    #[test]
    fn idempotent_second_pass_adds_nothing() {
        let (cube, mut dq) = make_cube(&[10.0, 20.0, 30.0, 130.0, 140.0]);
        let rn = ReadNoise2D::from_elem((1, 1), 1.0);
        let flags = DqFlags::default();
        let thresholds = JumpThresholds {
            rej4: 4.0,
            rej3: 4.0,
            rej2: 4.0,
        };
        let policy = NeighborPolicy {
            enabled: false,
            ..Default::default()
        };
        detect(cube.view(), dq.view_mut(), rn.view(), 1, &thresholds, &policy, &flags);
        let after_first: Vec<u32> = (0..5).map(|g| dq[[0, g, 0, 0]]).collect();

        // second pass: now group 3 is flagged JUMP_DET, which is not in the
        // disqualifying {SATURATED, DO_NOT_USE} set, so data is unchanged.
        detect(cube.view(), dq.view_mut(), rn.view(), 1, &thresholds, &policy, &flags);
        let after_second: Vec<u32> = (0..5).map(|g| dq[[0, g, 0, 0]]).collect();
        assert_eq!(after_first, after_second);
    }
}
