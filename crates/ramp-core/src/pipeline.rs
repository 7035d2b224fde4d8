//! Row-band concurrency and the top-level `ramp_fit` entry point (spec §5).
//!
//! Grounded on the teacher's `stack/sigma_clip.rs` row-parallel pattern:
//! split the image into disjoint row bands, hand one band to each rayon
//! task, and fall back to a single sequential pass below
//! [`crate::consts::PARALLEL_PIXEL_THRESHOLD`] pixels where spawning tasks
//! would cost more than it saves. `row_above`/`row_below` spill is always
//! folded back into the full array sequentially, after every task has
//! joined — never from inside a worker, which would race with its
//! neighbor.

use ndarray::{s, Array2, Array3, Axis, Zip};
use tracing::debug;

use crate::combine::{combine_integrations, combine_segments};
use crate::config::RampFitOptions;
use crate::error::{RampFitError, Result};
use crate::fit::fit_segment;
use crate::flags::DqFlags;
use crate::jump::{self, JumpThresholds, NeighborPolicy};
use crate::optional::{OptionalAccumulator, OptionalResults};
use crate::saturation::{compress_group_dq, compress_integrations, initial_group_saturated};
use crate::segment::{build_segments, remove_bad_singles};
use crate::types::{ExposureResult, Gain2D, GroupDq, IntegrationResult, RampCube, RampMeta, ReadNoise2D};

/// Resolve the row-band count to actually use for this cube.
fn band_count(n_rows: usize, n_cols: usize, cores: usize) -> usize {
    let total_pixels = n_rows * n_cols;
    if cores <= 1 || total_pixels < crate::consts::PARALLEL_PIXEL_THRESHOLD {
        1
    } else {
        cores.min(n_rows)
    }
}

/// Run the iterative jump detector across the whole cube, splitting the
/// work into row bands and joining the boundary spill sequentially.
fn run_jump_detection(
    cube: &RampCube,
    group_dq: &mut GroupDq,
    read_noise: &ReadNoise2D,
    thresholds: &JumpThresholds,
    neighbor_policy: &NeighborPolicy,
    flags: &DqFlags,
    bands: usize,
) {
    let (_n_ints, n_groups, n_rows, n_cols) = cube.dim();
    if bands <= 1 {
        let (row_above, row_below) =
            jump::detect(cube.view(), group_dq.view_mut(), read_noise.view(), 1, thresholds, neighbor_policy, flags);
        debug_assert!(row_above.iter().all(|&v| v == 0));
        debug_assert!(row_below.iter().all(|&v| v == 0));
        return;
    }

    let band_size = n_rows.div_ceil(bands);
    let n_ints = cube.dim().0;

    let spills: Vec<(Array3<u32>, Array3<u32>)> = {
        let cube_chunks: Vec<_> = cube.axis_chunks_iter(Axis(2), band_size).collect();
        let rn_chunks: Vec<_> = read_noise.axis_chunks_iter(Axis(0), band_size).collect();
        let mut dq_chunks: Vec<_> = group_dq.axis_chunks_iter_mut(Axis(2), band_size).collect();

        let mut results: Vec<Option<(Array3<u32>, Array3<u32>)>> = (0..dq_chunks.len()).map(|_| None).collect();

        rayon::scope(|scope| {
            for ((cube_chunk, rn_chunk), (dq_chunk, slot)) in cube_chunks
                .iter()
                .zip(rn_chunks.iter())
                .zip(dq_chunks.iter_mut().zip(results.iter_mut()))
            {
                scope.spawn(move |_| {
                    let spill = jump::detect(
                        cube_chunk.view(),
                        dq_chunk.reborrow(),
                        *rn_chunk,
                        1,
                        thresholds,
                        neighbor_policy,
                        flags,
                    );
                    *slot = Some(spill);
                });
            }
        });

        results.into_iter().map(|r| r.expect("every band ran")).collect()
    };

    // Join row_above/row_below spill sequentially: band i's row_above
    // (flagging the row *below* its own last row) belongs to band i+1's
    // first row; band i's row_below belongs to band i-1's last row.
    for (band_idx, (row_above, row_below)) in spills.iter().enumerate() {
        let band_start = band_idx * band_size;
        if band_start >= n_rows {
            continue;
        }

        if band_idx + 1 < spills.len() {
            let next_band_first_row = (band_idx + 1) * band_size;
            if next_band_first_row < n_rows {
                for integ in 0..n_ints {
                    for g in 0..n_groups {
                        for col in 0..n_cols {
                            let bit = row_above[[integ, g, col]];
                            if bit != 0 {
                                group_dq[[integ, g, next_band_first_row, col]] =
                                    DqFlags::set(group_dq[[integ, g, next_band_first_row, col]], bit);
                            }
                        }
                    }
                }
            }
        }

        if band_idx > 0 {
            let prev_band_last_row = band_start - 1;
            for integ in 0..n_ints {
                for g in 0..n_groups {
                    for col in 0..n_cols {
                        let bit = row_below[[integ, g, col]];
                        if bit != 0 {
                            group_dq[[integ, g, prev_band_last_row, col]] =
                                DqFlags::set(group_dq[[integ, g, prev_band_last_row, col]], bit);
                        }
                    }
                }
            }
        }
    }
}

fn validate_shapes(cube: &RampCube, group_dq: &GroupDq, read_noise: &ReadNoise2D, gain: &Gain2D) -> Result<()> {
    if cube.dim() != group_dq.dim() {
        return Err(RampFitError::InvalidInput(format!(
            "cube shape {:?} does not match group_dq shape {:?}",
            cube.dim(),
            group_dq.dim()
        )));
    }
    let (n_ints, n_groups, n_rows, n_cols) = cube.dim();
    if n_ints == 0 || n_groups == 0 {
        return Err(RampFitError::EmptyExposure(
            "cube has zero integrations or zero groups".to_string(),
        ));
    }
    if read_noise.dim() != (n_rows, n_cols) {
        return Err(RampFitError::InvalidInput(format!(
            "read_noise shape {:?} does not match cube's {:?}",
            read_noise.dim(),
            (n_rows, n_cols)
        )));
    }
    if gain.dim() != (n_rows, n_cols) {
        return Err(RampFitError::InvalidInput(format!(
            "gain shape {:?} does not match cube's {:?}",
            gain.dim(),
            (n_rows, n_cols)
        )));
    }
    Ok(())
}

/// Fit one pixel's segments for one integration, recording diagnostics if
/// `optional` is present. Returns `(slope, var_poisson, var_read, var_total, dq)`.
#[allow(clippy::too_many_arguments)]
fn fit_pixel(
    ramp: &[f32],
    group_dq_column: &[u32],
    group_time: f32,
    read_noise: f32,
    gain: f32,
    flags: &DqFlags,
    row: usize,
    col: usize,
    optional: &mut Option<&mut OptionalAccumulator>,
) -> (f32, f32, f32, f32, u32) {
    // Spec §3: a non-positive or NaN gain pixel is silently re-flagged and
    // excluded from fitting entirely, not treated as an error.
    if !(gain > 0.0) {
        return (
            0.0,
            crate::consts::LARGE_VARIANCE,
            crate::consts::LARGE_VARIANCE,
            crate::consts::LARGE_VARIANCE,
            flags.no_gain_value | flags.do_not_use,
        );
    }

    let sat_at_start = initial_group_saturated(ndarray::ArrayView1::from(group_dq_column), flags);

    let segments = remove_bad_singles(build_segments(group_dq_column, flags));
    let fits: Vec<_> = segments
        .iter()
        .map(|&seg| {
            let fit = fit_segment(ramp, group_time, seg, read_noise, gain);
            if let Some(acc) = optional.as_deref_mut() {
                acc.record_segment(row, col, fit);
            }
            fit
        })
        .collect();

    for diff_idx in 0..group_dq_column.len().saturating_sub(1) {
        if DqFlags::is_set(group_dq_column[diff_idx + 1], flags.jump_det) {
            if let Some(acc) = optional.as_deref_mut() {
                let mag = ramp[diff_idx + 1] - ramp[diff_idx];
                if mag.is_finite() {
                    acc.record_cr_magnitude(row, col, mag);
                }
            }
        }
    }

    combine_segments(&fits, sat_at_start, flags)
}

/// Fit a single integration's cube, returning its per-pixel result and (if
/// requested) the segment-level diagnostics accumulated into `optional`.
#[allow(clippy::too_many_arguments)]
fn fit_integration(
    cube: &RampCube,
    group_dq: &GroupDq,
    read_noise: &ReadNoise2D,
    gain: &Gain2D,
    meta: &RampMeta,
    flags: &DqFlags,
    integ: usize,
    mut optional: Option<&mut OptionalAccumulator>,
) -> IntegrationResult {
    let (_, n_groups, n_rows, n_cols) = cube.dim();
    let mut slope = Array2::<f32>::zeros((n_rows, n_cols));
    let mut var_poisson = Array2::<f32>::zeros((n_rows, n_cols));
    let mut var_read = Array2::<f32>::zeros((n_rows, n_cols));
    let mut var_total = Array2::<f32>::zeros((n_rows, n_cols));
    let mut dq = Array2::<u32>::zeros((n_rows, n_cols));

    let mut ramp_buf = vec![0.0f32; n_groups];
    let mut dq_buf = vec![0u32; n_groups];

    for row in 0..n_rows {
        for col in 0..n_cols {
            for g in 0..n_groups {
                ramp_buf[g] = cube[[integ, g, row, col]];
                dq_buf[g] = group_dq[[integ, g, row, col]];
            }
            let rn = read_noise[[row, col]];
            let g = gain[[row, col]];
            let (s, vp, vr, vt, d) = fit_pixel(
                &ramp_buf,
                &dq_buf,
                meta.effective_group_time(),
                rn,
                g,
                flags,
                row,
                col,
                &mut optional,
            );
            slope[[row, col]] = s;
            var_poisson[[row, col]] = vp;
            var_read[[row, col]] = vr;
            var_total[[row, col]] = vt;
            dq[[row, col]] = d;
        }
    }

    if let Some(acc) = optional {
        acc.finish_integration();
    }

    IntegrationResult {
        slope,
        var_poisson,
        var_read,
        var_total,
        dq,
    }
}

/// Result of a full `ramp_fit` run.
pub struct RampFitOutput {
    pub integrations: Vec<IntegrationResult>,
    pub exposure: ExposureResult,
    pub pixel_dq: Array2<u32>,
    pub optional: Option<OptionalResults>,
}

/// Run the full ramp-fit pipeline: jump detection, segment fitting,
/// integration combination, and exposure combination (spec §5 end to end).
///
/// `cube` itself already has gain pre-applied by the caller (spec §3);
/// `read_noise` has not, and `gain` is required here to rescale it. The
/// two-point-difference variance model needs the noise on a *difference* of
/// two group averages, in the same electron units as `cube`: that is
/// `readnoise * gain / sqrt(2 * nframes)` (spec §4.2, `ramp_fit.py:215`).
/// That rescaling happens once here rather than inside the jump detector or
/// the segment fitter; the segment fitter also needs the raw, unscaled
/// `gain` directly for its Poisson-variance denominator (spec §4.4), so the
/// original array is threaded through separately from `rn_eff`.
pub fn ramp_fit(
    cube: &RampCube,
    group_dq: &mut GroupDq,
    read_noise: &ReadNoise2D,
    gain: &Gain2D,
    meta: &RampMeta,
    options: &RampFitOptions,
) -> Result<RampFitOutput> {
    validate_shapes(cube, group_dq, read_noise, gain)?;
    let flags = options.dq_flags;
    let (n_ints, _n_groups, n_rows, n_cols) = cube.dim();

    let nframes_sqrt = (2.0 * meta.nframes as f32).sqrt();
    let mut rn_eff: Array2<f32> = Array2::zeros(read_noise.dim());
    Zip::from(&mut rn_eff)
        .and(read_noise)
        .and(gain)
        .for_each(|rn_eff, &rn, &g| *rn_eff = rn * g / nframes_sqrt);

    if options.detect_jumps {
        let available = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let cores = options.max_cores.resolve(available);
        let bands = band_count(n_rows, n_cols, cores);
        debug!(bands, cores, "running jump detection");
        run_jump_detection(
            cube,
            group_dq,
            &rn_eff,
            &options.thresholds,
            &options.neighbor_policy,
            &flags,
            bands,
        );
    }

    let mut accumulator = options
        .save_optional
        .then(|| OptionalAccumulator::new(n_ints, n_rows, n_cols, meta.effective_integration_time()));

    let mut integrations = Vec::with_capacity(n_ints);
    let mut per_integration_pixel_dq = Vec::with_capacity(n_ints);
    for integ in 0..n_ints {
        let result = fit_integration(
            cube,
            group_dq,
            &rn_eff,
            gain,
            meta,
            &flags,
            integ,
            accumulator.as_mut(),
        );
        per_integration_pixel_dq.push(compress_group_dq(group_dq.slice(s![integ, .., .., ..])));
        integrations.push(result);
    }

    let exposure = combine_integrations(&integrations, &flags);
    let pixel_dq = compress_integrations(&per_integration_pixel_dq);

    Ok(RampFitOutput {
        integrations,
        exposure,
        pixel_dq,
        optional: accumulator.map(|a| a.finish()),
    })
}
