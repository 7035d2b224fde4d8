//! Saturation bookkeeping and group-DQ compression (spec §4.6).
//!
//! Grounded on `utils.py::fix_sat_ramps` (the "ramp has no usable data"
//! special case) and `utils.py::dq_compress_sect`/`dq_compress_final` (OR
//! reducing the 4D group DQ cube down to a 2D per-pixel DQ array).

use ndarray::{Array2, ArrayView1, ArrayView3};

use crate::flags::DqFlags;

/// True if the very first group of this pixel's ramp is already saturated
/// — such a ramp has no usable segments by construction.
pub fn initial_group_saturated(group_dq_column: ArrayView1<u32>, flags: &DqFlags) -> bool {
    group_dq_column
        .first()
        .is_some_and(|&dq| DqFlags::is_set(dq, flags.saturated))
}

/// OR-reduce one integration's group DQ cube, shape `[n_groups, n_rows,
/// n_cols]`, down to a single per-pixel DQ plane.
pub fn compress_group_dq(group_dq: ArrayView3<u32>) -> Array2<u32> {
    let (n_groups, n_rows, n_cols) = group_dq.dim();
    let mut out = Array2::<u32>::zeros((n_rows, n_cols));
    for g in 0..n_groups {
        for row in 0..n_rows {
            for col in 0..n_cols {
                out[[row, col]] |= group_dq[[g, row, col]];
            }
        }
    }
    out
}

/// OR-reduce per-integration pixel DQ planes into one exposure-level plane.
pub fn compress_integrations(per_integration: &[Array2<u32>]) -> Array2<u32> {
    assert!(!per_integration.is_empty());
    let mut out = per_integration[0].clone();
    for plane in &per_integration[1..] {
        out.zip_mut_with(plane, |a, &b| *a |= b);
    }
    out
}
