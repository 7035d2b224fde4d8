//! Splitting a per-pixel group-DQ column into usable segments (spec §4.3).
//!
//! Grounded on `ramp_fit.py`'s segment bookkeeping and on `utils.py`'s
//! `remove_bad_singles`, but spec §9 sanctions replacing the source's
//! pairwise quadratic comparison with a single linear pass — that's what
//! this module does.

use crate::flags::DqFlags;

/// A maximal run of consecutive usable groups. Half-open `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Build the maximal-run segment list for one pixel's group-DQ column.
///
/// A run breaks at any group flagged `SATURATED` or `DO_NOT_USE` (that
/// group is excluded entirely), and also breaks *before* any group whose
/// own `JUMP_DET` bit is set and which is not the first group of the ramp
/// (the jump attributes to the later of the two groups in its diff pair,
/// per [`crate::jump`], so the jump group itself stays in the new segment).
pub fn build_segments(group_dq: &[u32], flags: &DqFlags) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut start: Option<usize> = None;

    for (g, &dq) in group_dq.iter().enumerate() {
        if flags.is_unusable(dq) {
            if let Some(s) = start.take() {
                segments.push(Segment { start: s, end: g });
            }
            continue;
        }

        let starts_new_segment = g > 0 && DqFlags::is_set(dq, flags.jump_det);
        if starts_new_segment {
            if let Some(s) = start.take() {
                segments.push(Segment { start: s, end: g });
            }
        }

        if start.is_none() {
            start = Some(g);
        }
    }

    if let Some(s) = start {
        segments.push(Segment { start: s, end: group_dq.len() });
    }

    segments
}

/// Drop single-group segments that are "swallowed" by a neighboring longer
/// segment, in one linear pass (spec §4.3, §9's sanctioned rewrite of the
/// source's quadratic `remove_bad_singles`).
///
/// A lone single-group segment — the only segment on the ramp — is kept
/// (handled downstream as a degenerate one-point fit), not dropped here.
pub fn remove_bad_singles(segments: Vec<Segment>) -> Vec<Segment> {
    if segments.len() <= 1 {
        return segments;
    }

    segments.into_iter().filter(|s| s.len() > 1).collect()
}
