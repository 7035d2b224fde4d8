//! End-to-end scenarios for the whole `ramp_fit` pipeline.

use ramp_core::pipeline::ramp_fit;
use ramp_core::types::{Gain2D, GroupDq, RampCube, RampMeta, ReadNoise2D};
use ramp_core::RampFitOptions;

fn meta(nframes: u32) -> RampMeta {
    RampMeta {
        frame_time: 1.0,
        group_time: 1.0,
        nframes,
        group_gap: 0,
        drop_frames1: 0,
    }
}

fn flat_cube(n_ints: usize, n_groups: usize, rows: usize, cols: usize, rate: f32) -> RampCube {
    let mut cube = RampCube::zeros((n_ints, n_groups, rows, cols));
    for integ in 0..n_ints {
        for g in 0..n_groups {
            for row in 0..rows {
                for col in 0..cols {
                    cube[[integ, g, row, col]] = rate * g as f32;
                }
            }
        }
    }
    cube
}

/// A single-pixel, single-integration ramp built from literal group values,
/// for the spec's literal-input scenarios.
fn one_pixel_cube(values: &[f32]) -> RampCube {
    let mut cube = RampCube::zeros((1, values.len(), 1, 1));
    for (g, &v) in values.iter().enumerate() {
        cube[[0, g, 0, 0]] = v;
    }
    cube
}

fn rej_threshold_options(rej: f32) -> RampFitOptions {
    RampFitOptions {
        thresholds: ramp_core::jump::JumpThresholds {
            rej4: rej,
            rej3: rej,
            rej2: rej,
        },
        neighbor_policy: ramp_core::jump::NeighborPolicy {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn clean_single_integration_ramp_recovers_rate() {
    let cube = flat_cube(1, 12, 3, 3, 80.0);
    let mut dq = GroupDq::zeros(cube.dim());
    let rn = ReadNoise2D::from_elem((3, 3), 8.0);
    let gain = Gain2D::from_elem((3, 3), 1.0);
    let out = ramp_fit(&cube, &mut dq, &rn, &gain, &meta(4), &RampFitOptions::default()).expect("fit ok");

    for row in 0..3 {
        for col in 0..3 {
            let slope = out.exposure.slope[[row, col]];
            assert!((slope - 80.0).abs() < 2.0, "slope = {slope}");
        }
    }
}

#[test]
fn cosmic_ray_mid_ramp_is_isolated_to_its_segment() {
    let mut cube = flat_cube(1, 10, 1, 1, 100.0);
    // inject a jump at group 5 onward
    for g in 5..10 {
        cube[[0, g, 0, 0]] += 8000.0;
    }
    let mut dq = GroupDq::zeros(cube.dim());
    let rn = ReadNoise2D::from_elem((1, 1), 5.0);
    let gain = Gain2D::from_elem((1, 1), 1.0);
    let options = rej_threshold_options(4.0);
    let out = ramp_fit(&cube, &mut dq, &rn, &gain, &meta(1), &options).expect("fit ok");

    assert_ne!(dq[[0, 5, 0, 0]] & options.dq_flags.jump_det, 0);
    // combined slope should still be close to the true 100 e/s rate, since
    // both segments (pre- and post-jump) independently recover it.
    let slope = out.exposure.slope[[0, 0]];
    assert!((slope - 100.0).abs() < 5.0, "slope = {slope}");
}

#[test]
fn ramp_saturated_from_the_first_group_is_flagged_do_not_use() {
    let cube = flat_cube(1, 6, 1, 1, 50.0);
    let mut dq = GroupDq::zeros(cube.dim());
    let flags = ramp_core::flags::DqFlags::default();
    for g in 0..6 {
        dq[[0, g, 0, 0]] = flags.saturated;
    }
    let rn = ReadNoise2D::from_elem((1, 1), 5.0);
    let gain = Gain2D::from_elem((1, 1), 1.0);
    let out = ramp_fit(&cube, &mut dq, &rn, &gain, &meta(1), &RampFitOptions::default()).expect("fit ok");

    // Scenario 5: all-saturated integration -> slope 0, both variances at
    // the sentinel, and DO_NOT_USE | SATURATED on the pixel DQ.
    assert_ne!(out.exposure.dq[[0, 0]] & flags.do_not_use, 0);
    assert_ne!(out.exposure.dq[[0, 0]] & flags.saturated, 0);
    assert_eq!(out.exposure.slope[[0, 0]], 0.0);
    assert_eq!(out.exposure.var_poisson[[0, 0]], ramp_core::consts::LARGE_VARIANCE);
    assert_eq!(out.exposure.var_read[[0, 0]], ramp_core::consts::LARGE_VARIANCE);
}

#[test]
fn saturation_partway_through_truncates_but_still_fits() {
    let cube = flat_cube(1, 8, 1, 1, 60.0);
    let mut dq = GroupDq::zeros(cube.dim());
    let flags = ramp_core::flags::DqFlags::default();
    for g in 5..8 {
        dq[[0, g, 0, 0]] = flags.saturated;
    }
    let rn = ReadNoise2D::from_elem((1, 1), 3.0);
    let gain = Gain2D::from_elem((1, 1), 1.0);
    let out = ramp_fit(&cube, &mut dq, &rn, &gain, &meta(1), &RampFitOptions::default()).expect("fit ok");

    let slope = out.exposure.slope[[0, 0]];
    assert!((slope - 60.0).abs() < 3.0, "slope = {slope}");
    assert_eq!(out.exposure.dq[[0, 0]] & flags.do_not_use, 0);
}

#[test]
fn one_saturated_integration_does_not_poison_the_exposure() {
    let mut cube = RampCube::zeros((2, 8, 1, 1));
    for g in 0..8 {
        cube[[0, g, 0, 0]] = 40.0 * g as f32;
        cube[[1, g, 0, 0]] = 40.0 * g as f32;
    }
    let mut dq = GroupDq::zeros(cube.dim());
    let flags = ramp_core::flags::DqFlags::default();
    for g in 0..8 {
        dq[[0, g, 0, 0]] = flags.saturated; // integration 0 saturated from the start
    }
    let rn = ReadNoise2D::from_elem((1, 1), 5.0);
    let gain = Gain2D::from_elem((1, 1), 1.0);
    let out = ramp_fit(&cube, &mut dq, &rn, &gain, &meta(1), &RampFitOptions::default()).expect("fit ok");

    // DO_NOT_USE must not propagate: integration 1 is clean.
    assert_eq!(out.exposure.dq[[0, 0]] & flags.do_not_use, 0);
    let slope = out.exposure.slope[[0, 0]];
    assert!((slope - 40.0).abs() < 3.0, "slope = {slope}");
}

/// Spec §8 scenario 1: a clean 5-group ramp, groupTime = 2.0s, nFrames = 1,
/// readNoise = 1.0, gain = 1.0 -> slope = 5.0 e-/s, no JUMP_DET.
#[test]
fn literal_scenario_1_clean_ramp_recovers_exact_rate() {
    let cube = one_pixel_cube(&[10.0, 20.0, 30.0, 40.0, 50.0]);
    let mut dq = GroupDq::zeros(cube.dim());
    let rn = ReadNoise2D::from_elem((1, 1), 1.0);
    let gain = Gain2D::from_elem((1, 1), 1.0);
    let m = RampMeta {
        frame_time: 2.0,
        group_time: 2.0,
        nframes: 1,
        group_gap: 0,
        drop_frames1: 0,
    };
    let flags = ramp_core::flags::DqFlags::default();
    let out = ramp_fit(&cube, &mut dq, &rn, &gain, &m, &RampFitOptions::default()).expect("fit ok");

    assert!((out.exposure.slope[[0, 0]] - 5.0).abs() < 1e-3, "slope = {}", out.exposure.slope[[0, 0]]);
    for g in 0..5 {
        assert_eq!(dq[[0, g, 0, 0]] & flags.jump_det, 0);
    }
}

/// Spec §8 scenario 2: a single jump at group index 3, rej-threshold 4.0 ->
/// JUMP_DET on group 3 only; combined slope recovers ~5.0 from two segments
/// of length 3 and 2.
#[test]
fn literal_scenario_2_single_jump_is_isolated_and_slope_recovers() {
    let cube = one_pixel_cube(&[10.0, 20.0, 30.0, 130.0, 140.0]);
    let mut dq = GroupDq::zeros(cube.dim());
    let rn = ReadNoise2D::from_elem((1, 1), 1.0);
    let gain = Gain2D::from_elem((1, 1), 1.0);
    let m = RampMeta {
        frame_time: 2.0,
        group_time: 2.0,
        nframes: 1,
        group_gap: 0,
        drop_frames1: 0,
    };
    let options = rej_threshold_options(4.0);
    let out = ramp_fit(&cube, &mut dq, &rn, &gain, &m, &options).expect("fit ok");

    for g in 0..5 {
        let is_jump = dq[[0, g, 0, 0]] & options.dq_flags.jump_det != 0;
        assert_eq!(is_jump, g == 3, "group {g} jump flag mismatch");
    }
    assert!((out.exposure.slope[[0, 0]] - 5.0).abs() < 0.5, "slope = {}", out.exposure.slope[[0, 0]]);
}

/// Spec §8 scenario 3: two jumps at group indices 3 and 5 -> JUMP_DET on
/// groups 3 and 5 only, splitting the ramp into three segments of length
/// 3, 2, 2; combined slope still recovers ~5.0.
#[test]
fn literal_scenario_3_two_jumps_split_into_three_segments() {
    let cube = one_pixel_cube(&[10.0, 20.0, 30.0, 130.0, 140.0, 250.0, 260.0]);
    let mut dq = GroupDq::zeros(cube.dim());
    let rn = ReadNoise2D::from_elem((1, 1), 1.0);
    let gain = Gain2D::from_elem((1, 1), 1.0);
    let m = RampMeta {
        frame_time: 2.0,
        group_time: 2.0,
        nframes: 1,
        group_gap: 0,
        drop_frames1: 0,
    };
    let options = rej_threshold_options(4.0);
    let out = ramp_fit(&cube, &mut dq, &rn, &gain, &m, &options).expect("fit ok");

    for g in 0..7 {
        let is_jump = dq[[0, g, 0, 0]] & options.dq_flags.jump_det != 0;
        assert_eq!(is_jump, g == 3 || g == 5, "group {g} jump flag mismatch");
    }
    assert!((out.exposure.slope[[0, 0]] - 5.0).abs() < 0.5, "slope = {}", out.exposure.slope[[0, 0]]);
}

/// Spec §8 scenario 4: a saturated tail (groups 3, 4 saturated) truncates
/// the usable ramp to its first 3 groups; no jump is detected (the
/// median-diff policy excludes the NaN first differences past the
/// saturation boundary) and the slope recovers from that single segment.
#[test]
fn literal_scenario_4_saturated_tail_truncates_without_a_false_jump() {
    let cube = one_pixel_cube(&[10.0, 20.0, 30.0, 0.0, 0.0]);
    let mut dq = GroupDq::zeros(cube.dim());
    let flags = ramp_core::flags::DqFlags::default();
    dq[[0, 3, 0, 0]] = flags.saturated;
    dq[[0, 4, 0, 0]] = flags.saturated;
    let rn = ReadNoise2D::from_elem((1, 1), 1.0);
    let gain = Gain2D::from_elem((1, 1), 1.0);
    let m = RampMeta {
        frame_time: 2.0,
        group_time: 2.0,
        nframes: 1,
        group_gap: 0,
        drop_frames1: 0,
    };
    let options = rej_threshold_options(4.0);
    let out = ramp_fit(&cube, &mut dq, &rn, &gain, &m, &options).expect("fit ok");

    for g in 0..3 {
        assert_eq!(dq[[0, g, 0, 0]] & options.dq_flags.jump_det, 0);
    }
    assert!((out.exposure.slope[[0, 0]] - 5.0).abs() < 0.5, "slope = {}", out.exposure.slope[[0, 0]]);
}
