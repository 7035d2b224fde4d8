use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ramp_core::types::{Gain2D, GroupDq, RampCube, RampMeta, ReadNoise2D};
use ramp_core::{ramp_fit, RampFitOptions};

use crate::rng::Lcg;
use crate::summary;

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of integrations
    #[arg(long, default_value = "1")]
    pub n_ints: usize,

    /// Groups per integration
    #[arg(long, default_value = "10")]
    pub n_groups: usize,

    /// Image rows
    #[arg(long, default_value = "4")]
    pub rows: usize,

    /// Image columns
    #[arg(long, default_value = "4")]
    pub cols: usize,

    /// True signal rate, electrons/second
    #[arg(long, default_value = "50.0")]
    pub flux: f32,

    /// Read noise, electrons
    #[arg(long, default_value = "5.0")]
    pub read_noise: f32,

    /// Gain, electrons per DN
    #[arg(long, default_value = "1.0")]
    pub gain: f32,

    /// Frames averaged per group
    #[arg(long, default_value = "1")]
    pub nframes: u32,

    /// Seconds between the start of consecutive groups
    #[arg(long, default_value = "1.0")]
    pub group_time: f32,

    /// Fraction of pixels that get a cosmic-ray hit injected mid-ramp
    #[arg(long, default_value = "0.0")]
    pub cr_fraction: f32,

    /// Injected cosmic-ray jump size, electrons
    #[arg(long, default_value = "5000.0")]
    pub cr_magnitude: f32,

    /// RNG seed
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Load a ramp-fit config file (TOML) instead of the default
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit the optional per-segment diagnostics product
    #[arg(long)]
    pub save_optional: bool,
}

pub fn run(args: &SimulateArgs) -> Result<()> {
    let options = load_options(args)?;
    let meta = RampMeta {
        frame_time: args.group_time,
        group_time: args.group_time,
        nframes: args.nframes,
        group_gap: 0,
        drop_frames1: 0,
    };

    let mut rng = Lcg::new(args.seed);
    let (cube, group_dq, cr_hit) = build_cube(args, &mut rng);
    let read_noise = ReadNoise2D::from_elem((args.rows, args.cols), args.read_noise);
    let gain = Gain2D::from_elem((args.rows, args.cols), args.gain);

    let mut group_dq = group_dq;
    let out = ramp_fit(&cube, &mut group_dq, &read_noise, &gain, &meta, &options).context("ramp_fit failed")?;

    summary::print_simulation_summary(args, &out, &cr_hit);
    Ok(())
}

fn load_options(args: &SimulateArgs) -> Result<RampFitOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str(&text).context("invalid ramp-fit config")?
        }
        None => RampFitOptions::default(),
    };
    options.save_optional = options.save_optional || args.save_optional;
    Ok(options)
}

/// Build a synthetic ramp cube: a linear signal ramp plus Gaussian read
/// noise, with an optional mid-ramp cosmic-ray hit on a subset of pixels.
/// Returns `(cube, group_dq, cr_hit)` where `cr_hit[row][col]` marks which
/// pixels received an injected jump.
fn build_cube(args: &SimulateArgs, rng: &mut Lcg) -> (RampCube, GroupDq, Vec<Vec<bool>>) {
    let mut cube = RampCube::zeros((args.n_ints, args.n_groups, args.rows, args.cols));
    let group_dq = GroupDq::zeros(cube.dim());
    let mut cr_hit = vec![vec![false; args.cols]; args.rows];

    let cr_group = args.n_groups / 2;

    for row in 0..args.rows {
        for col in 0..args.cols {
            let hit = args.cr_fraction > 0.0 && rng.next_f32() < args.cr_fraction;
            cr_hit[row][col] = hit;

            for integ in 0..args.n_ints {
                let mut accumulated_jump = 0.0f32;
                for g in 0..args.n_groups {
                    if hit && g == cr_group {
                        accumulated_jump += args.cr_magnitude;
                    }
                    let signal = args.flux * g as f32 + accumulated_jump;
                    let noise = args.read_noise * rng.next_gaussian();
                    cube[[integ, g, row, col]] = signal + noise;
                }
            }
        }
    }

    (cube, group_dq, cr_hit)
}
