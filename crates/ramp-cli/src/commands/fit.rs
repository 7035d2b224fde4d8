use std::path::PathBuf;

use anyhow::{Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use clap::Args;
use ndarray::Array4;
use ramp_core::types::{Gain2D, GroupDq, RampCube, RampMeta, ReadNoise2D};
use ramp_core::{ramp_fit, RampFitOptions};
use serde::Deserialize;

use crate::summary;

/// Shape and timing header describing the raw binary ramp payload.
///
/// The payload files themselves are bare little-endian arrays in row-major
/// `[n_ints, n_groups, n_rows, n_cols]` order (or `[n_rows, n_cols]` for
/// read noise) — no magic number, no per-file header. This header carries
/// everything needed to interpret them.
#[derive(Deserialize)]
struct FitHeader {
    n_ints: usize,
    n_groups: usize,
    n_rows: usize,
    n_cols: usize,
    frame_time: f32,
    group_time: f32,
    nframes: u32,
    #[serde(default)]
    group_gap: u32,
    #[serde(default)]
    drop_frames1: u32,
}

#[derive(Args)]
pub struct FitArgs {
    /// JSON file describing cube shape and group timing
    pub header: PathBuf,

    /// Raw little-endian f32 ramp cube payload
    pub cube: PathBuf,

    /// Raw little-endian f32 per-pixel read noise payload
    pub read_noise: PathBuf,

    /// Raw little-endian f32 per-pixel gain payload
    pub gain: PathBuf,

    /// Raw little-endian u32 group DQ payload (all-zero if omitted)
    #[arg(long)]
    pub group_dq: Option<PathBuf>,

    /// Ramp-fit config file (TOML); defaults are used if omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit the optional per-segment diagnostics product
    #[arg(long)]
    pub save_optional: bool,
}

fn read_f32_payload(path: &PathBuf, len: usize) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    anyhow::ensure!(
        bytes.len() == len * 4,
        "{} has {} bytes, expected {} for {len} f32 values",
        path.display(),
        bytes.len(),
        len * 4
    );
    let mut values = vec![0.0f32; len];
    LittleEndian::read_f32_into(&bytes, &mut values);
    Ok(values)
}

fn read_u32_payload(path: &PathBuf, len: usize) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    anyhow::ensure!(
        bytes.len() == len * 4,
        "{} has {} bytes, expected {} for {len} u32 values",
        path.display(),
        bytes.len(),
        len * 4
    );
    let mut values = vec![0u32; len];
    LittleEndian::read_u32_into(&bytes, &mut values);
    Ok(values)
}

pub fn run(args: &FitArgs) -> Result<()> {
    let header_text =
        std::fs::read_to_string(&args.header).with_context(|| format!("failed to read {}", args.header.display()))?;
    let header: FitHeader = serde_json::from_str(&header_text).context("invalid fit header")?;

    let cube_len = header.n_ints * header.n_groups * header.n_rows * header.n_cols;
    let cube_values = read_f32_payload(&args.cube, cube_len)?;
    let cube: RampCube =
        Array4::from_shape_vec((header.n_ints, header.n_groups, header.n_rows, header.n_cols), cube_values)
            .context("cube payload does not match header shape")?;

    let mut group_dq: GroupDq = match &args.group_dq {
        Some(path) => {
            let values = read_u32_payload(path, cube_len)?;
            Array4::from_shape_vec(cube.dim(), values).context("group_dq payload does not match header shape")?
        }
        None => GroupDq::zeros(cube.dim()),
    };

    let rn_len = header.n_rows * header.n_cols;
    let rn_values = read_f32_payload(&args.read_noise, rn_len)?;
    let read_noise: ReadNoise2D = ndarray::Array2::from_shape_vec((header.n_rows, header.n_cols), rn_values)
        .context("read_noise payload does not match header shape")?;

    let gain_values = read_f32_payload(&args.gain, rn_len)?;
    let gain: Gain2D = ndarray::Array2::from_shape_vec((header.n_rows, header.n_cols), gain_values)
        .context("gain payload does not match header shape")?;

    let meta = RampMeta {
        frame_time: header.frame_time,
        group_time: header.group_time,
        nframes: header.nframes,
        group_gap: header.group_gap,
        drop_frames1: header.drop_frames1,
    };

    let mut options = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&text).context("invalid ramp-fit config")?
        }
        None => RampFitOptions::default(),
    };
    options.save_optional = options.save_optional || args.save_optional;

    let out = ramp_fit(&cube, &mut group_dq, &read_noise, &gain, &meta, &options).context("ramp_fit failed")?;
    summary::print_fit_summary(&args.cube, &out);
    Ok(())
}
