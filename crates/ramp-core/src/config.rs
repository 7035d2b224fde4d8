//! Caller-facing ramp-fit configuration (spec §6).
//!
//! Follows the teacher's config convention: a plain `serde`-derived struct
//! with `#[serde(default = ...)]` on every field and a matching `Default`
//! impl, so a partial TOML/JSON document and the zero-config path both
//! produce the same values.

use serde::{Deserialize, Serialize};

use crate::flags::DqFlags;
use crate::jump::{JumpThresholds, NeighborPolicy};

fn default_true() -> bool {
    true
}

fn default_max_cores() -> MaxCores {
    MaxCores::All
}

fn default_thresholds() -> JumpThresholds {
    JumpThresholds::default()
}

fn default_neighbor_policy() -> NeighborPolicy {
    NeighborPolicy::default()
}

fn default_dq_flags() -> DqFlags {
    DqFlags::default()
}

/// How many cores a `ramp_fit` call is allowed to spread row-band work
/// across. Mirrors the string-valued knob used by JWST pipeline configs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxCores {
    None,
    Quarter,
    Half,
    All,
}

impl MaxCores {
    /// Resolve against the number of cores actually available.
    pub fn resolve(self, available: usize) -> usize {
        match self {
            MaxCores::None => 1,
            MaxCores::Quarter => (available / 4).max(1),
            MaxCores::Half => (available / 2).max(1),
            MaxCores::All => available.max(1),
        }
    }
}

impl Default for MaxCores {
    fn default() -> Self {
        MaxCores::All
    }
}

/// Top-level ramp-fit configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RampFitOptions {
    /// Run the iterative two-point-difference jump detector (spec §4.2).
    #[serde(default = "default_true")]
    pub detect_jumps: bool,

    /// Emit the per-segment optional-results product (spec §4.7).
    #[serde(default)]
    pub save_optional: bool,

    /// Row-band concurrency budget (spec §5).
    #[serde(default = "default_max_cores")]
    pub max_cores: MaxCores,

    /// Sigma-rejection thresholds for jump detection.
    #[serde(default = "default_thresholds")]
    pub thresholds: JumpThresholds,

    /// Four-neighbor jump-flagging policy.
    #[serde(default = "default_neighbor_policy")]
    pub neighbor_policy: NeighborPolicy,

    /// DQ bit-flag vocabulary (spec §6: the core never hard-codes these).
    #[serde(default = "default_dq_flags")]
    pub dq_flags: DqFlags,
}

impl Default for RampFitOptions {
    fn default() -> Self {
        Self {
            detect_jumps: true,
            save_optional: false,
            max_cores: MaxCores::default(),
            thresholds: JumpThresholds::default(),
            neighbor_policy: NeighborPolicy::default(),
            dq_flags: DqFlags::default(),
        }
    }
}
