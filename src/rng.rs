use std::fmt::Display;

use rand::Rng;
use serde::Deserialize;

/// Source of the random tensors a pipeline backend draws during denoising.
///
/// Recorded in the infotext of generated images unless it is [`RngSource::Gpu`],
/// the conventional default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
pub enum RngSource {
    #[default]
    #[serde(rename = "GPU")]
    Gpu,
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "NV")]
    Nv,
}

impl Display for RngSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpu => write!(f, "GPU"),
            Self::Cpu => write!(f, "CPU"),
            Self::Nv => write!(f, "NV"),
        }
    }
}

/// Upper bound (exclusive) for randomly drawn seeds.
pub const SEED_MAX: u64 = 4294967294;

/// Resolve a requested seed to the value actually used for generation.
///
/// Non-negative seeds pass through unchanged. Negative values (the UI sends -1
/// for "random") resolve to a fresh draw from `[0, SEED_MAX)`. Callers must
/// resolve once per request and reuse the result for both the generator and
/// the infotext, otherwise the recorded seed drifts from the one used.
pub fn resolve_seed(seed: i64) -> u64 {
    if seed < 0 {
        rand::thread_rng().gen_range(0..SEED_MAX)
    } else {
        seed as u64
    }
}
