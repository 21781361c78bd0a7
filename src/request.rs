use std::ops::RangeInclusive;

use anyhow::Result;
use serde::Deserialize;

/// Bounds the front-end controls enforce. [`GenerationRequest::validate`]
/// checks them at the request boundary; the orchestrator trusts its input.
pub mod limits {
    use std::ops::RangeInclusive;

    pub const DIMENSION: RangeInclusive<usize> = 16..=4096;
    pub const DIMENSION_STEP: usize = 8;
    pub const GUIDANCE_SCALE: RangeInclusive<f64> = 1.0..=32.0;
    pub const STEPS: RangeInclusive<usize> = 1..=60;
    pub const BATCH_SIZE: RangeInclusive<usize> = 1..=9;
}

/// One image-generation request. Stateless; nothing here persists across
/// invocations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: usize,
    pub height: usize,
    pub guidance_scale: f64,
    pub prior_steps: usize,
    pub decoder_steps: usize,
    /// Requested seed; -1 asks for a random one.
    pub seed: i64,
    /// Number of images to generate from one prompt.
    pub batch_size: usize,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            width: 1024,
            height: 1024,
            guidance_scale: 4.0,
            prior_steps: 20,
            decoder_steps: 10,
            seed: -1,
            batch_size: 1,
        }
    }
}

impl GenerationRequest {
    /// Check this request against the front-end bounds in [`limits`].
    pub fn validate(&self) -> Result<()> {
        check_dimension("width", self.width)?;
        check_dimension("height", self.height)?;
        anyhow::ensure!(
            limits::GUIDANCE_SCALE.contains(&self.guidance_scale),
            "guidance scale {} out of range {:?}",
            self.guidance_scale,
            limits::GUIDANCE_SCALE
        );
        check_range("prior steps", self.prior_steps, limits::STEPS)?;
        check_range("decoder steps", self.decoder_steps, limits::STEPS)?;
        check_range("batch size", self.batch_size, limits::BATCH_SIZE)?;
        Ok(())
    }
}

fn check_dimension(name: &str, value: usize) -> Result<()> {
    check_range(name, value, limits::DIMENSION)?;
    anyhow::ensure!(
        value % limits::DIMENSION_STEP == 0,
        "{name} {value} is not a multiple of {}",
        limits::DIMENSION_STEP
    );
    Ok(())
}

fn check_range(name: &str, value: usize, range: RangeInclusive<usize>) -> Result<()> {
    anyhow::ensure!(
        range.contains(&value),
        "{name} {value} out of range {range:?}"
    );
    Ok(())
}
