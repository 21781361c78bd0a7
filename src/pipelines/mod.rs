//! The seam between the orchestrator and the diffusion pipelines.
//!
//! Stable Cascade generates in two stages: a prior turns text conditioning
//! into compact latent image embeddings, and a decoder expands those
//! embeddings into full-resolution images. This crate does not implement the
//! stages; backends provide them through the traits here.

use std::fmt::Display;

use anyhow::Result;
use image::DynamicImage;
use serde::Deserialize;

use crate::hub::ModelSource;

/// Compute device a pipeline is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            Self::Metal(ordinal) => write!(f, "metal:{ordinal}"),
        }
    }
}

/// DType pipeline weights are loaded in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
pub enum ModelDType {
    #[default]
    #[serde(rename = "bf16")]
    BF16,
    #[serde(rename = "f16")]
    F16,
    #[serde(rename = "f32")]
    F32,
}

impl Display for ModelDType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BF16 => write!(f, "bf16"),
            Self::F16 => write!(f, "f16"),
            Self::F32 => write!(f, "f32"),
        }
    }
}

/// Generation parameters for the prior stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorGenerationParams {
    pub width: usize,
    pub height: usize,
    /// Higher guidance scale encourages images closely linked to the text
    /// `prompt`, usually at the expense of lower image quality.
    pub guidance_scale: f64,
    /// The number of denoising steps. More steps usually lead to a higher
    /// quality image at the expense of slower inference.
    pub num_steps: usize,
    pub num_images_per_prompt: usize,
    /// Seed for the generator driving the denoising process.
    pub seed: u64,
}

/// Generation parameters for the decoder stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderGenerationParams {
    pub guidance_scale: f64,
    pub num_steps: usize,
}

/// Latent image embeddings produced by the prior stage, one per batch
/// element. Opaque to the orchestrator; only ever handed back to a decoder
/// from the same backend. Never persisted.
#[derive(Debug, Clone)]
pub struct ImageEmbeddings {
    data: Vec<f32>,
    num_images: usize,
}

impl ImageEmbeddings {
    pub fn new(data: Vec<f32>, num_images: usize) -> Result<Self> {
        anyhow::ensure!(num_images > 0, "embeddings must hold at least one image");
        anyhow::ensure!(
            data.len() % num_images == 0,
            "embedding data length {} does not divide into {num_images} images",
            data.len()
        );
        Ok(Self { data, num_images })
    }

    pub fn num_images(&self) -> usize {
        self.num_images
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// The prior stage: text conditioning in, latent embeddings out.
pub trait PriorPipeline {
    fn forward(
        &mut self,
        prompt: &str,
        negative_prompt: &str,
        params: &PriorGenerationParams,
    ) -> Result<ImageEmbeddings>;
}

/// The decoder stage: latent embeddings in, images out.
pub trait DecoderPipeline {
    fn forward(
        &mut self,
        image_embeddings: &ImageEmbeddings,
        prompt: &str,
        negative_prompt: &str,
        params: &DecoderGenerationParams,
    ) -> Result<Vec<DynamicImage>>;
}

/// Builds pipeline stages from a model source.
///
/// Loading is expected to be expensive; the orchestrator loads each stage
/// right before its forward pass and drops it right after, so at most one
/// stage's weights are resident at a time.
pub trait PipelineLoader {
    fn load_prior(
        &self,
        source: &ModelSource,
        dtype: ModelDType,
        device: &Device,
    ) -> Result<Box<dyn PriorPipeline>>;

    fn load_decoder(
        &self,
        source: &ModelSource,
        dtype: ModelDType,
        device: &Device,
    ) -> Result<Box<dyn DecoderPipeline>>;
}
