//! Orchestration of the two-stage Stable Cascade text-to-image flow.
//!
//! A prior pipeline turns text conditioning into compact latent image
//! embeddings; a decoder pipeline expands those embeddings into images. This
//! crate owns everything around those stages: the typed request and options,
//! seed resolution, infotext formatting, strictly sequential stage execution
//! with bounded weight residency, and image persistence. The diffusion
//! internals themselves live behind the [`PipelineLoader`] seam and are
//! supplied by a backend.
//!
//! ```rust,no_run
//! use cascade_rs::{Device, FsImageSaver, GenerationRequest, Options, Predictor};
//! # fn pipeline_loader() -> Box<dyn cascade_rs::PipelineLoader> { unimplemented!() }
//!
//! let predictor = Predictor::new(
//!     pipeline_loader(),
//!     Box::new(FsImageSaver),
//!     Options::default(),
//!     Device::Cpu,
//! );
//!
//! let images = predictor.predict(&GenerationRequest {
//!     prompt: "Draw a picture of a sunrise.".to_string(),
//!     ..Default::default()
//! })?;
//!
//! images[0].image.save("image.png")?;
//!
//! # Ok::<(), anyhow::Error>(())
//! ```

mod hub;
mod images;
mod infotext;
mod options;
mod pipelines;
mod predict;
mod request;
mod rng;

pub use hub::{FileLoader, ModelSource, TokenSource, DECODER_MODEL_ID, PRIOR_MODEL_ID};
pub use images::{FsImageSaver, ImageSaver, INFOTEXT_KEY};
pub use infotext::{create_infotext, quote};
pub use options::{ImageFormat, Options};
pub use pipelines::{
    DecoderGenerationParams, DecoderPipeline, Device, ImageEmbeddings, ModelDType, PipelineLoader,
    PriorGenerationParams, PriorPipeline,
};
pub use predict::{GeneratedImage, Predictor};
pub use request::{limits, GenerationRequest};
pub use rng::{resolve_seed, RngSource, SEED_MAX};
