//! The prediction orchestrator.
//!
//! One request runs the two stages strictly in sequence: prior forward,
//! prior teardown, decoder forward, decoder teardown, then persistence of
//! every produced image. The prior's weights are never resident at the same
//! time as the decoder's.

use std::{path::PathBuf, sync::Mutex};

use anyhow::Result;
use image::DynamicImage;
use tracing::info;

use crate::{
    hub::{ModelSource, DECODER_MODEL_ID, PRIOR_MODEL_ID},
    images::ImageSaver,
    infotext::create_infotext,
    options::Options,
    pipelines::{
        DecoderGenerationParams, Device, ModelDType, PipelineLoader, PriorGenerationParams,
    },
    request::GenerationRequest,
    rng::resolve_seed,
};

/// One generated image together with everything recorded about it.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub image: DynamicImage,
    /// The seed actually used, after resolving any random-seed request.
    pub seed: u64,
    /// The infotext persisted alongside the image.
    pub info: String,
    /// Where the image was written.
    pub path: PathBuf,
}

/// Runs generation requests to completion.
///
/// Requests are serialized through an internal mutex: the compute device and
/// resident weights are not shared safely between two in-flight requests.
/// There is no cancellation; a request runs until it finishes or fails, and
/// the first failure aborts the remaining steps with no retry.
pub struct Predictor {
    loader: Box<dyn PipelineLoader>,
    saver: Box<dyn ImageSaver>,
    options: Options,
    device: Device,
    lock: Mutex<()>,
}

impl Predictor {
    pub fn new(
        loader: Box<dyn PipelineLoader>,
        saver: Box<dyn ImageSaver>,
        options: Options,
        device: Device,
    ) -> Self {
        Self {
            loader,
            saver,
            options,
            device,
            lock: Mutex::new(()),
        }
    }

    /// Generate, persist and return `batch_size` images for one request.
    ///
    /// All batch elements share the request's single resolved seed, and that
    /// is the seed their infotexts record.
    pub fn predict(&self, request: &GenerationRequest) -> Result<Vec<GeneratedImage>> {
        let _guard = self.lock.lock().expect("could not lock predictor");

        let seed = resolve_seed(request.seed);
        info!(
            "generating {} {}x{} image(s) with seed {seed} on {}.",
            request.batch_size, request.width, request.height, self.device
        );

        let image_embeddings = {
            let source = ModelSource::from_model_id(PRIOR_MODEL_ID);
            let mut prior = self.loader.load_prior(&source, ModelDType::BF16, &self.device)?;
            prior.forward(
                &request.prompt,
                &request.negative_prompt,
                &PriorGenerationParams {
                    width: request.width,
                    height: request.height,
                    guidance_scale: request.guidance_scale,
                    num_steps: request.prior_steps,
                    num_images_per_prompt: request.batch_size,
                    seed,
                },
            )?
        };
        // The prior dropped with its scope above; at most one stage's weights
        // are resident from here on.

        let images = {
            let source = ModelSource::from_model_id(DECODER_MODEL_ID);
            let mut decoder =
                self.loader
                    .load_decoder(&source, ModelDType::F16, &self.device)?;
            decoder.forward(
                &image_embeddings,
                &request.prompt,
                &request.negative_prompt,
                // The decoder stage runs without classifier-free guidance.
                &DecoderGenerationParams {
                    guidance_scale: 0.0,
                    num_steps: request.decoder_steps,
                },
            )?
        };

        let info = create_infotext(
            &request.prompt,
            &request.negative_prompt,
            request.guidance_scale,
            request.prior_steps,
            request.decoder_steps,
            seed,
            request.width,
            request.height,
            &self.options,
        );

        let outdir = self.options.samples_dir().clone();
        let mut generated = Vec::with_capacity(images.len());
        for image in images {
            let path = self.saver.save(
                &image,
                &outdir,
                "",
                seed,
                &request.prompt,
                self.options.samples_format,
                &info,
            )?;
            generated.push(GeneratedImage {
                image,
                seed,
                info: info.clone(),
                path,
            });
        }
        Ok(generated)
    }
}
