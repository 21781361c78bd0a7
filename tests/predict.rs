//! Orchestration-order and persistence tests using tracking pipeline doubles.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::Result;
use cascade_rs::{
    DecoderGenerationParams, DecoderPipeline, Device, GenerationRequest, ImageEmbeddings,
    ImageFormat, ImageSaver, ModelDType, ModelSource, Options, PipelineLoader, Predictor,
    PriorGenerationParams, PriorPipeline, RngSource, DECODER_MODEL_ID, PRIOR_MODEL_ID, SEED_MAX,
};
use image::DynamicImage;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    PriorLoaded { model_id: String, dtype: ModelDType },
    PriorInvoked { seed: u64, batch: usize },
    PriorReleased,
    DecoderLoaded { model_id: String, dtype: ModelDType },
    DecoderInvoked { guidance_scale: f64, num_steps: usize },
    DecoderReleased,
    Saved { dir: PathBuf, seed: u64, format: ImageFormat, info: String },
}

#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    fn position(&self, matches: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(matches)
    }
}

struct TrackedPrior {
    log: EventLog,
}

impl PriorPipeline for TrackedPrior {
    fn forward(
        &mut self,
        _prompt: &str,
        _negative_prompt: &str,
        params: &PriorGenerationParams,
    ) -> Result<ImageEmbeddings> {
        self.log.push(Event::PriorInvoked {
            seed: params.seed,
            batch: params.num_images_per_prompt,
        });
        ImageEmbeddings::new(
            vec![0.0; 16 * params.num_images_per_prompt],
            params.num_images_per_prompt,
        )
    }
}

impl Drop for TrackedPrior {
    fn drop(&mut self) {
        self.log.push(Event::PriorReleased);
    }
}

struct TrackedDecoder {
    log: EventLog,
    fail: bool,
}

impl DecoderPipeline for TrackedDecoder {
    fn forward(
        &mut self,
        image_embeddings: &ImageEmbeddings,
        _prompt: &str,
        _negative_prompt: &str,
        params: &DecoderGenerationParams,
    ) -> Result<Vec<DynamicImage>> {
        self.log.push(Event::DecoderInvoked {
            guidance_scale: params.guidance_scale,
            num_steps: params.num_steps,
        });
        if self.fail {
            anyhow::bail!("decoder exploded");
        }
        Ok(vec![DynamicImage::new_rgb8(8, 8); image_embeddings.num_images()])
    }
}

impl Drop for TrackedDecoder {
    fn drop(&mut self) {
        self.log.push(Event::DecoderReleased);
    }
}

#[derive(Default)]
struct TrackedLoader {
    log: EventLog,
    fail_prior_load: bool,
    fail_decoder_forward: bool,
}

impl PipelineLoader for TrackedLoader {
    fn load_prior(
        &self,
        source: &ModelSource,
        dtype: ModelDType,
        _device: &Device,
    ) -> Result<Box<dyn PriorPipeline>> {
        if self.fail_prior_load {
            anyhow::bail!("prior weights unavailable");
        }
        self.log.push(Event::PriorLoaded {
            model_id: source.to_string(),
            dtype,
        });
        Ok(Box::new(TrackedPrior {
            log: self.log.clone(),
        }))
    }

    fn load_decoder(
        &self,
        source: &ModelSource,
        dtype: ModelDType,
        _device: &Device,
    ) -> Result<Box<dyn DecoderPipeline>> {
        self.log.push(Event::DecoderLoaded {
            model_id: source.to_string(),
            dtype,
        });
        Ok(Box::new(TrackedDecoder {
            log: self.log.clone(),
            fail: self.fail_decoder_forward,
        }))
    }
}

struct RecordingSaver {
    log: EventLog,
    fail: bool,
}

impl ImageSaver for RecordingSaver {
    fn save(
        &self,
        _image: &DynamicImage,
        dir: &Path,
        _filename_prefix: &str,
        seed: u64,
        _prompt: &str,
        format: ImageFormat,
        info: &str,
    ) -> Result<PathBuf> {
        if self.fail {
            anyhow::bail!("disk full");
        }
        self.log.push(Event::Saved {
            dir: dir.to_path_buf(),
            seed,
            format,
            info: info.to_string(),
        });
        Ok(dir.join(format!("{seed}.png")))
    }
}

fn predictor(log: &EventLog, loader: TrackedLoader, fail_save: bool, options: Options) -> Predictor {
    init_logging();
    Predictor::new(
        Box::new(loader),
        Box::new(RecordingSaver {
            log: log.clone(),
            fail: fail_save,
        }),
        options,
        Device::Cpu,
    )
}

fn tracked_loader(log: &EventLog) -> TrackedLoader {
    TrackedLoader {
        log: log.clone(),
        ..TrackedLoader::default()
    }
}

#[test]
fn decoder_loads_only_after_prior_is_released() -> Result<()> {
    let log = EventLog::default();
    let predictor = predictor(&log, tracked_loader(&log), false, Options::default());

    predictor.predict(&GenerationRequest {
        prompt: "cat".to_string(),
        seed: 42,
        ..Default::default()
    })?;

    let released = log.position(|e| *e == Event::PriorReleased).unwrap();
    let decoder_loaded = log
        .position(|e| matches!(e, Event::DecoderLoaded { .. }))
        .unwrap();
    assert!(released < decoder_loaded, "events: {:?}", log.events());
    assert!(log.position(|e| *e == Event::DecoderReleased).is_some());
    Ok(())
}

#[test]
fn stages_load_the_fixed_models_at_their_dtypes() -> Result<()> {
    let log = EventLog::default();
    let predictor = predictor(&log, tracked_loader(&log), false, Options::default());

    predictor.predict(&GenerationRequest {
        seed: 1,
        decoder_steps: 12,
        ..Default::default()
    })?;

    let events = log.events();
    assert!(events.contains(&Event::PriorLoaded {
        model_id: format!("model id: {PRIOR_MODEL_ID}"),
        dtype: ModelDType::BF16,
    }));
    assert!(events.contains(&Event::DecoderLoaded {
        model_id: format!("model id: {DECODER_MODEL_ID}"),
        dtype: ModelDType::F16,
    }));
    // The decoder stage never applies classifier-free guidance.
    assert!(events.contains(&Event::DecoderInvoked {
        guidance_scale: 0.0,
        num_steps: 12,
    }));
    Ok(())
}

#[test]
fn batch_shares_one_resolved_seed_and_caption() -> Result<()> {
    let log = EventLog::default();
    let options = Options {
        randn_source: RngSource::Cpu,
        ..Options::default()
    };
    let predictor = predictor(&log, tracked_loader(&log), false, options);

    let images = predictor.predict(&GenerationRequest {
        prompt: "cat".to_string(),
        seed: 7,
        batch_size: 4,
        ..Default::default()
    })?;

    assert_eq!(images.len(), 4);
    assert!(images.iter().all(|i| i.seed == 7));
    assert!(images.iter().all(|i| i.info == images[0].info));
    assert!(images[0].info.contains("Seed: 7"));
    assert!(images[0].info.contains("RNG: CPU"));

    let saved_seeds: Vec<u64> = log
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Saved { seed, .. } => Some(*seed),
            _ => None,
        })
        .collect();
    assert_eq!(saved_seeds, vec![7, 7, 7, 7]);
    Ok(())
}

#[test]
fn sentinel_seed_is_resolved_once_per_request() -> Result<()> {
    let log = EventLog::default();
    let predictor = predictor(&log, tracked_loader(&log), false, Options::default());

    let images = predictor.predict(&GenerationRequest {
        prompt: "cat".to_string(),
        seed: -1,
        batch_size: 2,
        ..Default::default()
    })?;

    let seed = images[0].seed;
    assert!(seed < SEED_MAX);
    assert!(images.iter().all(|i| i.seed == seed));
    assert!(images[0].info.contains(&format!("Seed: {seed}")));

    // The generator saw the same seed the caption records.
    assert!(log
        .events()
        .contains(&Event::PriorInvoked { seed, batch: 2 }));
    Ok(())
}

#[test]
fn prior_load_failure_aborts_before_decoder_and_save() {
    let log = EventLog::default();
    let loader = TrackedLoader {
        fail_prior_load: true,
        ..tracked_loader(&log)
    };
    let predictor = predictor(&log, loader, false, Options::default());

    let result = predictor.predict(&GenerationRequest::default());
    assert!(result.is_err());
    assert!(log.events().is_empty());
}

#[test]
fn decoder_failure_still_releases_the_decoder() {
    let log = EventLog::default();
    let loader = TrackedLoader {
        fail_decoder_forward: true,
        ..tracked_loader(&log)
    };
    let predictor = predictor(&log, loader, false, Options::default());

    assert!(predictor.predict(&GenerationRequest::default()).is_err());

    let events = log.events();
    assert!(events.contains(&Event::PriorReleased));
    assert!(events.contains(&Event::DecoderReleased));
    assert!(!events.iter().any(|e| matches!(e, Event::Saved { .. })));
}

#[test]
fn save_failure_propagates() {
    let log = EventLog::default();
    let predictor = predictor(&log, tracked_loader(&log), true, Options::default());

    assert!(predictor.predict(&GenerationRequest::default()).is_err());
}

#[test]
fn saver_receives_the_configured_output_directory_and_format() -> Result<()> {
    let log = EventLog::default();
    let options = Options {
        outdir_samples: Some(PathBuf::from("custom/outputs")),
        samples_format: ImageFormat::Jpeg,
        ..Options::default()
    };
    let predictor = predictor(&log, tracked_loader(&log), false, options);

    predictor.predict(&GenerationRequest {
        seed: 3,
        ..Default::default()
    })?;

    let events = log.events();
    let saved = events
        .iter()
        .find(|e| matches!(e, Event::Saved { .. }))
        .unwrap();
    let Event::Saved { dir, seed, format, info } = saved else {
        unreachable!()
    };
    assert_eq!(dir, &PathBuf::from("custom/outputs"));
    assert_eq!(*seed, 3);
    assert_eq!(*format, ImageFormat::Jpeg);
    assert!(info.contains("Steps(Prior): 20"));
    Ok(())
}
