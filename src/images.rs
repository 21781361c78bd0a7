//! Image persistence.
//!
//! Generated images are written once and never mutated. File naming follows
//! the `{seq:05}-{seed}-{prompt}` convention with the sequence number
//! continuing from the highest one already in the directory.

use std::{
    fs,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::DynamicImage;
use tracing::info;

use crate::options::ImageFormat;

/// Keyword the infotext is stored under in PNG metadata.
pub const INFOTEXT_KEY: &str = "parameters";

const MAX_PROMPT_CHARS: usize = 128;

/// Persists generated images; owns file naming and writing.
pub trait ImageSaver {
    #[allow(clippy::too_many_arguments)]
    fn save(
        &self,
        image: &DynamicImage,
        dir: &Path,
        filename_prefix: &str,
        seed: u64,
        prompt: &str,
        format: ImageFormat,
        info: &str,
    ) -> Result<PathBuf>;
}

/// Filesystem saver. PNGs carry the infotext as a `parameters` text chunk;
/// JPEGs get it as a `.txt` sidecar next to the image.
#[derive(Debug, Default)]
pub struct FsImageSaver;

impl ImageSaver for FsImageSaver {
    fn save(
        &self,
        image: &DynamicImage,
        dir: &Path,
        filename_prefix: &str,
        seed: u64,
        prompt: &str,
        format: ImageFormat,
        info: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;

        let seq = next_sequence_number(dir)?;
        let mut parts = vec![format!("{seq:05}")];
        if !filename_prefix.is_empty() {
            parts.push(filename_prefix.to_string());
        }
        parts.push(seed.to_string());
        let prompt_part = sanitize_filename_part(prompt);
        if !prompt_part.is_empty() {
            parts.push(prompt_part);
        }
        let path = dir.join(format!("{}.{}", parts.join("-"), format.extension()));

        match format {
            ImageFormat::Png => write_png(image, &path, info)?,
            ImageFormat::Jpeg => {
                image
                    .to_rgb8()
                    .save_with_format(&path, image::ImageFormat::Jpeg)?;
                if !info.is_empty() {
                    fs::write(path.with_extension("txt"), format!("{info}\n"))?;
                }
            }
        }

        info!("saved image to {}.", path.display());
        Ok(path)
    }
}

fn write_png(image: &DynamicImage, path: &Path, info: &str) -> Result<()> {
    let rgb = image.to_rgb8();
    let file = fs::File::create(path)
        .with_context(|| format!("creating image file {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), rgb.width(), rgb.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    if !info.is_empty() {
        // tEXt is Latin-1 only; anything else goes into an iTXt chunk.
        if info.chars().all(|c| (c as u32) <= 0xFF) {
            encoder.add_text_chunk(INFOTEXT_KEY.to_string(), info.to_string())?;
        } else {
            encoder.add_itxt_chunk(INFOTEXT_KEY.to_string(), info.to_string())?;
        }
    }
    let mut writer = encoder.write_header()?;
    writer.write_image_data(rgb.as_raw())?;
    Ok(())
}

/// Strip path-hostile characters from a prompt and bound its length.
fn sanitize_filename_part(text: &str) -> String {
    text.chars()
        .take(MAX_PROMPT_CHARS)
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Next free sequence number in `dir`, continuing from the highest leading
/// number among existing files.
fn next_sequence_number(dir: &Path) -> Result<u64> {
    let mut next: u64 = 0;
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((seq, _)) = name.split_once('-') else { continue };
            if let Ok(n) = seq.parse::<u64>() {
                // Saturate so a hostile filename cannot overflow the counter.
                next = next.max(n.saturating_add(1));
            }
        }
    }
    Ok(next)
}
