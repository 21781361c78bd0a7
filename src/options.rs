use std::path::PathBuf;

use serde::Deserialize;

use crate::rng::RngSource;

/// Format generated images are written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
pub enum ImageFormat {
    #[default]
    #[serde(rename = "png")]
    Png,
    #[serde(rename = "jpg")]
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Options consumed by the infotext formatter and the image saver.
///
/// Passed explicitly wherever needed; there is no process-global options
/// object.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Override directory for generated samples. When unset, `outdir_default`
    /// is used.
    pub outdir_samples: Option<PathBuf>,
    /// Directory generated samples land in when no override is set.
    pub outdir_default: PathBuf,
    /// Format images are written in.
    pub samples_format: ImageFormat,
    /// Preferred gallery height, in pixels, for front-ends displaying results.
    pub gallery_height: Option<u32>,
    /// Where the backend draws random tensors from.
    pub randn_source: RngSource,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            outdir_samples: None,
            outdir_default: PathBuf::from("outputs/stable-cascade"),
            samples_format: ImageFormat::default(),
            gallery_height: None,
            randn_source: RngSource::default(),
        }
    }
}

impl Options {
    /// The directory generated samples should be written to.
    pub fn samples_dir(&self) -> &PathBuf {
        self.outdir_samples.as_ref().unwrap_or(&self.outdir_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_dir_prefers_override() {
        let mut options = Options::default();
        assert_eq!(options.samples_dir(), &PathBuf::from("outputs/stable-cascade"));

        options.outdir_samples = Some(PathBuf::from("elsewhere"));
        assert_eq!(options.samples_dir(), &PathBuf::from("elsewhere"));
    }
}
