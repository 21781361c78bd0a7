use std::{
    env,
    fmt::{self, Display},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Result;
use hf_hub::{
    api::sync::{ApiBuilder, ApiRepo},
    Repo, RepoType,
};
use thiserror::Error;
use tracing::warn;

/// Hugging Face model id of the Stable Cascade prior stage.
pub const PRIOR_MODEL_ID: &str = "stabilityai/stable-cascade-prior";
/// Hugging Face model id of the Stable Cascade decoder stage.
pub const DECODER_MODEL_ID: &str = "stabilityai/stable-cascade";

/// The source of the HF token.
#[derive(Debug, Clone, Default)]
pub enum TokenSource {
    Literal(String),
    EnvVar(String),
    Path(String),
    #[default]
    CacheToken,
    None,
}

impl FromStr for TokenSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(2, ':').collect();
        match parts[0] {
            "literal" => parts
                .get(1)
                .map(|&value| TokenSource::Literal(value.to_string()))
                .ok_or_else(|| "Expected a value for 'literal'".to_string()),
            "env" => Ok(TokenSource::EnvVar(
                parts
                    .get(1)
                    .unwrap_or(&"HUGGING_FACE_HUB_TOKEN")
                    .to_string(),
            )),
            "path" => parts
                .get(1)
                .map(|&value| TokenSource::Path(value.to_string()))
                .ok_or_else(|| "Expected a value for 'path'".to_string()),
            "cache" => Ok(TokenSource::CacheToken),
            "none" => Ok(TokenSource::None),
            _ => Err("Invalid token source format".to_string()),
        }
    }
}

impl Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Literal(value) => write!(f, "literal:{value}"),
            TokenSource::EnvVar(value) => write!(f, "env:{value}"),
            TokenSource::Path(value) => write!(f, "path:{value}"),
            TokenSource::CacheToken => write!(f, "cache"),
            TokenSource::None => write!(f, "none"),
        }
    }
}

#[derive(Error, Debug)]
enum TokenRetrievalError {
    #[error("No home directory.")]
    HomeDirectoryMissing,
}

/// Reads a token from the specified source. If the token cannot be read, a
/// warning is logged and *no token is used*.
fn get_token(source: &TokenSource) -> Result<Option<String>> {
    fn skip_token(input: &str) -> Option<String> {
        warn!("could not load token at {input:?}, using no HF token.");
        None
    }

    let token = match source {
        TokenSource::Literal(data) => Some(data.clone()),
        TokenSource::EnvVar(envvar) => env::var(envvar).ok().or_else(|| skip_token(envvar)),
        TokenSource::Path(path) => fs::read_to_string(path).ok().or_else(|| skip_token(path)),
        TokenSource::CacheToken => {
            let home = format!(
                "{}/.cache/huggingface/token",
                dirs::home_dir()
                    .ok_or(TokenRetrievalError::HomeDirectoryMissing)?
                    .display()
            );

            fs::read_to_string(&home).ok().or_else(|| skip_token(&home))
        }
        TokenSource::None => None,
    };

    Ok(token.map(|s| s.trim().to_string()))
}

/// Source from which to load pipeline weights. Resolved at load time; weights
/// are neither bundled nor versioned locally.
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// A Hugging Face model id such as `stabilityai/stable-cascade-prior`.
    ModelId(String),
    /// A local directory holding an already-downloaded model.
    Local(PathBuf),
}

impl Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelId(model_id) => write!(f, "model id: {model_id}"),
            Self::Local(dir) => write!(f, "local dir: {}", dir.display()),
        }
    }
}

impl ModelSource {
    pub fn from_model_id<S: ToString>(model_id: S) -> Self {
        Self::ModelId(model_id.to_string())
    }

    pub fn local<P: Into<PathBuf>>(dir: P) -> Self {
        Self::Local(dir.into())
    }
}

/// Resolves a [`ModelSource`] into listable, fetchable files for a pipeline
/// loader to build its stages from.
pub enum FileLoader {
    Api(Box<ApiRepo>),
    Dir(PathBuf),
}

impl FileLoader {
    pub fn from_model_source(
        source: &ModelSource,
        silent: bool,
        token: TokenSource,
        revision: Option<String>,
    ) -> Result<Self> {
        match source {
            ModelSource::ModelId(model_id) => {
                let api = ApiBuilder::new()
                    .with_progress(!silent)
                    .with_token(get_token(&token)?)
                    .build()?;
                let revision = revision.unwrap_or("main".to_string());
                let repo = api.repo(Repo::with_revision(
                    model_id.clone(),
                    RepoType::Model,
                    revision,
                ));

                Ok(Self::Api(Box::new(repo)))
            }
            ModelSource::Local(dir) => {
                anyhow::ensure!(dir.is_dir(), "{} is not a directory", dir.display());
                Ok(Self::Dir(dir.clone()))
            }
        }
    }

    /// List the files available from this source, relative to its root.
    pub fn list_files(&self) -> Result<Vec<String>> {
        match self {
            Self::Api(api) => api
                .info()
                .map(|repo| {
                    repo.siblings
                        .iter()
                        .map(|x| x.rfilename.clone())
                        .collect::<Vec<String>>()
                })
                .map_err(|e| anyhow::Error::msg(e.to_string())),
            Self::Dir(dir) => {
                let mut files = Vec::new();
                list_dir_files(dir, dir, &mut files)?;
                files.sort();
                Ok(files)
            }
        }
    }

    /// Fetch a file, returning a local path to it. Hub files are downloaded
    /// into the cache on first access.
    pub fn read_file(&self, name: &str) -> Result<PathBuf> {
        match self {
            Self::Api(api) => api
                .get(name)
                .map_err(|e| anyhow::Error::msg(e.to_string())),
            Self::Dir(dir) => {
                let path = dir.join(name);
                anyhow::ensure!(path.is_file(), "no such file: {}", path.display());
                Ok(path)
            }
        }
    }
}

fn list_dir_files(root: &Path, dir: &Path, files: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            list_dir_files(root, &path, files)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}
