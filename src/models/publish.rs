use crate::config::Config;
use crate::error::{PullError, Result};
use crate::models::catalog::{ConfigResolver, ModelCatalog, ModelSource};
use crate::models::convert::{CommandConverter, Converter};
use crate::models::fetch::{compile_patterns, DirectFetcher, HttpTransport, SnapshotFetcher, Transport};
use crate::models::staging::{staging_path, StagingDir};
use glob::Pattern;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Downloads, converts and publishes models under a models root
pub struct Publisher {
    models_dir: PathBuf,
    resolver: Box<dyn ConfigResolver>,
    transport: Box<dyn Transport>,
    converter: Box<dyn Converter>,
    token: Option<String>,
    revision: String,
    ignore: Vec<Pattern>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("models_dir", &self.models_dir)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("revision", &self.revision)
            .field("ignore", &self.ignore)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Create a publisher from its collaborators
    #[must_use]
    pub fn new(
        models_dir: PathBuf,
        resolver: Box<dyn ConfigResolver>,
        transport: Box<dyn Transport>,
        converter: Box<dyn Converter>,
    ) -> Self {
        Self {
            models_dir,
            resolver,
            transport,
            converter,
            token: None,
            revision: "main".to_string(),
            ignore: Pattern::new("*safetensors*").into_iter().collect(),
        }
    }

    /// Create a publisher wired to the real hub and converter
    pub fn from_config(config: &Config, catalog: ModelCatalog, token: Option<String>) -> Result<Self> {
        let transport = HttpTransport::new(
            &config.hub_endpoint(),
            Duration::from_secs(config.hub.timeout_secs),
        )?
        .with_progress(config.hub.progress);
        let converter = CommandConverter::from_config(&config.converter)?;

        Ok(Self::new(
            config.models_dir()?,
            Box::new(catalog),
            Box::new(transport),
            Box::new(converter),
        )
        .with_token(token)
        .with_revision(&config.hub.revision)
        .with_ignore_patterns(&config.hub.ignore_patterns)?)
    }

    /// Set the hub credential used by snapshot downloads
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Set the hub revision snapshot downloads pull from
    #[must_use]
    pub fn with_revision(mut self, revision: &str) -> Self {
        self.revision = revision.to_string();
        self
    }

    /// Replace the glob patterns of repository files skipped by snapshot downloads
    pub fn with_ignore_patterns(mut self, patterns: &[String]) -> Result<Self> {
        self.ignore = compile_patterns(patterns)?;
        Ok(self)
    }

    #[must_use]
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Download `model`, convert it if needed, and publish it at its stable path.
    ///
    /// The stable directory is replaced only after download and conversion
    /// succeeded; on any error it is left as it was and the staging directory
    /// is removed.
    pub fn download_and_convert(&self, model: &str) -> Result<PathBuf> {
        let config = self.resolver.resolve(model)?;
        let model_dir = stable_path(&self.models_dir, &config.name)?;
        let staging = StagingDir::create(staging_path(&self.models_dir, &config.name))?;

        match &config.source {
            ModelSource::Snapshot { repo_id } => {
                println!("Downloading {} from HuggingFace...", config.name);
                SnapshotFetcher::new(
                    self.transport.as_ref(),
                    &self.revision,
                    self.token.as_deref(),
                    &self.ignore,
                )
                .fetch(repo_id, staging.path())?;

                println!("Converting {}...", config.name);
                self.converter.convert(staging.path(), &config.name, true)?;
            }
            ModelSource::Direct { urls } => {
                println!("Downloading {}...", config.name);
                DirectFetcher::new(self.transport.as_ref()).fetch(urls, staging.path())?;
            }
        }

        staging.commit(&model_dir)?;
        info!("Published {} at {}", config.name, model_dir.display());

        Ok(model_dir)
    }

    /// Check if a model is published and non-empty
    pub fn is_model_downloaded(&self, model: &str) -> Result<bool> {
        Ok(is_published(&self.model_dir(model)?))
    }

    /// Stable path for a model, whether or not it is downloaded
    pub fn model_dir(&self, model: &str) -> Result<PathBuf> {
        let config = self.resolver.resolve(model)?;
        stable_path(&self.models_dir, &config.name)
    }

    /// Remove a published model and any leftover staging directory.
    ///
    /// Returns whether a published model was removed.
    pub fn remove(&self, model: &str) -> Result<bool> {
        let config = self.resolver.resolve(model)?;
        let model_dir = stable_path(&self.models_dir, &config.name)?;

        let leftover = staging_path(&self.models_dir, &config.name);
        if leftover.is_dir() {
            fs::remove_dir_all(&leftover)?;
        }

        if !model_dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&model_dir)?;
        info!("Removed {}", model_dir.display());
        Ok(true)
    }
}

/// Stable path for a canonical model name
fn stable_path(models_dir: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let safe = !name.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(PullError::Config(format!("Invalid model name '{name}'")));
    }
    Ok(models_dir.join(relative))
}

/// Whether `model_dir` exists and has at least one entry
#[must_use]
pub fn is_published(model_dir: &Path) -> bool {
    fs::read_dir(model_dir).is_ok_and(|mut entries| entries.next().is_some())
}

/// Check if `model` is published under `models_dir`
pub fn is_model_downloaded(
    resolver: &dyn ConfigResolver,
    model: &str,
    models_dir: &Path,
) -> Result<bool> {
    let config = resolver.resolve(model)?;
    Ok(is_published(&stable_path(models_dir, &config.name)?))
}

/// Download status of a catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStatus {
    pub name: String,
    pub aliases: Vec<String>,
    pub downloaded: bool,
    pub size_bytes: Option<u64>,
}

/// Status of every model in the catalog
pub fn list_models(catalog: &ModelCatalog, models_dir: &Path) -> Result<Vec<ModelStatus>> {
    catalog
        .names()
        .into_iter()
        .map(|name| {
            let model_dir = stable_path(models_dir, name)?;
            let downloaded = is_published(&model_dir);
            Ok(ModelStatus {
                name: name.to_string(),
                aliases: catalog.aliases(name).to_vec(),
                downloaded,
                size_bytes: downloaded.then(|| dir_size(&model_dir)),
            })
        })
        .collect()
}

/// Total size of the regular files below `path`
#[must_use]
pub fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };

    entries
        .flatten()
        .map(|entry| match entry.metadata() {
            Ok(meta) if meta.is_dir() => dir_size(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}

/// Format bytes as human-readable string
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
