use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory under the models root that holds in-progress downloads
pub const STAGING_DIR_NAME: &str = ".downloads";

/// Staging path for a model under `models_dir`
#[must_use]
pub fn staging_path(models_dir: &Path, model_name: &str) -> PathBuf {
    models_dir.join(STAGING_DIR_NAME).join(model_name)
}

/// Private working directory for one publish attempt
///
/// The directory is removed when the guard is dropped unless it was committed,
/// so every early return or `?` leaves nothing behind.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    /// Create a fresh, empty staging directory at `path`, discarding any
    /// leftover from an interrupted attempt
    pub fn create(path: PathBuf) -> Result<Self> {
        if path.exists() {
            info!("Discarding stale staging directory {}", path.display());
            remove_path(&path)?;
        }
        fs::create_dir_all(&path)?;
        debug!("Created staging directory {}", path.display());

        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the staged contents to `stable`, replacing whatever is there.
    ///
    /// The old stable directory is deleted only now, after the new one is
    /// complete. The final step is a single `rename`, which requires both
    /// paths to be on the same filesystem.
    pub fn commit(self, stable: &Path) -> Result<()> {
        if stable.exists() {
            info!("Replacing existing {}", stable.display());
            remove_path(stable)?;
        }
        if let Some(parent) = stable.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::rename(&self.path, stable)?;
        debug!("Committed {} -> {}", self.path.display(), stable.display());
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(
                "Failed to remove staging directory {}: {e}",
                self.path.display()
            );
        }
    }
}

fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}
