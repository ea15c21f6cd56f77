use crate::error::{PullError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Config {
    /// Root directory models are published under
    pub models_dir: Option<PathBuf>,
    /// JSON catalog replacing the built-in one
    pub catalog: Option<PathBuf>,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HubConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_revision")]
    pub revision: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub progress: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ConverterConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_remove_patterns")]
    pub remove_patterns: Vec<String>,
}

// Default value functions
fn default_endpoint() -> String {
    "https://huggingface.co".to_string()
}
fn default_revision() -> String {
    "main".to_string()
}
fn default_token_env() -> String {
    "HF_TOKEN".to_string()
}
fn default_ignore_patterns() -> Vec<String> {
    vec!["*safetensors*".to_string()]
}
fn default_timeout_secs() -> u64 {
    3600
}
fn default_true() -> bool {
    true
}
fn default_program() -> String {
    "python3".to_string()
}
fn default_args() -> Vec<String> {
    [
        "build/convert_hf_checkpoint.py",
        "--checkpoint-dir",
        "{model_dir}",
        "--model-name",
        "{model_name}",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}
fn default_remove_patterns() -> Vec<String> {
    vec![
        "pytorch_model*.bin".to_string(),
        "pytorch_model.bin.index.json".to_string(),
    ]
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            revision: default_revision(),
            token_env: default_token_env(),
            ignore_patterns: default_ignore_patterns(),
            timeout_secs: default_timeout_secs(),
            progress: default_true(),
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            remove_patterns: default_remove_patterns(),
        }
    }
}

impl Config {
    /// Load config from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load config from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            PullError::Config(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Resolved models root directory
    pub fn models_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.models_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| PullError::Config("Cannot determine data directory".to_string()))?;
        Ok(data_dir.join("modelpull").join("models"))
    }

    /// Hub endpoint, with `HF_ENDPOINT` taking precedence
    #[must_use]
    pub fn hub_endpoint(&self) -> String {
        std::env::var("HF_ENDPOINT")
            .ok()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| self.hub.endpoint.clone())
            .trim_end_matches('/')
            .to_string()
    }

    /// Resolve the hub token: explicit value, then the configured env var,
    /// then the token cached by `huggingface-cli login`
    #[must_use]
    pub fn hub_token(&self, explicit: Option<String>) -> Option<String> {
        explicit
            .filter(|t| !t.is_empty())
            .or_else(|| {
                std::env::var(&self.hub.token_env)
                    .ok()
                    .filter(|t| !t.is_empty())
            })
            .or_else(|| hf_hub::Cache::default().token())
    }
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    let config_dir = if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config)
    } else {
        let home = std::env::var("HOME")
            .map_err(|_| PullError::Config("HOME env var not set".to_string()))?;
        PathBuf::from(home).join(".config")
    };

    Ok(config_dir.join("modelpull").join("config.toml"))
}
