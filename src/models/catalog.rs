use crate::error::{PullError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Catalog shipped with the binary
const BUILTIN_CATALOG: &str = include_str!("catalog.json");

/// Where a model's files come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Bulk pull of a whole Hugging Face repository, converted after download
    Snapshot { repo_id: String },
    /// Plain per-file downloads, already in the final format
    Direct { urls: Vec<String> },
}

impl ModelSource {
    /// Channel name as written in the catalog
    #[must_use]
    pub const fn channel_name(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "HuggingFaceSnapshot",
            Self::Direct { .. } => "DirectDownload",
        }
    }
}

/// Resolved configuration for one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub name: String,
    pub aliases: Vec<String>,
    pub source: ModelSource,
}

/// Maps a user-supplied model identifier to its configuration
pub trait ConfigResolver {
    fn resolve(&self, model: &str) -> Result<ModelConfig>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DistributionPath {
    Single(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    aliases: Vec<String>,
    distribution_channel: String,
    distribution_path: DistributionPath,
}

impl CatalogEntry {
    fn to_config(&self, name: &str) -> Result<ModelConfig> {
        let source = match (self.distribution_channel.as_str(), &self.distribution_path) {
            ("HuggingFaceSnapshot", DistributionPath::Single(repo_id)) => {
                if repo_id.trim().is_empty() {
                    return Err(PullError::Config(format!(
                        "Model '{name}' has an empty repository id"
                    )));
                }
                ModelSource::Snapshot {
                    repo_id: repo_id.clone(),
                }
            }
            ("HuggingFaceSnapshot", DistributionPath::Many(_)) => {
                return Err(PullError::Config(format!(
                    "Model '{name}' uses HuggingFaceSnapshot but lists several paths; expected one repository id"
                )));
            }
            ("DirectDownload", path) => {
                let urls = match path {
                    DistributionPath::Single(url) => vec![url.clone()],
                    DistributionPath::Many(urls) => urls.clone(),
                };
                if urls.is_empty() || urls.iter().any(|u| u.trim().is_empty()) {
                    return Err(PullError::Config(format!(
                        "Model '{name}' has no download URLs"
                    )));
                }
                ModelSource::Direct { urls }
            }
            (other, _) => {
                return Err(PullError::Config(format!(
                    "Unknown distribution channel '{other}' for model '{name}'"
                )));
            }
        };

        Ok(ModelConfig {
            name: name.to_string(),
            aliases: self.aliases.clone(),
            source,
        })
    }
}

/// Model catalog keyed by canonical name
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl ModelCatalog {
    /// Catalog embedded in the binary
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Load a catalog from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content).map_err(|e| match e {
            PullError::Config(msg) => PullError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parse a catalog from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let entries: BTreeMap<String, CatalogEntry> = serde_json::from_str(content)
            .map_err(|e| PullError::Config(format!("Failed to parse model catalog: {e}")))?;
        Ok(Self { entries })
    }

    /// Canonical names in catalog order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Aliases for a canonical name
    #[must_use]
    pub fn aliases(&self, name: &str) -> &[String] {
        self.entries
            .get(name)
            .map(|e| e.aliases.as_slice())
            .unwrap_or_default()
    }

    /// Find the canonical name for a name or alias (case-insensitive)
    #[must_use]
    pub fn canonical_name(&self, model: &str) -> Option<&str> {
        let wanted = model.to_lowercase();
        self.entries
            .iter()
            .find(|(name, entry)| {
                name.to_lowercase() == wanted
                    || entry.aliases.iter().any(|a| a.to_lowercase() == wanted)
            })
            .map(|(name, _)| name.as_str())
    }

    /// Find closest name or alias using Levenshtein distance
    #[must_use]
    pub fn suggest(&self, model: &str) -> Option<&str> {
        if model.is_empty() {
            return None;
        }

        let wanted = model.to_lowercase();
        self.entries
            .iter()
            .flat_map(|(name, entry)| {
                std::iter::once(name.as_str()).chain(entry.aliases.iter().map(String::as_str))
            })
            .map(|candidate| (candidate, levenshtein_distance(&wanted, &candidate.to_lowercase())))
            .min_by_key(|(_, dist)| *dist)
            .filter(|(_, dist)| *dist <= 2) // Only suggest if within 2 edits
            .map(|(candidate, _)| candidate)
    }
}

impl ConfigResolver for ModelCatalog {
    fn resolve(&self, model: &str) -> Result<ModelConfig> {
        let Some(name) = self.canonical_name(model) else {
            let hint = self
                .suggest(model)
                .map(|s| format!("\n\nDid you mean '{s}'?"))
                .unwrap_or_default();
            return Err(PullError::NotFound(format!(
                "Unknown model '{model}'. Run 'modelpull list' to see available models.{hint}"
            )));
        };

        self.entries[name].to_config(name)
    }
}

/// Calculate Levenshtein distance between two strings
#[allow(clippy::needless_range_loop)]
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

    for i in 0..=len1 {
        matrix[i][0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    for (i, c1) in s1.chars().enumerate() {
        for (j, c2) in s2.chars().enumerate() {
            let cost = usize::from(c1 != c2);
            matrix[i + 1][j + 1] = (matrix[i][j + 1] + 1)
                .min(matrix[i + 1][j] + 1)
                .min(matrix[i][j] + cost);
        }
    }

    matrix[len1][len2]
}
