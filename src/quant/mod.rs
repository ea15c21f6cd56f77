//! Quantization capability tables
//!
//! A capability document nests devices, model types, execution modes and the
//! quantization schemes each mode supports. [`flatten`] turns it into one
//! [`QuantRow`] per supported dtype so it can be filtered with [`select`].

use crate::error::{PullError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Selectable column names, in table order
pub const FIELDS: &[&str] = &[
    "device",
    "model_type",
    "execution_mode",
    "quant_scheme",
    "weight_dtype",
    "activation_dtype",
    "weight_group_size",
    "embedding_group_size",
];

#[derive(Debug, Clone, Deserialize)]
pub struct QuantDocument {
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub name: String,
    #[serde(default)]
    pub model_types: Vec<ModelType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelType {
    #[serde(rename = "type")]
    pub model_type: String,
    #[serde(default)]
    pub execution_modes: Vec<ExecutionMode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionMode {
    pub mode: String,
    pub quantization_options: QuantizationOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuantizationOptions {
    #[serde(default)]
    pub quant_schemes: Vec<QuantScheme>,
    #[serde(default)]
    pub embedding_quant_schemes: Vec<QuantScheme>,
    #[serde(default)]
    pub weight_group_sizes: Vec<u32>,
    #[serde(default)]
    pub embedding_group_sizes: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuantScheme {
    pub scheme: String,
    #[serde(default)]
    pub weight_dtypes: Vec<String>,
    // Some published documents misspell this key, some carry both spellings.
    #[serde(default, rename = "weight_dtipes")]
    pub misspelled_weight_dtypes: Vec<String>,
    #[serde(default)]
    pub activation_dtypes: Vec<String>,
}

impl QuantScheme {
    /// Weight dtypes under either spelling, first occurrence wins
    pub fn all_weight_dtypes(&self) -> impl Iterator<Item = &String> {
        let mut seen = Vec::new();
        self.weight_dtypes
            .iter()
            .chain(&self.misspelled_weight_dtypes)
            .filter(move |dtype| {
                if seen.contains(dtype) {
                    false
                } else {
                    seen.push(*dtype);
                    true
                }
            })
    }
}

/// One supported (device, model type, mode, scheme, dtype) combination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantRow {
    pub device: String,
    pub model_type: String,
    pub execution_mode: String,
    pub quant_scheme: String,
    pub weight_dtype: Option<String>,
    pub activation_dtype: Option<String>,
    pub weight_group_size: Option<u32>,
    pub embedding_group_size: Option<u32>,
}

impl QuantRow {
    /// String rendering of a column; `None` for an unknown column name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<String> {
        let value = match name {
            "device" => self.device.clone(),
            "model_type" => self.model_type.clone(),
            "execution_mode" => self.execution_mode.clone(),
            "quant_scheme" => self.quant_scheme.clone(),
            "weight_dtype" => self.weight_dtype.clone().unwrap_or_default(),
            "activation_dtype" => self.activation_dtype.clone().unwrap_or_default(),
            "weight_group_size" => self
                .weight_group_size
                .map(|v| v.to_string())
                .unwrap_or_default(),
            "embedding_group_size" => self
                .embedding_group_size
                .map(|v| v.to_string())
                .unwrap_or_default(),
            _ => return None,
        };
        Some(value)
    }

    /// All columns in [`FIELDS`] order
    #[must_use]
    pub fn values(&self) -> Vec<String> {
        FIELDS
            .iter()
            .map(|f| self.field(f).unwrap_or_default())
            .collect()
    }
}

impl QuantDocument {
    /// Load a capability document from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
            .map_err(|e| PullError::Quant(format!("{}: {e}", path.display())))
    }

    /// Parse a capability document from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| PullError::Quant(format!("Failed to parse quantization document: {e}")))
    }
}

/// Flatten a capability document into rows
#[must_use]
pub fn flatten(doc: &QuantDocument) -> Vec<QuantRow> {
    let mut rows = Vec::new();

    for device in &doc.devices {
        for model_type in &device.model_types {
            for mode in &model_type.execution_modes {
                let options = &mode.quantization_options;
                let row = |scheme: &str, weight: Option<&String>, activation: Option<&String>| {
                    QuantRow {
                        device: device.name.clone(),
                        model_type: model_type.model_type.clone(),
                        execution_mode: mode.mode.clone(),
                        quant_scheme: scheme.to_string(),
                        weight_dtype: weight.cloned(),
                        activation_dtype: activation.cloned(),
                        weight_group_size: options.weight_group_sizes.first().copied(),
                        embedding_group_size: options.embedding_group_sizes.first().copied(),
                    }
                };

                for scheme in &options.quant_schemes {
                    rows.extend(
                        scheme
                            .all_weight_dtypes()
                            .map(|dtype| row(&scheme.scheme, Some(dtype), None)),
                    );
                    rows.extend(
                        scheme
                            .activation_dtypes
                            .iter()
                            .map(|dtype| row(&scheme.scheme, None, Some(dtype))),
                    );
                }
                for scheme in &options.embedding_quant_schemes {
                    rows.extend(
                        scheme
                            .all_weight_dtypes()
                            .map(|dtype| row(&scheme.scheme, Some(dtype), None)),
                    );
                }
            }
        }
    }

    rows
}

/// Rows matching every `(field, value)` filter
pub fn select<'a>(rows: &'a [QuantRow], filters: &[(String, String)]) -> Result<Vec<&'a QuantRow>> {
    if let Some((field, _)) = filters.iter().find(|(f, _)| !FIELDS.contains(&f.as_str())) {
        return Err(PullError::Quant(format!(
            "Unknown field '{field}'. Expected one of: {}",
            FIELDS.join(", ")
        )));
    }

    Ok(rows
        .iter()
        .filter(|row| {
            filters
                .iter()
                .all(|(field, value)| row.field(field).as_deref() == Some(value.as_str()))
        })
        .collect())
}

/// Parse a `field=value` filter
pub fn parse_filter(filter: &str) -> Result<(String, String)> {
    filter
        .split_once('=')
        .map(|(f, v)| (f.trim().to_string(), v.trim().to_string()))
        .filter(|(f, _)| !f.is_empty())
        .ok_or_else(|| PullError::Quant(format!("Expected field=value, got '{filter}'")))
}
