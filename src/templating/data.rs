//! Global data files.
//!
//! Every `.json`, `.yaml` or `.yml` file directly inside the data directory is
//! exposed to templates under its file stem: `_data/metadata.json` becomes
//! `metadata`. Templates read global data lazily and each top-level key they
//! read is recorded as a consumed data path.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::Data;

/// A global data file and the key it populates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    /// File the value was read from.
    pub path: PathBuf,
    /// Top-level key the value is exposed under.
    pub key: String,
}

/// Values loaded from the data directory.
#[derive(Debug, Clone)]
pub struct GlobalData {
    values: Value,
    sources: Vec<DataSource>,
}

impl Default for GlobalData {
    fn default() -> Self {
        Self::from_map(Data::new())
    }
}

impl GlobalData {
    /// Wrap already-loaded values.
    pub fn from_map(values: Data) -> Self {
        Self {
            values: Value::Object(values),
            sources: Vec::new(),
        }
    }

    /// Load every data file in `dir`. A missing directory yields no data.
    pub async fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            tracing::debug!("No data directory at {}", dir.display());
            return Ok(Self::default());
        }

        let mut files = Vec::new();
        let mut entries = fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read data directory {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() && data_format(&path).is_some() {
                files.push(path);
            }
        }
        files.sort();

        let mut values = Data::new();
        let mut sources = Vec::new();
        for path in files {
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if values.contains_key(&key) {
                tracing::warn!("Ignoring {}: data key '{}' is already defined", path.display(), key);
                continue;
            }

            let value = read_data_file(&path).await?;
            tracing::debug!("Loaded global data '{}' from {}", key, path.display());
            values.insert(key.clone(), value);
            sources.push(DataSource {
                path,
                key,
            });
        }

        Ok(Self {
            values: Value::Object(values),
            sources,
        })
    }

    /// All values as one JSON object.
    pub fn as_value(&self) -> &Value {
        &self.values
    }

    /// Value under a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Files the values came from, in load order.
    pub fn sources(&self) -> &[DataSource] {
        &self.sources
    }

    /// Whether no data was loaded.
    pub fn is_empty(&self) -> bool {
        self.values.as_object().is_none_or(|map| map.is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
enum DataFormat {
    Json,
    Yaml,
}

fn data_format(path: &Path) -> Option<DataFormat> {
    match path.extension()?.to_str()? {
        "json" => Some(DataFormat::Json),
        "yaml" | "yml" => Some(DataFormat::Yaml),
        _ => None,
    }
}

async fn read_data_file(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read data file {}", path.display()))?;

    match data_format(path) {
        Some(DataFormat::Yaml) => {
            let yaml: serde_yaml::Value = serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?;
            serde_json::to_value(yaml).with_context(|| format!("Unsupported YAML in {}", path.display()))
        }
        _ => serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display())),
    }
}
