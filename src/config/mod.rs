//! Site configuration.
//!
//! Configuration lives in `sitegraph.toml` at the root of the input directory.
//! Every section is optional; missing values fall back to the defaults shown
//! below, and unknown keys are rejected so typos surface as errors.
//!
//! ```toml
//! template_formats = ["md", "html", "tera"]
//! render_cache = false
//!
//! [dir]
//! includes = "_includes"
//! data = "_data"
//! output = "_site"
//!
//! [keys]
//! layout = "layout"
//! tags = "tags"
//! pagination = "pagination"
//! permalink = "permalink"
//!
//! [collections.recent]
//! tag = "post"
//! sort = "date"
//! reverse = true
//! limit = 5
//! ```
//!
//! The file location can be overridden with `--config` or the
//! `SITEGRAPH_CONFIG` environment variable; an explicitly named file must
//! exist.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::constants::CONFIG_FILE_NAME;
use crate::core::SiteError;

/// Top-level contents of `sitegraph.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Directory layout relative to the input directory.
    pub dir: DirConfig,

    /// Front-matter key names.
    pub keys: KeysConfig,

    /// File extensions treated as templates.
    pub template_formats: Vec<String>,

    /// Reuse rendered output within a run.
    pub render_cache: bool,

    /// Collections declared in configuration, by name.
    pub collections: BTreeMap<String, CollectionConfig>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            dir: DirConfig::default(),
            keys: KeysConfig::default(),
            template_formats: vec!["md".to_string(), "html".to_string(), "tera".to_string()],
            render_cache: false,
            collections: BTreeMap::new(),
        }
    }
}

/// Special directories inside the input directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirConfig {
    /// Layouts and partials.
    pub includes: String,
    /// Global data files.
    pub data: String,
    /// Build output; never scanned for templates.
    pub output: String,
}

impl Default for DirConfig {
    fn default() -> Self {
        Self {
            includes: "_includes".to_string(),
            data: "_data".to_string(),
            output: "_site".to_string(),
        }
    }
}

/// Names of the front-matter keys the build interprets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeysConfig {
    /// Names the layout wrapping a template.
    pub layout: String,
    /// Tag or list of tags placing a template into collections.
    pub tags: String,
    /// Pagination settings.
    pub pagination: String,
    /// Explicit output URL.
    pub permalink: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            layout: "layout".to_string(),
            tags: "tags".to_string(),
            pagination: "pagination".to_string(),
            permalink: "permalink".to_string(),
        }
    }
}

/// How a configured collection orders its members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionSort {
    /// Map order.
    #[default]
    Input,
    /// By date, then input path.
    Date,
}

/// A collection declared in `[collections.<name>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectionConfig {
    /// Keep only entries with this tag.
    pub tag: Option<String>,
    /// Keep only entries whose input path matches this glob.
    pub glob: Option<String>,
    /// Member ordering.
    pub sort: CollectionSort,
    /// Reverse the ordering.
    pub reverse: bool,
    /// Keep at most this many members (after sorting).
    pub limit: Option<usize>,
}

impl SiteConfig {
    /// Load configuration for the site rooted at `input_dir`.
    ///
    /// `explicit` names a config file that must exist. Without it,
    /// `<input_dir>/sitegraph.toml` is used when present and defaults otherwise.
    pub async fn load(input_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load_from(path).await?,
            None => {
                let path = input_dir.join(CONFIG_FILE_NAME);
                if path.exists() {
                    Self::load_from(&path).await?
                } else {
                    tracing::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, input_dir.display());
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        tracing::debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.template_formats.is_empty() {
            return Err(config_error("template_formats must name at least one extension"));
        }

        if let Some(bad) = self.template_formats.iter().find(|ext| ext.is_empty() || ext.starts_with('.')) {
            return Err(config_error(format!(
                "template format '{bad}' must be a bare extension such as \"md\""
            )));
        }

        for (name, collection) in &self.collections {
            if let Some(pattern) = &collection.glob {
                glob::Pattern::new(pattern).map_err(|e| {
                    config_error(format!("collection '{name}' has an invalid glob '{pattern}': {e}"))
                })?;
            }
        }

        Ok(())
    }

    /// Whether `path` has one of the configured template extensions.
    pub fn is_template_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.template_formats.iter().any(|format| format == ext))
    }

    /// Absolute locations of the special directories under `input_dir`.
    pub fn includes_dir(&self, input_dir: &Path) -> PathBuf {
        input_dir.join(&self.dir.includes)
    }

    /// See [`includes_dir`](Self::includes_dir).
    pub fn data_dir(&self, input_dir: &Path) -> PathBuf {
        input_dir.join(&self.dir.data)
    }

    /// See [`includes_dir`](Self::includes_dir).
    pub fn output_dir(&self, input_dir: &Path) -> PathBuf {
        input_dir.join(&self.dir.output)
    }
}

fn config_error(message: impl Into<String>) -> anyhow::Error {
    SiteError::ConfigError {
        message: message.into(),
    }
    .into()
}
