//! Template engines.
//!
//! An [`Engine`] turns template source into a reusable [`RenderFn`]. The
//! bundled [`TeraEngine`] makes every file in the includes directory available
//! as a partial, named by its path relative to that directory without the
//! extension (`_includes/partials/nav.tera` is `partials/nav`).

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tera::{Context as TeraContext, Tera};
use walkdir::WalkDir;

use super::{Data, RenderFn};
use crate::constants::COMPILED_TEMPLATE_NAME;
use crate::core::SiteError;

/// Compiles template source.
pub trait Engine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Compile `source`, read from `path`, into a render function.
    fn compile(&self, source: &str, path: &str) -> Result<RenderFn>;

    /// Compile and render in one step.
    fn render(&self, source: &str, path: &str, data: &Data) -> Result<String> {
        (self.compile(source, path)?)(data)
    }
}

/// Tera-backed engine with partials from the includes directory.
pub struct TeraEngine {
    includes_dir: Option<PathBuf>,
    extensions: Vec<String>,
    partials: OnceLock<BTreeMap<String, String>>,
}

impl TeraEngine {
    /// Engine whose partials are the files in `includes_dir` with one of
    /// `extensions`.
    pub fn new(includes_dir: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            includes_dir: Some(includes_dir.into()),
            extensions,
            partials: OnceLock::new(),
        }
    }

    /// Engine without partials.
    pub fn standalone() -> Self {
        Self {
            includes_dir: None,
            extensions: Vec::new(),
            partials: OnceLock::new(),
        }
    }

    /// Partial sources by name, discovered on first use.
    pub fn partials(&self) -> Result<&BTreeMap<String, String>> {
        if let Some(partials) = self.partials.get() {
            return Ok(partials);
        }

        let discovered = match &self.includes_dir {
            Some(dir) => discover_partials(dir, &self.extensions)?,
            None => BTreeMap::new(),
        };
        tracing::debug!("Cached {} partials", discovered.len());
        Ok(self.partials.get_or_init(|| discovered))
    }

    fn tera_with_partials(&self) -> Result<Tera> {
        let mut tera = Tera::default();
        let partials = self.partials()?;
        tera.add_raw_templates(partials.iter().map(|(name, source)| (name.as_str(), source.as_str())))
            .map_err(|e| SiteError::RenderFailed {
                path: self
                    .includes_dir
                    .as_deref()
                    .map_or_else(String::new, |dir| dir.display().to_string()),
                reason: format_tera_error(&e),
            })?;
        Ok(tera)
    }
}

impl Engine for TeraEngine {
    fn name(&self) -> &str {
        "tera"
    }

    fn compile(&self, source: &str, path: &str) -> Result<RenderFn> {
        let mut tera = self.tera_with_partials()?;
        tera.add_raw_template(COMPILED_TEMPLATE_NAME, source).map_err(|e| SiteError::RenderFailed {
            path: path.to_string(),
            reason: format_tera_error(&e),
        })?;

        let tera = Arc::new(tera);
        let path = path.to_string();
        Ok(Arc::new(move |data: &Data| -> Result<String> {
            let context = TeraContext::from_serialize(data)
                .with_context(|| format!("Failed to build render context for {path}"))?;
            tera.render(COMPILED_TEMPLATE_NAME, &context).map_err(|e| {
                SiteError::RenderFailed {
                    path: path.clone(),
                    reason: format_tera_error(&e),
                }
                .into()
            })
        }))
    }
}

fn discover_partials(dir: &Path, extensions: &[String]) -> Result<BTreeMap<String, String>> {
    let mut partials = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(partials);
    }

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to scan {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !extensions.iter().any(|allowed| allowed == ext) {
            continue;
        }

        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let name = relative.with_extension("").to_string_lossy().replace('\\', "/");
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read partial {}", path.display()))?;
        partials.insert(name, source);
    }

    Ok(partials)
}

/// Flatten a Tera error chain into one readable message.
pub fn format_tera_error(error: &tera::Error) -> String {
    use std::error::Error;

    let mut messages = vec![error.to_string()];
    let mut current: Option<&dyn Error> = error.source();
    while let Some(err) = current {
        messages.push(err.to_string());
        current = err.source();
    }

    let quoted = format!("'{COMPILED_TEMPLATE_NAME}'");
    let cleaned: Vec<String> = messages
        .into_iter()
        .map(|msg| msg.replace(&quoted, "template").trim().to_string())
        .filter(|msg| !msg.is_empty())
        .collect();

    if cleaned.is_empty() {
        "Template syntax error".to_string()
    } else {
        cleaned.join("\n  → ")
    }
}
