//! File-backed layout resolution.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use strsim::levenshtein;
use walkdir::WalkDir;

use super::{LayoutRecord, LayoutSource};
use crate::core::SiteError;
use crate::templating::RenderFn;
use crate::templating::engine::{Engine, TeraEngine};
use crate::templating::frontmatter::FrontMatterParser;

/// Percentage of the key length two names may differ by and still be suggested.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// Maps layout keys to files in the includes directory.
///
/// A key naming an existing file is used as is; otherwise each template
/// extension is tried in order, so `base` finds `base.tera` when no file is
/// literally called `base`.
#[derive(Debug, Clone)]
pub struct LayoutPathResolver {
    input_dir: PathBuf,
    includes_dir: PathBuf,
    extensions: Vec<String>,
}

impl LayoutPathResolver {
    /// Resolver for `<input_dir>/<includes>`.
    pub fn new(input_dir: impl Into<PathBuf>, includes: &str, extensions: Vec<String>) -> Self {
        let input_dir = input_dir.into();
        Self {
            includes_dir: input_dir.join(includes),
            input_dir,
            extensions,
        }
    }

    /// The includes directory.
    pub fn includes_dir(&self) -> &Path {
        &self.includes_dir
    }

    /// The file backing `key`, if any.
    pub fn resolve(&self, key: &str) -> Option<PathBuf> {
        let exact = self.includes_dir.join(key);
        if exact.is_file() {
            return Some(exact);
        }

        self.extensions
            .iter()
            .map(|ext| self.includes_dir.join(format!("{key}.{ext}")))
            .find(|candidate| candidate.is_file())
    }

    /// Node key for a layout file: its path relative to the input directory.
    pub fn display_key(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.input_dir).unwrap_or(path);
        format!("./{}", relative.to_string_lossy().replace('\\', "/"))
    }

    /// Every layout key that would resolve, with extensions.
    pub fn known_layouts(&self) -> Vec<String> {
        WalkDir::new(&self.includes_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.includes_dir).ok()?;
                let ext = relative.extension()?.to_str()?;
                self.extensions
                    .iter()
                    .any(|allowed| allowed == ext)
                    .then(|| relative.to_string_lossy().replace('\\', "/"))
            })
            .collect()
    }

    /// The known layout closest to `key`, if one is close enough.
    pub fn suggest(&self, key: &str) -> Option<String> {
        self.known_layouts()
            .into_iter()
            .map(|name| {
                let stem = name.rsplit_once('.').map_or(name.as_str(), |(stem, _)| stem);
                let distance = levenshtein(key, &name).min(levenshtein(key, stem));
                (name, distance)
            })
            .filter(|(_, distance)| *distance <= key.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
            .min_by_key(|(_, distance)| *distance)
            .map(|(name, _)| name)
    }
}

/// [`LayoutSource`] reading layouts from disk.
///
/// Records are cached by key until [`LayoutSource::forget`] drops them, so
/// layouts shared by many templates are read once.
pub struct LayoutLoader {
    resolver: LayoutPathResolver,
    engine: Arc<TeraEngine>,
    parser: FrontMatterParser,
    records: Mutex<HashMap<String, LayoutRecord>>,
}

impl LayoutLoader {
    /// Loader resolving through `resolver` and compiling with `engine`.
    pub fn new(resolver: LayoutPathResolver, engine: Arc<TeraEngine>) -> Self {
        Self {
            resolver,
            engine,
            parser: FrontMatterParser::new(),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// The path resolver in use.
    pub fn resolver(&self) -> &LayoutPathResolver {
        &self.resolver
    }

    fn cached(&self, key: &str) -> Option<LayoutRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }
}

impl LayoutSource for LayoutLoader {
    async fn load_layout(&self, key: &str, referrer: &str) -> Result<LayoutRecord> {
        if let Some(record) = self.cached(key) {
            return Ok(record);
        }

        let Some(path) = self.resolver.resolve(key) else {
            return Err(SiteError::LayoutNotFound {
                layout: key.to_string(),
                template: referrer.to_string(),
                suggestion: self.resolver.suggest(key),
            }
            .into());
        };

        let display = self.resolver.display_key(&path);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read layout {}", path.display()))?;
        let parsed = self.parser.parse(&content, &display)?;

        let record = LayoutRecord {
            key: key.to_string(),
            path: display,
            front_matter: parsed.data,
            source: parsed.body,
        };
        tracing::trace!("Loaded layout '{}' from {}", key, record.path);

        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), record.clone());
        Ok(record)
    }

    fn compile(&self, record: &LayoutRecord) -> Result<RenderFn> {
        self.engine.compile(&record.source, &record.path)
    }

    fn forget(&self, key: &str) {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
    }
}
