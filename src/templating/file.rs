//! Templates backed by files in the input directory.
//!
//! A [`FileTemplate`] is one file with optional YAML front matter and a Tera
//! body. Its data is the merged data of its layout chain overlaid with its own
//! front matter. Global data is not merged in: the body's references are
//! scanned once at load time, and at render time only the global keys the body
//! and its layouts actually name are read, each read being reported as a
//! consumed data path.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::engine::Engine;
use super::frontmatter::FrontMatterParser;
use super::{Data, MappedTemplate, RenderFn, SecondaryMapEntry, Template, TertiaryMapEntry};
use crate::constants::COLLECTIONS_KEY;
use crate::core::SiteError;
use crate::graph::proxy::{DataProxy, resolve_path};
use crate::layout::{LayoutLoader, TemplateLayout};
use crate::map::{CollectionsView, Page};
use crate::site::SiteContext;

/// Date formats accepted in front matter, most specific first.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// The `pagination` front-matter object.
#[derive(Debug, Clone, Deserialize)]
struct Pagination {
    data: String,
    #[serde(default = "default_page_size")]
    size: usize,
    alias: Option<String>,
}

fn default_page_size() -> usize {
    1
}

/// A template read from disk.
pub struct FileTemplate {
    input_path: String,
    relative_path: PathBuf,
    context: Arc<SiteContext>,
    front_matter: Data,
    body: String,
    references: Vec<String>,
    layout: Option<TemplateLayout<LayoutLoader>>,
    layout_references: OnceCell<Vec<String>>,
    data: OnceCell<Data>,
    compiled: OnceCell<RenderFn>,
}

impl FileTemplate {
    /// Read and parse `path`, which must lie inside the site's input directory.
    pub async fn load(context: Arc<SiteContext>, path: &Path) -> Result<Self> {
        let relative_path = path
            .strip_prefix(&context.input_dir)
            .with_context(|| format!("{} is outside {}", path.display(), context.input_dir.display()))?
            .to_path_buf();
        let input_path = format!("./{}", relative_path.to_string_lossy().replace('\\', "/"));

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        let parsed = FrontMatterParser::new().parse(&content, &input_path)?;
        let references = extract_references(&parsed.body)?;

        let layout_key = &context.config.keys.layout;
        let layout = parsed.data.get(layout_key).and_then(Value::as_str).map(|key| {
            TemplateLayout::new(key, input_path.as_str(), layout_key.as_str(), Arc::clone(&context.layouts))
        });

        tracing::trace!("Loaded {} ({} references)", input_path, references.len());
        Ok(Self {
            input_path,
            relative_path,
            context,
            front_matter: parsed.data,
            body: parsed.body,
            references,
            layout,
            layout_references: OnceCell::new(),
            data: OnceCell::new(),
            compiled: OnceCell::new(),
        })
    }

    /// Dotted names referenced from the body's tags, in order of appearance.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Dotted names referenced from the layout chain's bodies.
    pub async fn layout_references(&self) -> Result<&[String]> {
        let references = self
            .layout_references
            .get_or_try_init(|| async {
                let mut references: Vec<String> = Vec::new();
                if let Some(layout) = &self.layout {
                    for record in layout.get_layout_chain().await? {
                        for reference in extract_references(&record.source)? {
                            if !references.contains(&reference) {
                                references.push(reference);
                            }
                        }
                    }
                }
                Ok::<_, anyhow::Error>(references)
            })
            .await?;
        Ok(references)
    }

    /// The template's own front matter.
    pub fn front_matter(&self) -> &Data {
        &self.front_matter
    }

    /// Wrap already rendered page content in the layout chain.
    ///
    /// Layouts see global data, the template's data and the page's data, in
    /// increasing precedence, plus every collection under `collections`.
    pub async fn render_page(
        &self,
        page: &Page,
        content: &str,
        collections: &CollectionsView<'_, Self>,
    ) -> Result<String> {
        let Some(layout) = &self.layout else {
            return Ok(content.to_string());
        };

        let mut data = self.context.globals.as_value().as_object().cloned().unwrap_or_default();
        data.extend(self.get_data().await?);
        data.extend(page.data.clone());

        let mut all = Data::new();
        for name in collections.names() {
            if let Some(members) = collections.get(name) {
                all.insert(name.to_string(), Value::Array(members.iter().map(|entry| entry.to_json()).collect()));
            }
        }
        data.insert(COLLECTIONS_KEY.to_string(), Value::Object(all));
        data.insert("page".to_string(), self.page_object(page).await?);
        layout.render(&data, content).await
    }

    async fn page_object(&self, page: &Page) -> Result<Value> {
        let secondary = self.get_secondary_map_entry(page).await?;
        Ok(json!({
            "inputPath": self.input_path,
            "url": secondary.url,
            "outputPath": secondary.output_path.display().to_string(),
        }))
    }

    fn pagination(&self, data: &Data) -> Result<Option<Pagination>> {
        let Some(value) = data.get(&self.context.config.keys.pagination) else {
            return Ok(None);
        };
        let pagination = serde_json::from_value(value.clone())
            .with_context(|| format!("Invalid pagination in {}", self.input_path))?;
        Ok(Some(pagination))
    }

    /// Items named by `pagination.data`.
    fn pagination_items(&self, path: &str, data: &Data, collections: &CollectionsView<'_, Self>) -> Result<Vec<Value>> {
        if let Some(name) = path.strip_prefix(COLLECTIONS_KEY).and_then(|rest| rest.strip_prefix('.')) {
            let members = collections.get(name).ok_or_else(|| SiteError::UnresolvedTarget {
                path: path.to_string(),
            })?;
            return Ok(members.iter().map(|entry| entry.to_json()).collect());
        }

        let mut root = self.context.globals.as_value().as_object().cloned().unwrap_or_default();
        root.extend(data.clone());
        let root = Value::Object(root);
        let target = resolve_path(&root, path).ok_or_else(|| SiteError::UnresolvedTarget {
            path: path.to_string(),
        })?;

        Ok(match target {
            Value::Array(items) => items.clone(),
            Value::Object(map) => map.keys().map(|key| Value::String(key.clone())).collect(),
            other => vec![other.clone()],
        })
    }

    fn default_url(&self, page: &Page) -> String {
        let without_ext = self.relative_path.with_extension("");
        let mut dir = without_ext.to_string_lossy().replace('\\', "/");
        if without_ext.file_name().is_some_and(|name| name == "index") {
            dir = without_ext
                .parent()
                .map(|parent| parent.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
        }

        let mut url = if dir.is_empty() { "/".to_string() } else { format!("/{dir}/") };
        if page.index > 0 {
            url.push_str(&format!("{}/", page.index));
        }
        url
    }
}

impl Template for FileTemplate {
    fn input_path(&self) -> &str {
        &self.input_path
    }

    async fn get_data(&self) -> Result<Data> {
        let data = self
            .data
            .get_or_try_init(|| async {
                let mut data = match &self.layout {
                    Some(layout) => layout.get_data().await?.clone(),
                    None => Data::new(),
                };
                data.extend(self.front_matter.clone());
                Ok::<Data, anyhow::Error>(data)
            })
            .await?;
        Ok(data.clone())
    }

    async fn get_layout_chain(&self) -> Result<Vec<String>> {
        match &self.layout {
            Some(layout) => Ok(layout.get_layout_chain().await?.iter().map(|r| r.path.clone()).collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn get_mapped(&self) -> Result<MappedTemplate> {
        let data = self.get_data().await?;
        let date = data.get("date").and_then(Value::as_str).and_then(parse_date);
        Ok(MappedTemplate {
            input_path: self.input_path.clone(),
            data,
            date,
        })
    }

    async fn get_templates(&self, data: &Data, collections: &CollectionsView<'_, Self>) -> Result<Vec<Page>> {
        let Some(pagination) = self.pagination(data)? else {
            return Ok(vec![Page::single()]);
        };

        let items = self.pagination_items(&pagination.data, data, collections)?;
        let size = pagination.size.max(1);
        let chunks: Vec<&[Value]> = items.chunks(size).collect();
        let total = chunks.len();

        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut page_data = Data::new();
                page_data.insert(
                    "pagination".to_string(),
                    json!({ "items": chunk, "pageNumber": index, "size": size, "pages": total }),
                );
                if let Some(alias) = &pagination.alias {
                    let value = if size == 1 { chunk[0].clone() } else { Value::Array(chunk.to_vec()) };
                    page_data.insert(alias.clone(), value);
                }
                Page::new(index, page_data)
            })
            .collect())
    }

    async fn get_secondary_map_entry(&self, page: &Page) -> Result<SecondaryMapEntry> {
        let data = self.get_data().await?;
        let output_dir = self.context.config.output_dir(&self.context.input_dir);

        let url = match data.get(&self.context.config.keys.permalink).and_then(Value::as_str) {
            Some(permalink) => {
                let mut context = data.clone();
                context.extend(page.data.clone());
                let rendered = self.context.engine.render(permalink, &self.input_path, &context)?;
                let rendered = rendered.trim();
                if rendered.starts_with('/') { rendered.to_string() } else { format!("/{rendered}") }
            }
            None => self.default_url(page),
        };

        let relative = url.trim_start_matches('/');
        let output_path = if url.ends_with('/') {
            output_dir.join(relative).join("index.html")
        } else {
            output_dir.join(relative)
        };
        Ok(SecondaryMapEntry {
            url,
            output_path,
        })
    }

    async fn get_tertiary_map_entry(
        &self,
        page: &Page,
        collections: &CollectionsView<'_, Self>,
    ) -> Result<TertiaryMapEntry> {
        let mut data = self.get_data().await?;
        data.extend(page.data.clone());

        // pagination items arrive through the page data, read untracked in phase 5
        let mut collection_data = Data::new();
        for reference in &self.references {
            let Some(name) = collection_name(reference) else {
                continue;
            };
            if collection_data.contains_key(name) {
                continue;
            }
            if let Some(members) = collections.get(name) {
                let members = members.iter().map(|entry| entry.to_json()).collect();
                collection_data.insert(name.to_string(), Value::Array(members));
            }
        }

        let layout_references = self.layout_references().await?;
        let consumed: RefCell<Vec<String>> = RefCell::new(Vec::new());
        {
            let globals = DataProxy::new(self.context.globals.as_value(), "", true, |key: &str| {
                let mut consumed = consumed.borrow_mut();
                if !consumed.iter().any(|k| k == key) {
                    consumed.push(key.to_string());
                }
            })?;
            for reference in self.references.iter().chain(layout_references) {
                let root = reference.split('.').next().unwrap_or(reference);
                if root == COLLECTIONS_KEY || data.contains_key(root) {
                    continue;
                }
                if let Some(value) = globals.get(root) {
                    data.insert(root.to_string(), value.clone());
                }
            }
        }

        data.insert(COLLECTIONS_KEY.to_string(), Value::Object(collection_data));
        data.insert("page".to_string(), self.page_object(page).await?);

        let template_content = self.render(&data).await?;
        Ok(TertiaryMapEntry {
            template_content,
            consumed: consumed.into_inner(),
        })
    }

    fn compile(&self, source: &str) -> Result<RenderFn> {
        self.context.engine.compile(source, &self.input_path)
    }

    async fn render(&self, data: &Data) -> Result<String> {
        let render = self
            .compiled
            .get_or_try_init(|| async { self.compile(&self.body) })
            .await?;
        render(data)
    }
}

/// Collection named by a `collections.<name>...` reference.
fn collection_name(reference: &str) -> Option<&str> {
    let rest = reference.strip_prefix(COLLECTIONS_KEY)?.strip_prefix('.')?;
    rest.split('.').next().filter(|name| !name.is_empty())
}

/// Tera words that are never variables.
const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "elif", "else", "endif", "for", "endfor", "set", "set_global",
    "include", "import", "extends", "block", "endblock", "macro", "endmacro", "filter", "endfilter", "raw",
    "endraw", "as", "ignore", "missing", "break", "continue", "loop", "super", "self", "true", "false", "True",
    "False",
];

/// Dotted variable names used inside `{{ }}` and `{% %}` tags.
///
/// String literals are dropped first so include names and quoted text are not
/// mistaken for variables. Filter, test and function names, keyword arguments,
/// and anything rooted at a name bound by `for` or `set` in the same body are
/// skipped. Names inside branches that never run are still returned.
pub fn extract_references(body: &str) -> Result<Vec<String>> {
    let tag = Regex::new(r"(?s)\{\{(.*?)\}\}|\{%(.*?)%\}")?;
    let literal = Regex::new(r#""[^"]*"|'[^']*'"#)?;
    let identifier = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*")?;
    let binding = Regex::new(
        r"^[-\s]*(?:for\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s*,\s*([A-Za-z_][A-Za-z0-9_]*))?\s+in\b|set(?:_global)?\s+([A-Za-z_][A-Za-z0-9_]*)\s*=)",
    )?;

    let tags: Vec<String> = tag
        .captures_iter(body)
        .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|inner| literal.replace_all(inner.as_str(), " ").into_owned())
        .collect();

    let mut bound: Vec<&str> = Vec::new();
    for inner in &tags {
        if let Some(captures) = binding.captures(inner) {
            bound.extend(captures.iter().skip(1).flatten().map(|m| m.as_str()));
        }
    }

    let mut references: Vec<String> = Vec::new();
    for inner in &tags {
        for found in identifier.find_iter(inner) {
            let before = inner[..found.start()].trim_end();
            let after = inner[found.end()..].trim_start();
            let filter_or_test = before.ends_with('|') || before.ends_with(" is") || before == "is";
            let call_or_argument = after.starts_with('(') || (after.starts_with('=') && !after.starts_with("=="));
            if filter_or_test || call_or_argument {
                continue;
            }

            let reference = found.as_str();
            let root = reference.split('.').next().unwrap_or(reference);
            if KEYWORDS.contains(&root) || bound.contains(&root) {
                continue;
            }
            if !references.iter().any(|r| r == reference) {
                references.push(reference.to_string());
            }
        }
    }
    Ok(references)
}

/// Parse a front-matter date: a full timestamp or a bare day.
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
}
