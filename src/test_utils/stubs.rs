//! In-memory templates and layouts.

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::SiteError;
use crate::layout::{LayoutRecord, LayoutSource};
use crate::map::{CollectionsView, Page};
use crate::templating::{
    Data, MappedTemplate, RenderFn, SecondaryMapEntry, Template, TertiaryMapEntry,
};

/// The object inside `value`, or an empty map for anything else.
pub fn object(value: Value) -> Data {
    match value {
        Value::Object(map) => map,
        _ => Data::new(),
    }
}

/// Replace `{{ key }}` with the string or number under `key`.
pub fn fill(source: &str, data: &Data) -> String {
    let mut out = source.to_string();
    for (key, value) in data {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        out = out.replace(&format!("{{{{ {key} }}}}"), &text);
    }
    out
}

/// A template defined entirely in memory.
///
/// Its content is its body followed by one `[name:member,member]` block per
/// collection it reads, so tests can see exactly what a read returned.
#[derive(Debug, Clone)]
pub struct StubTemplate {
    input_path: String,
    data: Data,
    layouts: Vec<String>,
    reads: Vec<String>,
    page_count: usize,
    body: String,
}

impl StubTemplate {
    /// Template with no data and an empty body.
    pub fn new(input_path: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            data: Data::new(),
            layouts: Vec::new(),
            reads: Vec::new(),
            page_count: 1,
            body: String::new(),
        }
    }

    /// Merge `data` (an object) into the template's data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data.extend(object(data));
        self
    }

    /// Set the `tags` list.
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.data.insert("tags".to_string(), json!(tags));
        self
    }

    /// Set the layout chain, innermost first, and the `layout` key.
    pub fn with_layouts(mut self, chain: &[&str]) -> Self {
        if let Some(first) = chain.first() {
            self.data.insert("layout".to_string(), json!(first));
        }
        self.layouts = chain.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Read these collections while rendering.
    pub fn reading(mut self, collections: &[&str]) -> Self {
        self.reads = collections.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Produce `pages` pages.
    pub fn paginated(mut self, pages: usize) -> Self {
        self.data.insert("pagination".to_string(), json!({ "size": 1 }));
        self.page_count = pages;
        self
    }

    /// Paginate over the members of `collection`, one page each.
    pub fn paginating_over(mut self, collection: &str) -> Self {
        self.data
            .insert("pagination".to_string(), json!({ "data": format!("collections.{collection}"), "size": 1 }));
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Wrap in an [`Arc`] for [`TemplateMap::add_template`](crate::map::TemplateMap::add_template).
    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn slug(&self) -> String {
        let path = self.input_path.trim_start_matches("./");
        path.rsplit_once('.').map_or(path, |(stem, _)| stem).to_string()
    }
}

impl Template for StubTemplate {
    fn input_path(&self) -> &str {
        &self.input_path
    }

    async fn get_data(&self) -> Result<Data> {
        Ok(self.data.clone())
    }

    async fn get_layout_chain(&self) -> Result<Vec<String>> {
        Ok(self.layouts.clone())
    }

    async fn get_mapped(&self) -> Result<MappedTemplate> {
        let date = self
            .data
            .get("date")
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0));

        Ok(MappedTemplate {
            input_path: self.input_path.clone(),
            data: self.get_data().await?,
            date,
        })
    }

    async fn get_templates(&self, data: &Data, collections: &CollectionsView<'_, Self>) -> Result<Vec<Page>> {
        let Some(pagination) = data.get("pagination") else {
            return Ok(vec![Page::single()]);
        };

        let count = match pagination.get("data").and_then(Value::as_str) {
            Some(path) => {
                let name = path.strip_prefix("collections.").unwrap_or(path);
                collections
                    .get(name)
                    .ok_or_else(|| SiteError::UnresolvedTarget {
                        path: path.to_string(),
                    })?
                    .len()
            }
            None => self.page_count,
        };

        Ok((0..count).map(|i| Page::new(i, object(json!({ "pageNumber": i })))).collect())
    }

    async fn get_secondary_map_entry(&self, page: &Page) -> Result<SecondaryMapEntry> {
        let slug = self.slug();
        let (url, output_path) = if page.index == 0 {
            (format!("/{slug}/"), PathBuf::from("_site").join(&slug).join("index.html"))
        } else {
            (
                format!("/{slug}/{}/", page.index),
                PathBuf::from("_site").join(&slug).join(page.index.to_string()).join("index.html"),
            )
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
        let mut content = fill(&self.body, &page.data);
        for name in &self.reads {
            if let Some(members) = collections.get(name) {
                let paths: Vec<&str> = members.iter().map(|m| m.input_path.as_str()).collect();
                content.push_str(&format!("[{name}:{}]", paths.join(",")));
            }
        }
        Ok(TertiaryMapEntry {
            template_content: content,
            consumed: Vec::new(),
        })
    }

    fn compile(&self, source: &str) -> Result<RenderFn> {
        let source = source.to_string();
        Ok(Arc::new(move |data: &Data| -> Result<String> { Ok(fill(&source, data)) }))
    }

    async fn render(&self, data: &Data) -> Result<String> {
        (self.compile(&self.body)?)(data)
    }
}

/// Layouts defined in memory, counting loads.
#[derive(Debug, Default)]
pub struct StubLayouts {
    layouts: HashMap<String, (Data, String)>,
    loads: AtomicUsize,
}

impl StubLayouts {
    /// No layouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add layout `key` with front matter and a `{{ content }}` body.
    pub fn with(mut self, key: &str, front_matter: Value, source: &str) -> Self {
        self.layouts.insert(key.to_string(), (object(front_matter), source.to_string()));
        self
    }

    /// Number of successful and failed loads so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl LayoutSource for StubLayouts {
    async fn load_layout(&self, key: &str, referrer: &str) -> Result<LayoutRecord> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let (front_matter, source) = self.layouts.get(key).ok_or_else(|| SiteError::LayoutNotFound {
            layout: key.to_string(),
            template: referrer.to_string(),
            suggestion: None,
        })?;

        Ok(LayoutRecord {
            key: key.to_string(),
            path: format!("./_includes/{key}"),
            front_matter: front_matter.clone(),
            source: source.clone(),
        })
    }

    fn compile(&self, record: &LayoutRecord) -> Result<RenderFn> {
        let source = record.source.clone();
        Ok(Arc::new(move |data: &Data| -> Result<String> { Ok(fill(&source, data)) }))
    }
}
