//! Layout chains.
//!
//! A template naming a layout in its front matter is wrapped by that layout,
//! which may name a layout of its own, and so on. [`TemplateLayout`] resolves
//! that chain once per template and memoizes three things:
//!
//! - the chain itself, innermost layout first
//! - the merged layout data, where inner layouts override outer ones
//! - one compiled render function per layout
//!
//! Rendering feeds the template's content to the innermost layout as
//! `content` (and `layoutContent`), then each layout's output to the next.
//!
//! Chains that revisit a layout, or grow past
//! [`MAX_LAYOUT_DEPTH`](crate::constants::MAX_LAYOUT_DEPTH), fail with
//! [`SiteError::RunawayLayoutChain`].

mod resolver;

pub use resolver::{LayoutLoader, LayoutPathResolver};

use anyhow::Result;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::constants::MAX_LAYOUT_DEPTH;
use crate::core::SiteError;
use crate::templating::{Data, RenderFn};

/// One resolved layout.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutRecord {
    /// The key it was referenced by
    pub key: String,
    /// Unique path of the layout file, used as its graph node
    pub path: String,
    /// The layout's own front matter
    pub front_matter: Data,
    /// The layout body
    pub source: String,
}

impl LayoutRecord {
    /// The layout this one is wrapped in, if any.
    pub fn parent_key(&self, layout_key: &str) -> Option<&str> {
        self.front_matter.get(layout_key).and_then(Value::as_str)
    }
}

/// Loads and compiles layouts by key.
#[allow(async_fn_in_trait)]
pub trait LayoutSource: Send + Sync {
    /// Resolve `key`, referenced by `referrer`, into its record.
    ///
    /// # Errors
    ///
    /// [`SiteError::LayoutNotFound`] when no layout exists under `key`.
    async fn load_layout(&self, key: &str, referrer: &str) -> Result<LayoutRecord>;

    /// Compile a layout body.
    fn compile(&self, record: &LayoutRecord) -> Result<RenderFn>;

    /// Drop anything cached for `key`, so the next load reads it afresh.
    fn forget(&self, _key: &str) {}
}

/// The layout chain of one template.
pub struct TemplateLayout<S> {
    key: String,
    template: String,
    layout_key: String,
    source: Arc<S>,
    chain: OnceCell<Vec<LayoutRecord>>,
    data: OnceCell<Data>,
    compiled: OnceCell<Vec<RenderFn>>,
}

impl<S: LayoutSource> TemplateLayout<S> {
    /// Chain starting at layout `key`, referenced by `template`, following
    /// `layout_key` in each layout's front matter.
    pub fn new(
        key: impl Into<String>,
        template: impl Into<String>,
        layout_key: impl Into<String>,
        source: Arc<S>,
    ) -> Self {
        Self {
            key: key.into(),
            template: template.into(),
            layout_key: layout_key.into(),
            source,
            chain: OnceCell::new(),
            data: OnceCell::new(),
            compiled: OnceCell::new(),
        }
    }

    /// The first layout key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The chain, innermost layout first.
    pub async fn get_layout_chain(&self) -> Result<&[LayoutRecord]> {
        let chain = self.chain.get_or_try_init(|| self.resolve_chain()).await?;
        Ok(chain)
    }

    /// Merged layout data, inner layouts winning, without the layout key.
    pub async fn get_data(&self) -> Result<&Data> {
        self.data
            .get_or_try_init(|| async {
                let chain = self.get_layout_chain().await?;
                Ok::<Data, anyhow::Error>(merge_chain_data(chain, &self.layout_key))
            })
            .await
    }

    /// One render function per layout, innermost first.
    pub async fn get_compiled_layout_functions(&self) -> Result<&[RenderFn]> {
        let compiled = self
            .compiled
            .get_or_try_init(|| async {
                let chain = self.get_layout_chain().await?;
                let functions: Vec<RenderFn> =
                    chain.iter().map(|record| self.source.compile(record)).collect::<Result<_>>()?;
                Ok::<_, anyhow::Error>(functions)
            })
            .await?;
        Ok(compiled)
    }

    /// Wrap `template_content` in every layout of the chain.
    pub async fn render(&self, data: &Data, template_content: &str) -> Result<String> {
        let functions = self.get_compiled_layout_functions().await?;

        let mut data = data.clone();
        let mut content = template_content.to_string();
        augment_data_with_content(&mut data, &content);
        for render in functions {
            content = render(&data)?;
            augment_data_with_content(&mut data, &content);
        }
        Ok(content)
    }

    /// Forget the chain, data and compiled functions together, along with the
    /// source's records for every layout in the chain.
    pub fn invalidate(&mut self) {
        self.source.forget(&self.key);
        for record in self.chain.take().unwrap_or_default() {
            self.source.forget(&record.key);
        }
        self.data.take();
        self.compiled.take();
    }

    async fn resolve_chain(&self) -> Result<Vec<LayoutRecord>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut chain: Vec<LayoutRecord> = Vec::new();
        let mut record = self.source.load_layout(&self.key, &self.template).await?;

        loop {
            if !seen.insert(record.path.clone()) || chain.len() >= MAX_LAYOUT_DEPTH {
                let mut keys: Vec<&str> = chain.iter().map(|r| r.key.as_str()).collect();
                keys.push(&record.key);
                return Err(SiteError::RunawayLayoutChain {
                    template: self.template.clone(),
                    chain: keys.join(" → "),
                }
                .into());
            }

            let parent = record.parent_key(&self.layout_key).map(str::to_string);
            let referrer = record.path.clone();
            chain.push(record);

            match parent {
                Some(key) => record = self.source.load_layout(&key, &referrer).await?,
                None => break,
            }
        }

        tracing::debug!(
            "Layout chain for {}: {}",
            self.template,
            chain.iter().map(|r| r.path.as_str()).collect::<Vec<_>>().join(" → ")
        );
        Ok(chain)
    }
}

/// Shallow-merge layout front matter from the outermost layout inwards.
pub fn merge_chain_data(chain: &[LayoutRecord], layout_key: &str) -> Data {
    let mut merged = Data::new();
    for record in chain.iter().rev() {
        for (key, value) in &record.front_matter {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged.remove(layout_key);
    merged
}

/// Expose `content` to a layout as `content` and `layoutContent`.
pub fn augment_data_with_content(data: &mut Data, content: &str) {
    data.insert("content".to_string(), Value::String(content.to_string()));
    data.insert("layoutContent".to_string(), Value::String(content.to_string()));
}
