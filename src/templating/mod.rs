//! Templates as seen by the dependency core.
//!
//! The [`Template`] trait is the seam between the incremental machinery
//! ([`TemplateMap`](crate::map::TemplateMap), [`DataGraph`](crate::graph::DataGraph))
//! and whatever actually reads and renders files. The map drives a template
//! through three stages, each fed by the previous:
//!
//! 1. [`get_mapped`](Template::get_mapped): data and date, no collections yet
//! 2. [`get_templates`](Template::get_templates) and
//!    [`get_secondary_map_entry`](Template::get_secondary_map_entry): pages and
//!    URLs, with collections available untracked
//! 3. [`get_tertiary_map_entry`](Template::get_tertiary_map_entry): rendered
//!    content, with every collection read attributed to the template
//!
//! [`FileTemplate`](file::FileTemplate) is the file-backed implementation
//! rendering through [`TeraEngine`](engine::TeraEngine).

pub mod cache;
pub mod data;
pub mod engine;
pub mod file;
pub mod frontmatter;

use anyhow::Result;
use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::sync::Arc;

use crate::map::{CollectionsView, Page};

/// Template data: a JSON object.
pub type Data = serde_json::Map<String, serde_json::Value>;

/// A compiled template or layout.
pub type RenderFn = Arc<dyn Fn(&Data) -> Result<String> + Send + Sync>;

/// First-stage result: what a template contributes before any collection exists.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedTemplate {
    /// Unique input path
    pub input_path: String,
    /// Merged data (layouts, then the template's own front matter)
    pub data: Data,
    /// Date used for date-ordered collections
    pub date: Option<NaiveDateTime>,
}

/// Output location of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryMapEntry {
    /// Public URL
    pub url: String,
    /// File the page is written to
    pub output_path: PathBuf,
}

/// Rendered content of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TertiaryMapEntry {
    /// Page content without layouts applied
    pub template_content: String,
    /// Data paths read outside the collections (global data keys)
    pub consumed: Vec<String>,
}

/// A template the map can drive.
///
/// Collection reads made through the [`CollectionsView`] handed to
/// [`get_tertiary_map_entry`](Self::get_tertiary_map_entry) are attributed to
/// this template automatically; implementations only report other data reads
/// through [`TertiaryMapEntry::consumed`].
#[allow(async_fn_in_trait)]
pub trait Template: Send + Sync + Sized {
    /// Unique key of this template.
    fn input_path(&self) -> &str;

    /// Layout-chain data merged under the template's own data.
    async fn get_data(&self) -> Result<Data>;

    /// Input paths of the layout chain, innermost first. Empty without a layout.
    async fn get_layout_chain(&self) -> Result<Vec<String>>;

    /// First-stage map entry.
    async fn get_mapped(&self) -> Result<MappedTemplate>;

    /// Pages this template produces. Empty means nothing is written.
    async fn get_templates(&self, data: &Data, collections: &CollectionsView<'_, Self>) -> Result<Vec<Page>>;

    /// URL and output path of `page`.
    async fn get_secondary_map_entry(&self, page: &Page) -> Result<SecondaryMapEntry>;

    /// Rendered content of `page`.
    async fn get_tertiary_map_entry(
        &self,
        page: &Page,
        collections: &CollectionsView<'_, Self>,
    ) -> Result<TertiaryMapEntry>;

    /// Compile `source` with this template's engine.
    fn compile(&self, source: &str) -> Result<RenderFn>;

    /// Render the template body against `data`, without layouts.
    async fn render(&self, data: &Data) -> Result<String>;
}
