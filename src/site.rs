//! A site on disk, assembled from the pieces of the crate.
//!
//! [`Site::load`] discovers every template under the input directory, skipping
//! the includes, data and output directories and anything hidden, and adds them
//! to a [`TemplateMap`] in sorted path order. [`Site::build`] runs the cache
//! pass and populates the dependency graph, including one edge per global data
//! file so that editing `_data/metadata.json` reaches every template that read
//! `metadata`.

use anyhow::{Context, Result};
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use walkdir::{DirEntry, WalkDir};

use crate::config::SiteConfig;
use crate::graph::{DataGraph, NodeKind, populate_from_map};
use crate::layout::{LayoutLoader, LayoutPathResolver};
use crate::map::{CollectionsView, MapEntry, TemplateMap, collection_from_config};
use crate::templating::Template;
use crate::templating::cache::{CachePolicy, RenderCache, RenderCacheKey};
use crate::templating::data::GlobalData;
use crate::templating::engine::TeraEngine;
use crate::templating::file::FileTemplate;

/// Everything templates of one site share.
pub struct SiteContext {
    /// Loaded configuration
    pub config: SiteConfig,
    /// Root of the site
    pub input_dir: PathBuf,
    /// Engine with the site's partials
    pub engine: Arc<TeraEngine>,
    /// Global data files
    pub globals: GlobalData,
    /// Layout loader over the includes directory
    pub layouts: Arc<LayoutLoader>,
}

impl SiteContext {
    /// Load global data and set up the engine and layouts for `input_dir`.
    pub async fn new(input_dir: impl Into<PathBuf>, config: SiteConfig) -> Result<Self> {
        let input_dir = input_dir.into();
        let includes_dir = config.includes_dir(&input_dir);
        let engine = Arc::new(TeraEngine::new(&includes_dir, config.template_formats.clone()));
        let resolver = LayoutPathResolver::new(&input_dir, &config.dir.includes, config.template_formats.clone());
        let layouts = Arc::new(LayoutLoader::new(resolver, Arc::clone(&engine)));
        let globals = GlobalData::load(&config.data_dir(&input_dir)).await?;

        Ok(Self {
            config,
            input_dir,
            engine,
            globals,
            layouts,
        })
    }

    /// Node key of a file inside the input directory, e.g. `./_data/site.json`.
    pub fn node_key(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.input_dir).unwrap_or(path);
        format!("./{}", relative.to_string_lossy().replace('\\', "/"))
    }
}

/// A loaded site.
pub struct Site {
    context: Arc<SiteContext>,
    map: TemplateMap<FileTemplate>,
    graph: tokio::sync::Mutex<DataGraph>,
    render_cache: Mutex<RenderCache>,
}

impl Site {
    /// Discover and load every template under `input_dir`.
    pub async fn load(input_dir: impl Into<PathBuf>, config: SiteConfig) -> Result<Self> {
        let context = Arc::new(SiteContext::new(input_dir, config).await?);
        let paths = discover(&context)?;
        tracing::info!("Found {} templates in {}", paths.len(), context.input_dir.display());

        let templates =
            try_join_all(paths.iter().map(|path| FileTemplate::load(Arc::clone(&context), path))).await?;

        let mut map = TemplateMap::with_keys(context.config.keys.clone());
        for template in templates {
            map.add_template(Arc::new(template)).await?;
        }
        for (name, collection) in &context.config.collections {
            let select = collection_from_config(collection)
                .with_context(|| format!("Invalid collection '{name}'"))?;
            map.add_collection(name.clone(), select);
        }

        let render_cache = RenderCache::new(CachePolicy::from(context.config.render_cache));
        Ok(Self {
            context,
            map,
            graph: tokio::sync::Mutex::new(DataGraph::new()),
            render_cache: Mutex::new(render_cache),
        })
    }

    /// Shared site state.
    pub fn context(&self) -> &SiteContext {
        &self.context
    }

    /// The template map.
    pub fn map(&self) -> &TemplateMap<FileTemplate> {
        &self.map
    }

    /// Run the cache pass and rebuild the dependency graph.
    ///
    /// # Errors
    ///
    /// Any template failure, and dependency cycles between templates.
    pub async fn build(&mut self) -> Result<()> {
        self.render_cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
        *self.graph.lock().await = DataGraph::new();

        self.map.cache().await?;
        populate_from_map(&self.graph, &mut self.map).await?;

        let mut graph = self.graph.lock().await;
        for source in self.context.globals.sources() {
            graph.add_structural_edge(&source.key, &self.context.node_key(&source.path), NodeKind::Path);
        }
        drop(graph);

        let order = self.map.get_sorted_map()?;
        tracing::info!("Built {} templates", order.len());
        Ok(())
    }

    /// Entries in build order.
    pub fn order(&self) -> Result<Vec<&MapEntry<FileTemplate>>> {
        self.map.get_sorted_map()
    }

    /// Templates to rebuild when `key` changes.
    pub async fn consumers_of(&self, key: &str) -> Result<Vec<String>> {
        self.graph.lock().await.consumers_of(key)
    }

    /// Every page of `input_path`, wrapped in its layouts.
    pub async fn render(&self, input_path: &str) -> Result<Vec<String>> {
        let entry = self
            .map
            .entry(input_path)
            .with_context(|| format!("No template with input path {input_path}"))?;
        let pages = entry.pages.as_deref().unwrap_or_default();
        let collections = CollectionsView::untracked(self.map.collections_data(), self.map.entries());

        let mut output = Vec::with_capacity(pages.len());
        for (page, content) in pages.iter().zip(&entry.paged_template_content) {
            let key = RenderCacheKey::new(entry.template.input_path(), page.index);
            let cached = self
                .render_cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&key)
                .ok()
                .map(str::to_string);

            let rendered = match cached {
                Some(rendered) => rendered,
                None => {
                    let rendered = entry.template.render_page(page, content, &collections).await?;
                    self.render_cache
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(key, rendered.clone());
                    rendered
                }
            };
            output.push(rendered);
        }
        Ok(output)
    }

    /// Render cache hits and misses so far.
    pub fn render_cache_stats(&self) -> (usize, usize) {
        self.render_cache.lock().unwrap_or_else(PoisonError::into_inner).stats()
    }
}

/// Template files under the input directory, sorted by path.
fn discover(context: &SiteContext) -> Result<Vec<PathBuf>> {
    let input_dir = &context.input_dir;
    let excluded = [
        context.config.includes_dir(input_dir),
        context.config.data_dir(input_dir),
        context.config.output_dir(input_dir),
    ];
    let keep = |entry: &DirEntry| {
        if entry.depth() == 0 {
            return true;
        }
        let hidden = entry.file_name().to_str().is_some_and(|name| name.starts_with('.'));
        !hidden && !excluded.iter().any(|dir| entry.path() == dir)
    };

    let mut paths = Vec::new();
    for entry in WalkDir::new(input_dir).sort_by_file_name().into_iter().filter_entry(keep) {
        let entry = entry.with_context(|| format!("Failed to scan {}", input_dir.display()))?;
        if entry.file_type().is_file() && context.config.is_template_file(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SiteEnvironment;

    #[tokio::test]
    async fn test_discovery_skips_special_directories() {
        let env = SiteEnvironment::blog().unwrap();
        env.create_file("_site/old/index.html", "stale").unwrap();
        env.create_file(".git/notes.md", "hidden").unwrap();
        env.create_file("notes.txt", "not a template").unwrap();

        let site = Site::load(env.path(), SiteConfig::default()).await.unwrap();
        let paths: Vec<&str> = site.map().entries().iter().map(|e| e.input_path.as_str()).collect();
        assert_eq!(paths, vec!["./about.md", "./index.tera", "./posts/first.md", "./posts/second.md"]);
    }

    #[tokio::test]
    async fn test_build_orders_posts_before_index() {
        let env = SiteEnvironment::blog().unwrap();
        let mut site = Site::load(env.path(), SiteConfig::default()).await.unwrap();
        site.build().await.unwrap();

        let order: Vec<String> = site.order().unwrap().iter().map(|e| e.input_path.clone()).collect();
        let index = order.iter().position(|p| p == "./index.tera").unwrap();
        let first = order.iter().position(|p| p == "./posts/first.md").unwrap();
        let second = order.iter().position(|p| p == "./posts/second.md").unwrap();
        assert!(first < index);
        assert!(second < index);
    }

    #[tokio::test]
    async fn test_global_data_file_reaches_readers() {
        let env = SiteEnvironment::blog().unwrap();
        let mut site = Site::load(env.path(), SiteConfig::default()).await.unwrap();
        site.build().await.unwrap();

        let consumers = site.consumers_of("./_data/metadata.json").await.unwrap();
        // the posts read it through their layout; the index reads the posts
        assert_eq!(consumers, vec!["./about.md", "./index.tera", "./posts/first.md", "./posts/second.md"]);
    }

    #[tokio::test]
    async fn test_render_applies_layout_chain() {
        let env = SiteEnvironment::blog().unwrap();
        let mut site = Site::load(env.path(), SiteConfig::default()).await.unwrap();
        site.build().await.unwrap();

        let pages = site.render("./posts/first.md").await.unwrap();
        assert_eq!(pages.len(), 1);
        let page = pages[0].replace('\n', "");
        assert!(page.contains("<title>Example Blog</title>"), "{page}");
        assert!(page.contains("<main><article>First body</article></main>"), "{page}");
    }
}
