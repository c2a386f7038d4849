//! The build-wide template map.
//!
//! A [`TemplateMap`] holds one [`MapEntry`] per template and computes, in a
//! single cache pass, everything that depends on the map as a whole:
//!
//! 1. collection storage is reset
//! 2. tag collections (`all` plus one per tag)
//! 3. URLs and pages for entries without pagination
//! 4. user-defined collections
//! 5. URLs and pages for paginated entries, which may paginate over the
//!    collections built so far
//! 6. rendered content, one entry at a time, with every collection read
//!    attributed to the entry being rendered
//!
//! Phase 6 records `(reader, member)` edges in a [`DependencyRecorder`]. Their
//! reversed topological order drives [`TemplateMap::get_sorted_map`], which
//! places templates whose content others read ahead of their readers.
//!
//! A map is created per build. [`TemplateMap::reset`] discards everything the
//! last pass computed so the same templates can be cached again.

mod collection;
mod entry;

pub use collection::{
    CollectionsData, CollectionsView, TemplateCollection, UserCollection, collection_from_config,
    user_collection,
};
pub use entry::{MapEntry, Page};

use anyhow::{Result, bail};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::KeysConfig;
use crate::constants::{ALL_COLLECTION, COLLECTIONS_KEY};
use crate::dependencies::{DependencyRecorder, TemplateDependencies};
use crate::templating::Template;

/// All templates of a build and the collections derived from them.
pub struct TemplateMap<T: Template> {
    map: Vec<MapEntry<T>>,
    index: HashMap<String, usize>,
    collections_data: CollectionsData,
    user_collections: BTreeMap<String, UserCollection<T>>,
    recorder: DependencyRecorder,
    keys: KeysConfig,
    cached: bool,
}

impl<T: Template> Default for TemplateMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Template> TemplateMap<T> {
    /// Empty map using the default front-matter keys.
    pub fn new() -> Self {
        Self::with_keys(KeysConfig::default())
    }

    /// Empty map reading tags and pagination from the given keys.
    pub fn with_keys(keys: KeysConfig) -> Self {
        Self {
            map: Vec::new(),
            index: HashMap::new(),
            collections_data: CollectionsData::new(),
            user_collections: BTreeMap::new(),
            recorder: DependencyRecorder::new(),
            keys,
            cached: false,
        }
    }

    /// Front-matter keys in use.
    pub fn keys(&self) -> &KeysConfig {
        &self.keys
    }

    /// Add a template, running its first stage.
    ///
    /// Invalidates any previous cache pass.
    pub async fn add_template(&mut self, template: Arc<T>) -> Result<()> {
        if self.index.contains_key(template.input_path()) {
            bail!("Template {} was already added to the map", template.input_path());
        }

        let mapped = template.get_mapped().await?;
        tracing::trace!("Mapped {}", mapped.input_path);
        self.index.insert(mapped.input_path.clone(), self.map.len());
        self.map.push(MapEntry::new(mapped, template));
        self.cached = false;
        Ok(())
    }

    /// Register a user-defined collection, replacing one with the same name.
    pub fn add_collection(&mut self, name: impl Into<String>, collection: UserCollection<T>) {
        self.user_collections.insert(name.into(), collection);
        self.cached = false;
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[MapEntry<T>] {
        &self.map
    }

    /// Entry for `input_path`.
    pub fn entry(&self, input_path: &str) -> Option<&MapEntry<T>> {
        self.index.get(input_path).map(|&i| &self.map[i])
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether a cache pass has completed since the last change.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Collections of the last cache pass.
    pub fn collections_data(&self) -> &CollectionsData {
        &self.collections_data
    }

    /// Collections, running a cache pass first if needed.
    pub async fn get_collections_data(&mut self) -> Result<&CollectionsData> {
        if !self.cached {
            self.cache().await?;
        }
        Ok(&self.collections_data)
    }

    /// The whole map as offered to user-defined collections.
    pub fn get_collection(&self) -> TemplateCollection<'_, T> {
        TemplateCollection::new(&self.map, &self.keys.tags)
    }

    /// Dependency edges recorded by the last cache pass.
    pub fn dependencies(&self) -> TemplateDependencies {
        self.recorder.snapshot()
    }

    /// Tag and user collections computed from the current entries, without
    /// running a cache pass.
    pub fn collections_snapshot(&self) -> CollectionsData {
        let mut collections = self.tagged_collections_data();
        for (name, members) in self.user_config_collections_data() {
            collections.insert(name, members);
        }
        collections
    }

    /// Discard everything the last cache pass computed.
    pub fn reset(&mut self) {
        for entry in &mut self.map {
            entry.reset_pass();
        }
        self.collections_data.clear();
        self.recorder.reset();
        self.cached = false;
    }

    /// Run a full cache pass.
    ///
    /// # Errors
    ///
    /// Any template failure aborts the pass and leaves the map uncached.
    /// Dependency cycles are not detected here; they surface from
    /// [`get_sorted_map`](Self::get_sorted_map).
    pub async fn cache(&mut self) -> Result<()> {
        self.reset();
        tracing::debug!("Caching template map with {} entries", self.map.len());

        self.populate_collections_data_in_map();

        let tagged = self.tagged_collections_data();
        self.merge_collections(tagged);

        self.populate_url_data_in_map(true).await?;

        let user = self.user_config_collections_data();
        self.merge_collections(user);

        self.populate_url_data_in_map(false).await?;
        self.populate_content_data_in_map().await?;

        self.cached = true;
        tracing::debug!(
            "Cached {} collections and {} dependency edges",
            self.collections_data.len(),
            self.recorder.snapshot().dependencies().len()
        );
        Ok(())
    }

    /// Entries ordered so that templates read by others come first.
    ///
    /// Entries missing from the dependency order keep their relative order
    /// and precede those present in it.
    pub fn get_sorted_map(&self) -> Result<Vec<&MapEntry<T>>> {
        let order = self.recorder.snapshot().reverse_sorted_order()?;
        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, path)| (path.as_str(), i)).collect();

        let mut sorted: Vec<&MapEntry<T>> = self.map.iter().collect();
        sorted.sort_by_key(|entry| position.get(entry.input_path.as_str()).map_or(-1, |&i| i as isize));
        Ok(sorted)
    }

    fn merge_collections(&mut self, collections: CollectionsData) {
        for (name, members) in collections {
            self.collections_data.insert(name, members);
        }
    }

    /// Phase 1: every entry shares the one collection store, starting empty.
    fn populate_collections_data_in_map(&mut self) {
        self.collections_data.clear();
        tracing::trace!("{} entries share the {} store", self.map.len(), COLLECTIONS_KEY);
    }

    fn tagged_collections_data(&self) -> CollectionsData {
        let mut collections = CollectionsData::new();
        collections.insert(ALL_COLLECTION, (0..self.map.len()).collect());

        let mut by_tag: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, entry) in self.map.iter().enumerate() {
            for tag in entry.tags(&self.keys.tags) {
                let members = by_tag.entry(tag).or_default();
                if !members.contains(&index) {
                    members.push(index);
                }
            }
        }

        for (tag, members) in by_tag {
            collections.insert(tag, members);
        }
        collections
    }

    fn user_config_collections_data(&self) -> CollectionsData {
        let collection = self.get_collection();
        let mut collections = CollectionsData::new();

        for (name, select) in &self.user_collections {
            let members = select(&collection)
                .into_iter()
                .filter_map(|entry| self.index.get(&entry.input_path).copied())
                .collect();
            collections.insert(name.as_str(), members);
        }
        collections
    }

    /// Phases 3 and 5: pages, URL and output path of the first page.
    async fn populate_url_data_in_map(&mut self, skip_pagination: bool) -> Result<()> {
        for i in 0..self.map.len() {
            let entry = &self.map[i];
            if entry.pages.is_some() || (skip_pagination && entry.is_paginated(&self.keys.pagination)) {
                continue;
            }

            let template = Arc::clone(&entry.template);
            let pages = {
                let view = CollectionsView::untracked(&self.collections_data, &self.map);
                template.get_templates(&self.map[i].data, &view).await?
            };

            let first = match pages.first() {
                Some(page) => Some(template.get_secondary_map_entry(page).await?),
                None => None,
            };

            let entry = &mut self.map[i];
            tracing::trace!("{} resolved to {} page(s)", entry.input_path, pages.len());
            if let Some(first) = first {
                entry.url = Some(first.url);
                entry.output_path = Some(first.output_path);
            }
            entry.pages = Some(pages);
        }
        Ok(())
    }

    /// Phase 6: rendered content, one active template at a time.
    async fn populate_content_data_in_map(&mut self) -> Result<()> {
        for i in 0..self.map.len() {
            let Some(pages) = self.map[i].pages.clone() else {
                continue;
            };
            if pages.is_empty() {
                continue;
            }

            let template = Arc::clone(&self.map[i].template);
            let input_path = self.map[i].input_path.clone();

            let (paged, consumed) = {
                let entries = &self.map;
                let active = self.recorder.activate(&input_path).await;
                let view = CollectionsView::tracked(&self.collections_data, entries, |name, members| {
                    active.record(
                        &format!("{COLLECTIONS_KEY}.{name}"),
                        members.iter().filter_map(|&m| entries.get(m)),
                    );
                });

                let mut paged = Vec::with_capacity(pages.len());
                let mut other = Vec::new();
                for page in &pages {
                    let tertiary = template.get_tertiary_map_entry(page, &view).await?;
                    paged.push(tertiary.template_content);
                    other.extend(tertiary.consumed);
                }
                drop(view);

                let mut consumed = active.finish();
                for path in other {
                    if !consumed.contains(&path) {
                        consumed.push(path);
                    }
                }
                (paged, consumed)
            };

            let entry = &mut self.map[i];
            entry.template_content = paged.first().cloned();
            entry.paged_template_content = paged;
            entry.consumed = consumed;
        }
        Ok(())
    }
}
