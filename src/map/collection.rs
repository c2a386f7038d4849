//! Collections over map entries.
//!
//! Collections are stored as lists of indices into the map
//! ([`CollectionsData`]) so entries can keep accumulating results while
//! collections point at them. Templates see them through a
//! [`CollectionsView`], which reports every collection read to the map's
//! dependency recorder. User-defined collections are functions over a
//! [`TemplateCollection`].

use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::MapEntry;
use crate::config::{CollectionConfig, CollectionSort};
use crate::graph::proxy::{Instrumented, Lookup};

/// Collection name → member indices into the map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionsData {
    lists: BTreeMap<String, Vec<usize>>,
}

impl CollectionsData {
    /// No collections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the members of `name`, replacing any previous list.
    pub fn insert(&mut self, name: impl Into<String>, members: Vec<usize>) {
        self.lists.insert(name.into(), members);
    }

    /// Members of `name`.
    pub fn get(&self, name: &str) -> Option<&[usize]> {
        self.lists.get(name).map(Vec::as_slice)
    }

    /// Collection names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.lists.keys().map(String::as_str)
    }

    /// Names of the collections containing entry `index`.
    pub fn memberships(&self, index: usize) -> Vec<&str> {
        self.lists
            .iter()
            .filter(|(_, members)| members.contains(&index))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Number of collections.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Whether there are no collections.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Remove every collection.
    pub fn clear(&mut self) {
        self.lists.clear();
    }
}

impl Lookup for CollectionsData {
    type Value = [usize];

    fn lookup(&self, key: &str) -> Option<&[usize]> {
        self.get(key)
    }
}

impl IntoIterator for CollectionsData {
    type Item = (String, Vec<usize>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<usize>>;

    fn into_iter(self) -> Self::IntoIter {
        self.lists.into_iter()
    }
}

type ReadHook<'a> = Box<dyn Fn(&str, &[usize]) + Send + Sync + 'a>;

/// Collections as handed to templates.
pub struct CollectionsView<'a, T> {
    collections: Instrumented<'a, CollectionsData, ReadHook<'a>>,
    entries: &'a [MapEntry<T>],
}

impl<'a, T> CollectionsView<'a, T> {
    /// A view whose reads are not recorded.
    pub fn untracked(collections: &'a CollectionsData, entries: &'a [MapEntry<T>]) -> Self {
        Self::tracked(collections, entries, |_, _| {})
    }

    /// A view calling `on_read(name, members)` for every defined collection read.
    pub fn tracked(
        collections: &'a CollectionsData,
        entries: &'a [MapEntry<T>],
        on_read: impl Fn(&str, &[usize]) + Send + Sync + 'a,
    ) -> Self {
        Self {
            collections: Instrumented::new(collections, Box::new(on_read) as ReadHook<'a>),
            entries,
        }
    }

    /// Members of collection `name`, or `None` when it does not exist.
    pub fn get(&self, name: &str) -> Option<Vec<&'a MapEntry<T>>> {
        let members = self.collections.get(name)?;
        Some(members.iter().filter_map(|&index| self.entries.get(index)).collect())
    }

    /// Whether collection `name` exists. Not recorded as a read.
    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains(name)
    }

    /// All collection names. Not recorded as a read.
    pub fn names(&self) -> Vec<&'a str> {
        self.collections.inner().names().collect()
    }
}

/// A user-defined collection: selects members from the whole map.
pub type UserCollection<T> =
    Arc<dyn for<'a> Fn(&TemplateCollection<'a, T>) -> Vec<&'a MapEntry<T>> + Send + Sync>;

/// Wrap a selector function as a [`UserCollection`].
pub fn user_collection<T, F>(select: F) -> UserCollection<T>
where
    F: for<'a> Fn(&TemplateCollection<'a, T>) -> Vec<&'a MapEntry<T>> + Send + Sync + 'static,
{
    Arc::new(select)
}

/// Build the [`UserCollection`] described by a `[collections.<name>]` table.
pub fn collection_from_config<T: 'static>(config: &CollectionConfig) -> Result<UserCollection<T>> {
    let tag = config.tag.clone();
    let pattern = config
        .glob
        .as_deref()
        .map(|p| glob::Pattern::new(normalize(p)).map_err(|e| anyhow!("Invalid glob '{p}': {e}")))
        .transpose()?;
    let sort = config.sort;
    let reverse = config.reverse;
    let limit = config.limit;

    Ok(user_collection(move |collection: &TemplateCollection<'_, T>| {
        let mut members = match sort {
            CollectionSort::Input => collection.get_all(),
            CollectionSort::Date => collection.get_all_sorted(),
        };
        if let Some(tag) = &tag {
            members.retain(|entry| entry.has_tag(collection.tags_key(), tag));
        }
        if let Some(pattern) = &pattern {
            members.retain(|entry| pattern.matches(normalize(&entry.input_path)));
        }
        if reverse {
            members.reverse();
        }
        if let Some(limit) = limit {
            members.truncate(limit);
        }
        members
    }))
}

fn normalize(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}

/// The whole map, as offered to user-defined collections.
pub struct TemplateCollection<'a, T> {
    entries: &'a [MapEntry<T>],
    tags_key: &'a str,
}

impl<'a, T> TemplateCollection<'a, T> {
    /// Collection over `entries`, reading tags from `tags_key`.
    pub fn new(entries: &'a [MapEntry<T>], tags_key: &'a str) -> Self {
        Self {
            entries,
            tags_key,
        }
    }

    /// Front-matter key holding tags.
    pub fn tags_key(&self) -> &'a str {
        self.tags_key
    }

    /// Every entry in map order.
    pub fn get_all(&self) -> Vec<&'a MapEntry<T>> {
        self.entries.iter().collect()
    }

    /// Every entry by date, then input path. Undated entries come first.
    pub fn get_all_sorted(&self) -> Vec<&'a MapEntry<T>> {
        let mut all = self.get_all();
        all.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.input_path.cmp(&b.input_path)));
        all
    }

    /// Entries tagged `tag`, in map order.
    pub fn get_filtered_by_tag(&self, tag: &str) -> Vec<&'a MapEntry<T>> {
        self.entries.iter().filter(|entry| entry.has_tag(self.tags_key, tag)).collect()
    }

    /// Entries whose input path matches `pattern`, in map order.
    ///
    /// A leading `./` is ignored on both sides.
    pub fn get_filtered_by_glob(&self, pattern: &str) -> Result<Vec<&'a MapEntry<T>>> {
        let compiled = glob::Pattern::new(normalize(pattern))
            .map_err(|e| anyhow!("Invalid glob '{pattern}': {e}"))?;
        Ok(self
            .entries
            .iter()
            .filter(|entry| compiled.matches(normalize(&entry.input_path)))
            .collect())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templating::MappedTemplate;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Mutex;

    fn entry(path: &str, tags: &[&str], day: Option<u32>) -> MapEntry<()> {
        MapEntry::new(
            MappedTemplate {
                input_path: path.to_string(),
                data: json!({ "tags": tags }).as_object().cloned().unwrap(),
                date: day.map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(0, 0, 0).unwrap()),
            },
            Arc::new(()),
        )
    }

    fn paths(entries: &[&MapEntry<()>]) -> Vec<String> {
        entries.iter().map(|e| e.input_path.clone()).collect()
    }

    fn sample() -> Vec<MapEntry<()>> {
        vec![
            entry("./posts/b.md", &["post"], Some(3)),
            entry("./posts/a.md", &["post", "featured"], Some(1)),
            entry("./about.md", &[], None),
        ]
    }

    #[test]
    fn test_template_collection_queries() {
        let entries = sample();
        let collection = TemplateCollection::new(&entries, "tags");

        assert_eq!(collection.len(), 3);
        assert_eq!(paths(&collection.get_all()), vec!["./posts/b.md", "./posts/a.md", "./about.md"]);
        assert_eq!(
            paths(&collection.get_all_sorted()),
            vec!["./about.md", "./posts/a.md", "./posts/b.md"]
        );
        assert_eq!(paths(&collection.get_filtered_by_tag("featured")), vec!["./posts/a.md"]);
        assert_eq!(
            paths(&collection.get_filtered_by_glob("posts/*.md").unwrap()),
            vec!["./posts/b.md", "./posts/a.md"]
        );
        assert!(collection.get_filtered_by_glob("posts/[").is_err());
    }

    #[test]
    fn test_collection_from_config() {
        let entries = sample();
        let collection = TemplateCollection::new(&entries, "tags");
        let config = CollectionConfig {
            tag: Some("post".to_string()),
            sort: CollectionSort::Date,
            reverse: true,
            limit: Some(1),
            ..CollectionConfig::default()
        };

        let select = collection_from_config::<()>(&config).unwrap();
        assert_eq!(paths(&select(&collection)), vec!["./posts/b.md"]);
    }

    #[test]
    fn test_view_records_defined_reads_only() {
        let entries = sample();
        let mut data = CollectionsData::new();
        data.insert("post", vec![0, 1]);
        data.insert("empty", vec![]);

        let reads = Mutex::new(Vec::new());
        let view = CollectionsView::tracked(&data, &entries, |name, members| {
            reads.lock().unwrap().push((name.to_string(), members.len()))
        });

        assert_eq!(paths(&view.get("post").unwrap()), vec!["./posts/b.md", "./posts/a.md"]);
        assert!(view.get("missing").is_none());
        assert!(view.get("empty").unwrap().is_empty());
        assert!(view.contains("post"));
        assert_eq!(view.names(), vec!["empty", "post"]);
        drop(view);

        assert_eq!(
            reads.into_inner().unwrap(),
            vec![("post".to_string(), 2), ("empty".to_string(), 0)]
        );
    }

    #[test]
    fn test_memberships() {
        let mut data = CollectionsData::new();
        data.insert("all", vec![0, 1, 2]);
        data.insert("post", vec![0, 1]);
        assert_eq!(data.memberships(1), vec!["all", "post"]);
        assert_eq!(data.memberships(2), vec!["all"]);
        assert!(data.memberships(7).is_empty());
    }
}
