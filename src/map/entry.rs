//! Map entries and pages.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::dependencies::InputPath;
use crate::templating::{Data, MappedTemplate};

/// One page produced by a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    /// Zero-based page number
    pub index: usize,
    /// Page-specific data layered over the template's data
    pub data: Data,
}

impl Page {
    /// The only page of an unpaginated template.
    pub fn single() -> Self {
        Self::default()
    }

    /// Page `index` with extra `data`.
    pub fn new(index: usize, data: Data) -> Self {
        Self {
            index,
            data,
        }
    }
}

/// Per-template record accumulated across the phases of a cache pass.
pub struct MapEntry<T> {
    /// Unique template key
    pub input_path: String,
    /// The template itself
    pub template: Arc<T>,
    /// Data merged from layouts and front matter
    pub data: Data,
    /// Date for date-ordered collections
    pub date: Option<NaiveDateTime>,
    /// Resolved pages; `None` until the URL phase reaches this entry
    pub pages: Option<Vec<Page>>,
    /// URL of the first page
    pub url: Option<String>,
    /// Output file of the first page
    pub output_path: Option<PathBuf>,
    /// Rendered content of the first page
    pub template_content: Option<String>,
    /// Rendered content of every page, in page order
    pub paged_template_content: Vec<String>,
    /// Distinct data paths read while rendering
    pub consumed: Vec<String>,
}

impl<T> MapEntry<T> {
    /// Entry for a template that has been through the first stage.
    pub fn new(mapped: MappedTemplate, template: Arc<T>) -> Self {
        Self {
            input_path: mapped.input_path,
            template,
            data: mapped.data,
            date: mapped.date,
            pages: None,
            url: None,
            output_path: None,
            template_content: None,
            paged_template_content: Vec::new(),
            consumed: Vec::new(),
        }
    }

    /// Tags under `tags_key`, which may hold one value or a list.
    ///
    /// Numbers and booleans are tags too, in their string form.
    pub fn tags(&self, tags_key: &str) -> Vec<String> {
        match self.data.get(tags_key) {
            Some(Value::Array(tags)) => tags.iter().filter_map(tag_name).collect(),
            Some(tag) => tag_name(tag).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Whether the entry carries `tag`.
    pub fn has_tag(&self, tags_key: &str, tag: &str) -> bool {
        self.tags(tags_key).iter().any(|t| t == tag)
    }

    /// Whether the entry declares pagination under `pagination_key`.
    pub fn is_paginated(&self, pagination_key: &str) -> bool {
        self.data.contains_key(pagination_key)
    }

    /// Drop everything a cache pass computes, keeping the first-stage data.
    pub(crate) fn reset_pass(&mut self) {
        self.pages = None;
        self.url = None;
        self.output_path = None;
        self.template_content = None;
        self.paged_template_content.clear();
        self.consumed.clear();
    }

    /// Template-facing representation used inside collections.
    pub fn to_json(&self) -> Value {
        json!({
            "inputPath": self.input_path,
            "url": self.url,
            "outputPath": self.output_path.as_ref().map(|p| p.display().to_string()),
            "date": self.date.map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string()),
            "data": self.data,
            "templateContent": self.template_content,
        })
    }
}

impl<T> InputPath for MapEntry<T> {
    fn input_path(&self) -> &str {
        &self.input_path
    }
}

impl<T> fmt::Debug for MapEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapEntry")
            .field("input_path", &self.input_path)
            .field("date", &self.date)
            .field("pages", &self.pages.as_ref().map(Vec::len))
            .field("url", &self.url)
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

fn tag_name(value: &Value) -> Option<String> {
    match value {
        Value::String(tag) => Some(tag.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
