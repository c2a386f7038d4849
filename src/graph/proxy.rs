//! Read-instrumented views over data.
//!
//! [`Instrumented`] wraps any keyed store and reports each *defined* value read
//! through it. [`DataProxy`] applies the same idea to a dotted path inside a
//! JSON document: reads of the target's direct properties are reported either
//! as `target.prop` (children mode) or as `target` itself.
//!
//! Reads of absent or `null` values are never reported, and the wrappers never
//! mutate the data they expose.

use anyhow::Result;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::core::SiteError;

/// A keyed store an [`Instrumented`] view can read through.
pub trait Lookup {
    /// Type of the values stored under each key.
    type Value: ?Sized;

    /// The value under `key`, or `None` when it is absent or undefined.
    fn lookup(&self, key: &str) -> Option<&Self::Value>;
}

impl Lookup for serde_json::Map<String, Value> {
    type Value = Value;

    fn lookup(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|v| !v.is_null())
    }
}

impl Lookup for Value {
    type Value = Value;

    fn lookup(&self, key: &str) -> Option<&Value> {
        let value = match self {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        value.filter(|v| !v.is_null())
    }
}

impl<V> Lookup for HashMap<String, V> {
    type Value = V;

    fn lookup(&self, key: &str) -> Option<&V> {
        self.get(key)
    }
}

impl<V> Lookup for BTreeMap<String, V> {
    type Value = V;

    fn lookup(&self, key: &str) -> Option<&V> {
        self.get(key)
    }
}

/// A view over `M` that calls `on_read(key, value)` for every defined read.
pub struct Instrumented<'a, M: ?Sized, F> {
    inner: &'a M,
    on_read: F,
}

impl<'a, M, F> Instrumented<'a, M, F>
where
    M: Lookup + ?Sized,
    F: Fn(&str, &M::Value),
{
    /// Wrap `inner`, reporting reads to `on_read`.
    pub fn new(inner: &'a M, on_read: F) -> Self {
        Self {
            inner,
            on_read,
        }
    }

    /// Read `key`, reporting it if the value is defined.
    pub fn get(&self, key: &str) -> Option<&'a M::Value> {
        let value = self.inner.lookup(key)?;
        (self.on_read)(key, value);
        Some(value)
    }

    /// Whether `key` is defined. Not reported as a read.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lookup(key).is_some()
    }

    /// The wrapped store, for reads that must not be reported.
    pub fn inner(&self) -> &'a M {
        self.inner
    }
}

/// Resolve a dotted `path` inside `root`. An empty path resolves to `root`.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    split_path(path).try_fold(root, |current, segment| current.lookup(segment))
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|segment| !segment.is_empty())
}

/// Instrumented access to a dotted target path inside a JSON document.
///
/// ```
/// use serde_json::json;
/// use sitegraph::graph::proxy::DataProxy;
/// use std::cell::RefCell;
///
/// let data = json!({ "collections": { "all": [1, 2], "blog": [1] } });
/// let seen = RefCell::new(Vec::new());
/// let proxy = DataProxy::new(&data, "collections", true, |path| {
///     seen.borrow_mut().push(path.to_string())
/// })
/// .unwrap();
///
/// proxy.get("collections.blog");
/// proxy.get("collections.missing");
/// assert_eq!(*seen.borrow(), vec!["collections.blog"]);
/// ```
pub struct DataProxy<'a, F> {
    root: &'a Value,
    target: String,
    target_len: usize,
    target_children: bool,
    on_read: F,
}

impl<'a, F: Fn(&str)> DataProxy<'a, F> {
    /// Build a proxy over `target` inside `root`.
    ///
    /// An empty target makes the root itself the target.
    ///
    /// # Errors
    ///
    /// [`SiteError::UnresolvedTarget`] if `target` does not resolve.
    pub fn new(root: &'a Value, target: &str, target_children: bool, on_read: F) -> Result<Self> {
        if resolve_path(root, target).is_none() {
            return Err(SiteError::UnresolvedTarget {
                path: target.to_string(),
            }
            .into());
        }

        let segments: Vec<&str> = split_path(target).collect();
        Ok(Self {
            root,
            target: segments.join("."),
            target_len: segments.len(),
            target_children,
            on_read,
        })
    }

    /// The normalized dotted target path.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Read a dotted path from the document root.
    ///
    /// Passing through a defined direct property of the target reports it.
    /// Reading the target itself, or anything outside it, reports nothing.
    pub fn get(&self, path: &str) -> Option<&'a Value> {
        let segments: Vec<&str> = split_path(path).collect();
        let mut current = self.root;

        for (depth, segment) in segments.iter().enumerate() {
            current = if depth == self.target_len && self.within_target(&segments[..depth]) {
                Instrumented::new(current, |key: &str, _: &Value| self.report(key)).get(segment)?
            } else {
                current.lookup(segment)?
            };
        }

        Some(current)
    }

    fn within_target(&self, prefix: &[&str]) -> bool {
        split_path(&self.target).eq(prefix.iter().copied())
    }

    fn report(&self, key: &str) {
        if !self.target_children {
            (self.on_read)(&self.target);
        } else if self.target.is_empty() {
            (self.on_read)(key);
        } else {
            (self.on_read)(&format!("{}.{key}", self.target));
        }
    }
}
