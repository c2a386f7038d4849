//! Render cache for template output within a single run.
//!
//! Whether a rendered page may be reused depends on every input it read,
//! which is only fully known after the dependency graph has been built, so
//! the cache is disabled unless explicitly enabled. A disabled cache reports
//! every key as absent and fails every lookup.

use anyhow::Result;
use std::collections::HashMap;
use std::fmt;

use crate::core::SiteError;

/// Whether cached output may be reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Never report a hit. Inserts are discarded.
    #[default]
    Disabled,
    /// Store and reuse rendered output.
    Enabled,
}

impl From<bool> for CachePolicy {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}

/// Identifies one rendered page of one template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderCacheKey {
    /// Template input path
    pub input_path: String,
    /// Zero-based page number
    pub page: usize,
}

impl RenderCacheKey {
    /// Key for page `page` of `input_path`.
    pub fn new(input_path: impl Into<String>, page: usize) -> Self {
        Self {
            input_path: input_path.into(),
            page,
        }
    }
}

impl fmt::Display for RenderCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.input_path, self.page)
    }
}

/// Rendered output keyed by template and page.
#[derive(Debug, Default)]
pub struct RenderCache {
    policy: CachePolicy,
    cache: HashMap<RenderCacheKey, String>,
    hits: usize,
    misses: usize,
}

impl RenderCache {
    /// Create an empty cache with the given policy.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// The active policy.
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Whether `key` can be served. Always false when disabled.
    pub fn has(&self, key: &RenderCacheKey) -> bool {
        self.policy == CachePolicy::Enabled && self.cache.contains_key(key)
    }

    /// Cached output for `key`.
    ///
    /// # Errors
    ///
    /// [`SiteError::NotCached`] when the key is absent or the cache is disabled.
    pub fn get(&mut self, key: &RenderCacheKey) -> Result<&str> {
        if self.policy == CachePolicy::Enabled
            && let Some(content) = self.cache.get(key)
        {
            self.hits += 1;
            return Ok(content);
        }

        self.misses += 1;
        Err(SiteError::NotCached {
            key: key.to_string(),
        }
        .into())
    }

    /// Store rendered output. Ignored when disabled.
    pub fn insert(&mut self, key: RenderCacheKey, content: String) {
        if self.policy == CachePolicy::Enabled {
            self.cache.insert(key, content);
        }
    }

    /// Clear all cached content and statistics.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// `(hits, misses)` since the last clear.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}
