//! Per-pass dependency ordering between templates.
//!
//! While a template's content is resolved it is the *active* template, and
//! every collection it reads contributes `(active, consumed.input_path)` edges.
//! After the pass the edge list is topologically sorted; the reversed order puts
//! consumed templates ahead of the templates that read them.
//!
//! [`TemplateDependencies`] is the plain edge list. [`DependencyRecorder`] wraps
//! it for use during a cache pass: [`DependencyRecorder::activate`] hands out an
//! [`ActiveTemplate`] guard that holds the single active-writer cursor for the
//! whole set → resolve → clear window, so concurrent resolutions cannot
//! interleave their attributions.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::SiteError;

/// Anything that names a template by input path.
pub trait InputPath {
    /// The template's input path.
    fn input_path(&self) -> &str;
}

impl InputPath for str {
    fn input_path(&self) -> &str {
        self
    }
}

impl InputPath for String {
    fn input_path(&self) -> &str {
        self.as_str()
    }
}

impl<T: InputPath + ?Sized> InputPath for &T {
    fn input_path(&self) -> &str {
        (**self).input_path()
    }
}

impl<T: InputPath + ?Sized> InputPath for Arc<T> {
    fn input_path(&self) -> &str {
        (**self).input_path()
    }
}

/// Ordered, deduplicated `(active, consumed)` edges for one cache pass.
///
/// An edge `(a, b)` places `a` before `b` in [`sorted_order`](Self::sorted_order).
#[derive(Debug, Clone, Default)]
pub struct TemplateDependencies {
    active: Option<String>,
    edges: Vec<(String, String)>,
}

impl TemplateDependencies {
    /// Create an empty edge list with no active template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute subsequent [`add`](Self::add) calls to `path`.
    pub fn set_active_template(&mut self, path: impl Into<String>) {
        self.active = Some(path.into());
    }

    /// Stop attributing edges; `add` becomes a no-op.
    pub fn clear_active_template(&mut self) {
        self.active = None;
    }

    /// The template edges are currently attributed to.
    pub fn active_template(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Record that the active template consumed each of `consumed`.
    ///
    /// Does nothing without an active template. Edges already present are not
    /// added again, so repeated reads of the same collection collapse.
    pub fn add<I>(&mut self, consumed: I)
    where
        I: IntoIterator,
        I::Item: InputPath,
    {
        let Some(active) = self.active.as_ref() else {
            return;
        };

        for item in consumed {
            let edge = (active.clone(), item.input_path().to_string());
            if !self.edges.contains(&edge) {
                self.edges.push(edge);
            }
        }
    }

    /// The accumulated edges in insertion order.
    pub fn dependencies(&self) -> &[(String, String)] {
        &self.edges
    }

    /// Whether no edges were recorded.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Drop all edges and the active template.
    pub fn reset(&mut self) {
        self.active = None;
        self.edges.clear();
    }

    /// Topologically sort the nodes named by the edge list.
    ///
    /// Nodes are visited from the last first-seen node backwards with a depth
    /// first walk over outgoing edges, which keeps independent groups in the
    /// order they were recorded.
    ///
    /// # Errors
    ///
    /// [`SiteError::CircularDependency`] if the edges contain a cycle.
    pub fn sorted_order(&self) -> Result<Vec<String>> {
        let mut nodes: Vec<&str> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();

        for (from, to) in &self.edges {
            for node in [from.as_str(), to.as_str()] {
                if !index.contains_key(node) {
                    index.insert(node, nodes.len());
                    nodes.push(node);
                }
            }
            outgoing.entry(from.as_str()).or_default().push(to.as_str());
        }

        let mut sort = TopoSort {
            index: &index,
            outgoing: &outgoing,
            visited: vec![false; nodes.len()],
            sorted: vec![""; nodes.len()],
            cursor: nodes.len(),
            path: Vec::new(),
        };

        for i in (0..nodes.len()).rev() {
            if !sort.visited[i] {
                sort.visit(nodes[i])?;
            }
        }

        Ok(sort.sorted.into_iter().map(str::to_string).collect())
    }

    /// [`sorted_order`](Self::sorted_order) reversed: consumed templates first.
    pub fn reverse_sorted_order(&self) -> Result<Vec<String>> {
        let mut sorted = self.sorted_order()?;
        sorted.reverse();
        Ok(sorted)
    }
}

struct TopoSort<'a> {
    index: &'a HashMap<&'a str, usize>,
    outgoing: &'a HashMap<&'a str, Vec<&'a str>>,
    visited: Vec<bool>,
    sorted: Vec<&'a str>,
    cursor: usize,
    path: Vec<&'a str>,
}

impl<'a> TopoSort<'a> {
    fn visit(&mut self, node: &'a str) -> Result<()> {
        if let Some(start) = self.path.iter().position(|n| *n == node) {
            let mut cycle: Vec<&str> = self.path[start..].to_vec();
            cycle.push(node);
            return Err(SiteError::CircularDependency {
                chain: cycle.join(" → "),
            }
            .into());
        }

        let i = self.index[node];
        if self.visited[i] {
            return Ok(());
        }
        self.visited[i] = true;

        if let Some(children) = self.outgoing.get(node) {
            self.path.push(node);
            for child in children.iter().rev() {
                self.visit(child)?;
            }
            self.path.pop();
        }

        self.cursor -= 1;
        self.sorted[self.cursor] = node;
        Ok(())
    }
}

/// Shared edge list plus the exclusive active-writer cursor for a cache pass.
#[derive(Debug, Default)]
pub struct DependencyRecorder {
    dependencies: Mutex<TemplateDependencies>,
    cursor: tokio::sync::Mutex<()>,
}

impl DependencyRecorder {
    /// Create a recorder with an empty edge list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `path` the active template until the returned guard is dropped.
    ///
    /// Waits while another template holds the cursor.
    pub async fn activate(&self, path: &str) -> ActiveTemplate<'_> {
        let cursor = self.cursor.lock().await;
        self.with_dependencies(|deps| deps.set_active_template(path));
        tracing::trace!("Active template set to {}", path);

        ActiveTemplate {
            recorder: self,
            path: path.to_string(),
            consumed: Mutex::new(Vec::new()),
            _cursor: cursor,
        }
    }

    /// A copy of the edges recorded so far.
    pub fn snapshot(&self) -> TemplateDependencies {
        self.with_dependencies(|deps| deps.clone())
    }

    /// Discard all recorded edges.
    pub fn reset(&self) {
        self.with_dependencies(TemplateDependencies::reset);
    }

    fn with_dependencies<R>(&self, f: impl FnOnce(&mut TemplateDependencies) -> R) -> R {
        let mut deps = self.dependencies.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut deps)
    }
}

/// Guard for one template's active-writer window.
///
/// Dropping it clears the active template and releases the cursor.
pub struct ActiveTemplate<'a> {
    recorder: &'a DependencyRecorder,
    path: String,
    consumed: Mutex<Vec<String>>,
    _cursor: tokio::sync::MutexGuard<'a, ()>,
}

impl ActiveTemplate<'_> {
    /// The template reads are attributed to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Record a read of `data_path` that yielded `consumed` templates.
    pub fn record<I>(&self, data_path: &str, consumed: I)
    where
        I: IntoIterator,
        I::Item: InputPath,
    {
        self.recorder.with_dependencies(|deps| deps.add(consumed));

        let mut paths = self.consumed.lock().unwrap_or_else(PoisonError::into_inner);
        if !paths.iter().any(|p| p == data_path) {
            tracing::trace!("{} consumed {}", self.path, data_path);
            paths.push(data_path.to_string());
        }
    }

    /// Close the window and return the distinct data paths read during it.
    pub fn finish(mut self) -> Vec<String> {
        std::mem::take(self.consumed.get_mut().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Drop for ActiveTemplate<'_> {
    fn drop(&mut self) {
        self.recorder.with_dependencies(TemplateDependencies::clear_active_template);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(deps: &TemplateDependencies) -> Vec<String> {
        deps.sorted_order().unwrap()
    }

    #[test]
    fn test_add_without_active_template_is_noop() {
        let mut deps = TemplateDependencies::new();
        deps.add(["navigation.md"]);
        assert!(deps.is_empty());
        assert!(sorted(&deps).is_empty());
    }

    #[test]
    fn test_one_edge() {
        let mut deps = TemplateDependencies::new();
        deps.set_active_template("parent.md");
        deps.add(["navigation.md"]);
        assert_eq!(sorted(&deps), vec!["parent.md", "navigation.md"]);
    }

    #[test]
    fn test_duplicates_in_one_call_collapse() {
        let mut deps = TemplateDependencies::new();
        deps.set_active_template("parent.md");
        deps.add(["navigation.md", "navigation.md"]);
        assert_eq!(deps.dependencies().len(), 1);
    }

    #[test]
    fn test_duplicates_across_calls_collapse() {
        let mut deps = TemplateDependencies::new();
        deps.set_active_template("parent.md");
        deps.add(["navigation.md"]);
        deps.add(["navigation.md"]);
        assert_eq!(deps.dependencies().len(), 1);
    }

    #[test]
    fn test_two_active_templates_keep_recorded_order() {
        let mut deps = TemplateDependencies::new();
        deps.set_active_template("parent.md");
        deps.add(["navigation.md", "navigation2.md"]);
        deps.set_active_template("parent-b.md");
        deps.add(["navigation-b.md", "navigation-2b.md"]);
        assert_eq!(
            sorted(&deps),
            vec![
                "parent.md",
                "navigation.md",
                "navigation2.md",
                "parent-b.md",
                "navigation-b.md",
                "navigation-2b.md"
            ]
        );
    }

    #[test]
    fn test_connected_chain() {
        let mut deps = TemplateDependencies::new();
        deps.set_active_template("parent.md");
        deps.add(["navigation.md", "navigation2.md"]);
        deps.set_active_template("navigation.md");
        deps.add(["child.md"]);
        assert_eq!(sorted(&deps), vec!["parent.md", "navigation.md", "navigation2.md", "child.md"]);
        assert_eq!(
            deps.reverse_sorted_order().unwrap(),
            vec!["child.md", "navigation2.md", "navigation.md", "parent.md"]
        );
    }

    #[test]
    fn test_three_node_cycle_fails() {
        let mut deps = TemplateDependencies::new();
        deps.set_active_template("a.md");
        deps.add(["b.md"]);
        deps.set_active_template("b.md");
        deps.add(["c.md"]);
        deps.set_active_template("c.md");
        deps.add(["a.md"]);

        let err = deps.sorted_order().unwrap_err();
        match err.downcast_ref::<SiteError>() {
            Some(SiteError::CircularDependency {
                chain,
            }) => {
                assert!(chain.contains("a.md"));
                assert!(chain.contains("b.md"));
                assert!(chain.contains("c.md"));
            }
            other => panic!("expected a cycle error, got {other:?}"),
        }
        assert!(deps.reverse_sorted_order().is_err());
    }

    #[test]
    fn test_self_read_is_a_cycle() {
        let mut deps = TemplateDependencies::new();
        deps.set_active_template("feed.md");
        deps.add(["feed.md"]);
        assert!(deps.sorted_order().is_err());
    }

    #[test]
    fn test_clear_active_template() {
        let mut deps = TemplateDependencies::new();
        deps.set_active_template("parent.md");
        deps.clear_active_template();
        deps.add(["navigation.md"]);
        assert!(deps.is_empty());
        assert_eq!(deps.active_template(), None);
    }

    #[tokio::test]
    async fn test_active_template_guard_clears_on_drop() {
        let recorder = DependencyRecorder::new();
        {
            let active = recorder.activate("parent.md").await;
            active.record("collections.nav", ["navigation.md"]);
            active.record("collections.nav", ["navigation.md"]);
            assert_eq!(active.finish(), vec!["collections.nav"]);
        }

        let deps = recorder.snapshot();
        assert_eq!(deps.active_template(), None);
        assert_eq!(
            deps.dependencies(),
            &[("parent.md".to_string(), "navigation.md".to_string())]
        );
    }

    #[tokio::test]
    async fn test_concurrent_windows_do_not_interleave() {
        let recorder = DependencyRecorder::new();

        let first = async {
            let active = recorder.activate("a.md").await;
            tokio::task::yield_now().await;
            active.record("collections.x", ["x.md"]);
            tokio::task::yield_now().await;
            active.record("collections.y", ["y.md"]);
        };
        let second = async {
            let active = recorder.activate("b.md").await;
            active.record("collections.z", ["z.md"]);
        };
        futures::join!(first, second);

        let deps = recorder.snapshot();
        assert_eq!(
            deps.dependencies(),
            &[
                ("a.md".to_string(), "x.md".to_string()),
                ("a.md".to_string(), "y.md".to_string()),
                ("b.md".to_string(), "z.md".to_string()),
            ]
        );
    }
}
