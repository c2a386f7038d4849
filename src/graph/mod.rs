//! Build-wide data dependency graph.
//!
//! Nodes are templates, includes (layouts) and data paths, keyed by a unique
//! string. An edge `A → B` means "A depends on B": A must be rebuilt when B
//! changes.
//! [`DataGraph::consumers_of`] answers the incremental question "which
//! templates have to be rebuilt when this node changes?".
//!
//! Three kinds of edges are recorded:
//! - structural: a template or include depends on an include it uses
//! - data sources: a template contributes to a data path (e.g. a collection)
//! - data consumers: a template reads a data path
//!
//! The graph is populated from a cached [`TemplateMap`] by
//! [`populate_from_map`]. Layout chains are resolved concurrently and the
//! results are applied to the graph in map order under one lock, so the
//! insertion order (and therefore query order) is stable between runs.

pub mod proxy;

use anyhow::Result;
use futures::future::try_join_all;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;

use crate::constants::COLLECTIONS_KEY;
use crate::core::SiteError;
use crate::map::TemplateMap;
use crate::templating::Template;

/// Classification of a graph node.
///
/// Fixed at first insertion; later insertions under another kind keep the
/// original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A content template.
    Template,
    /// A layout or other file pulled in by templates.
    Include,
    /// A dotted data path such as `collections.blog`.
    Path,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::Include => write!(f, "include"),
            Self::Path => write!(f, "path"),
        }
    }
}

#[derive(Debug, Clone)]
struct GraphNode {
    key: String,
    kind: NodeKind,
}

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is on the current DFS path.
    Gray,
    /// Node and all of its dependants have been emitted.
    Black,
}

/// Directed graph of templates, includes and data paths.
#[derive(Debug, Default)]
pub struct DataGraph {
    graph: DiGraph<GraphNode, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl DataGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if it doesn't already exist. An existing node keeps its kind.
    fn ensure_node(&mut self, key: &str, kind: NodeKind) -> NodeIndex {
        if let Some(&index) = self.node_map.get(key) {
            index
        } else {
            let index = self.graph.add_node(GraphNode {
                key: key.to_string(),
                kind,
            });
            self.node_map.insert(key.to_string(), index);
            index
        }
    }

    /// Record that `from` depends on `to`, skipping duplicates.
    fn add_dependency(&mut self, from: NodeIndex, to: NodeIndex) {
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Record that `source` (of kind `source_kind`) uses the include `target`.
    ///
    /// Changing the include rebuilds its users.
    pub fn add_structural_edge(&mut self, source: &str, target: &str, source_kind: NodeKind) {
        let source = self.ensure_node(source, source_kind);
        let target = self.ensure_node(target, NodeKind::Include);
        self.add_dependency(source, target);
    }

    /// Record that `template` contributes to the data at `data_path`.
    pub fn add_data_source(&mut self, template: &str, data_path: &str) {
        let template = self.ensure_node(template, NodeKind::Template);
        let path = self.ensure_node(data_path, NodeKind::Path);
        self.add_dependency(path, template);
    }

    /// Record that `template` reads the data at `data_path`.
    pub fn add_data_consumer(&mut self, template: &str, data_path: &str) {
        let template = self.ensure_node(template, NodeKind::Template);
        let path = self.ensure_node(data_path, NodeKind::Path);
        self.add_dependency(template, path);
    }

    /// Record everything known about one map entry.
    ///
    /// `layouts` is the template's layout chain, innermost first. `consumed`
    /// are the data paths it read and `collections` the collections it
    /// belongs to.
    pub fn add_template(
        &mut self,
        input_path: &str,
        layouts: &[String],
        consumed: &[String],
        collections: &[&str],
    ) {
        self.ensure_node(input_path, NodeKind::Template);

        let mut user = (input_path, NodeKind::Template);
        for layout in layouts {
            self.add_structural_edge(user.0, layout, user.1);
            user = (layout.as_str(), NodeKind::Include);
        }

        for path in consumed {
            self.add_data_consumer(input_path, path);
        }

        for name in collections {
            self.add_data_source(input_path, &format!("{COLLECTIONS_KEY}.{name}"));
        }
    }

    /// Whether a node with this key exists.
    pub fn has_node(&self, key: &str) -> bool {
        self.node_map.contains_key(key)
    }

    /// The kind a node was first inserted with.
    pub fn kind_of(&self, key: &str) -> Option<NodeKind> {
        self.node_map.get(key).map(|&index| self.graph[index].kind)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Node keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(|node| node.key.as_str())
    }

    /// Templates that must be rebuilt when `key` changes.
    ///
    /// Walks everything that transitively depends on `key`, each dependant
    /// emitted before the nodes it depends on, then keeps template nodes only.
    /// `key` itself is excluded.
    ///
    /// # Errors
    ///
    /// [`SiteError::UnknownNode`] if `key` was never inserted and
    /// [`SiteError::CircularDependency`] if the walk meets a cycle.
    pub fn consumers_of(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .dependants_of(key)?
            .into_iter()
            .filter(|node| self.kind_of(node) == Some(NodeKind::Template))
            .collect())
    }

    /// Every node that transitively depends on `key`, of any kind.
    pub fn dependants_of(&self, key: &str) -> Result<Vec<String>> {
        let &start = self.node_map.get(key).ok_or_else(|| SiteError::UnknownNode {
            key: key.to_string(),
        })?;

        let mut colors: HashMap<NodeIndex, Color> = HashMap::new();
        let mut path: Vec<NodeIndex> = Vec::new();
        let mut emitted: Vec<NodeIndex> = Vec::new();
        self.visit_dependants(start, &mut colors, &mut path, &mut emitted)?;

        Ok(emitted
            .into_iter()
            .filter(|&index| index != start)
            .map(|index| self.graph[index].key.clone())
            .collect())
    }

    /// Post-order DFS over incoming edges.
    fn visit_dependants(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
        emitted: &mut Vec<NodeIndex>,
    ) -> Result<()> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for dependant in self.dependants_in_order(node) {
            match colors.get(&dependant).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    let start = path.iter().position(|&n| n == dependant).unwrap_or(0);
                    let mut cycle: Vec<&str> =
                        path[start..].iter().map(|&n| self.graph[n].key.as_str()).collect();
                    cycle.push(&self.graph[dependant].key);
                    return Err(SiteError::CircularDependency {
                        chain: cycle.join(" → "),
                    }
                    .into());
                }
                Color::White => self.visit_dependants(dependant, colors, path, emitted)?,
                Color::Black => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        emitted.push(node);
        Ok(())
    }

    /// Direct dependants of `node` in edge insertion order.
    fn dependants_in_order(&self, node: NodeIndex) -> Vec<NodeIndex> {
        // petgraph lists neighbors most recent first
        let mut dependants: Vec<NodeIndex> =
            self.graph.neighbors_directed(node, Direction::Incoming).collect();
        dependants.reverse();
        dependants
    }
}

/// Populate `graph` from every entry of `map`, caching the map first if needed.
///
/// Layout chains are resolved concurrently; graph mutation happens under the
/// lock in map order.
pub async fn populate_from_map<T: Template>(
    graph: &Mutex<DataGraph>,
    map: &mut TemplateMap<T>,
) -> Result<()> {
    if !map.is_cached() {
        map.cache().await?;
    }

    let map = &*map;
    let layout_key = map.keys().layout.as_str();
    let chains = try_join_all(map.entries().iter().map(|entry| async move {
        if entry.data.contains_key(layout_key) {
            entry.template.get_layout_chain().await
        } else {
            Ok(Vec::new())
        }
    }))
    .await?;

    let mut graph = graph.lock().await;
    for (index, (entry, layouts)) in map.entries().iter().zip(&chains).enumerate() {
        let collections = map.collections_data().memberships(index);
        graph.add_template(&entry.input_path, layouts, &entry.consumed, &collections);
    }

    tracing::debug!(
        "Dependency graph holds {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    Ok(())
}
