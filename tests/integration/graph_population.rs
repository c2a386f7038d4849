//! Dependency graph populated from a cached template map.

use anyhow::Result;
use sitegraph::core::SiteError;
use sitegraph::graph::{DataGraph, NodeKind, populate_from_map};
use sitegraph::map::TemplateMap;
use sitegraph::test_utils::StubTemplate;
use tokio::sync::Mutex;

const LAYOUT: &str = "./_includes/layout.njk";
const BASE: &str = "./_includes/base.njk";

async fn blog() -> Result<(TemplateMap<StubTemplate>, Mutex<DataGraph>)> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./post1.md").with_tags(&["post"]).with_layouts(&[LAYOUT, BASE]).arc())
        .await?;
    map.add_template(StubTemplate::new("./post2.md").with_tags(&["post"]).with_layouts(&[LAYOUT, BASE]).arc())
        .await?;
    map.add_template(StubTemplate::new("./index.md").reading(&["post"]).arc()).await?;
    map.add_template(StubTemplate::new("./about.md").arc()).await?;

    let graph = Mutex::new(DataGraph::new());
    populate_from_map(&graph, &mut map).await?;
    Ok((map, graph))
}

#[tokio::test]
async fn test_layout_chain_consumers() -> Result<()> {
    let (_, graph) = blog().await?;
    let graph = graph.lock().await;

    // index.md reads the posts' content, so it is rebuilt with them
    assert_eq!(graph.consumers_of(LAYOUT)?, vec!["./index.md", "./post1.md", "./post2.md"]);
    assert_eq!(graph.consumers_of(BASE)?, vec!["./index.md", "./post1.md", "./post2.md"]);
    assert_eq!(graph.kind_of(LAYOUT), Some(NodeKind::Include));
    assert_eq!(graph.kind_of(BASE), Some(NodeKind::Include));
    Ok(())
}

#[tokio::test]
async fn test_collection_members_reach_readers() -> Result<()> {
    let (_, graph) = blog().await?;
    let graph = graph.lock().await;

    assert_eq!(graph.consumers_of("collections.post")?, vec!["./index.md"]);
    assert_eq!(graph.consumers_of("./post1.md")?, vec!["./index.md"]);
    assert!(graph.consumers_of("./about.md")?.is_empty());
    assert_eq!(graph.kind_of("collections.post"), Some(NodeKind::Path));
    Ok(())
}

#[tokio::test]
async fn test_populate_caches_map_first() -> Result<()> {
    let (map, _) = blog().await?;
    assert!(map.is_cached());
    assert_eq!(map.entry("./index.md").unwrap().consumed, vec!["collections.post"]);
    Ok(())
}

#[tokio::test]
async fn test_population_is_deterministic() -> Result<()> {
    let (_, first) = blog().await?;
    let (_, second) = blog().await?;
    let first: Vec<String> = first.lock().await.keys().map(str::to_string).collect();
    let second: Vec<String> = second.lock().await.keys().map(str::to_string).collect();
    assert_eq!(first, second);
    assert_eq!(first[0], "./post1.md");
    Ok(())
}

#[tokio::test]
async fn test_unknown_node() -> Result<()> {
    let (_, graph) = blog().await?;
    let err = graph.lock().await.consumers_of("./missing.md").unwrap_err();
    assert_eq!(
        err.downcast_ref::<SiteError>(),
        Some(&SiteError::UnknownNode {
            key: "./missing.md".to_string()
        })
    );
    Ok(())
}
