//! Cache pass behavior of the template map over in-memory templates.

use anyhow::Result;
use serde_json::json;
use sitegraph::core::SiteError;
use sitegraph::map::{TemplateMap, user_collection};
use sitegraph::test_utils::{StubTemplate, init_test_logging};

fn paths<'a>(entries: impl IntoIterator<Item = &'a sitegraph::map::MapEntry<StubTemplate>>) -> Vec<String> {
    entries.into_iter().map(|entry| entry.input_path.clone()).collect()
}

#[tokio::test]
async fn test_tag_collections() -> Result<()> {
    init_test_logging(None);
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./a.md").with_tags(&["post"]).arc()).await?;
    map.add_template(StubTemplate::new("./b.md").with_tags(&["post", "featured"]).arc()).await?;
    map.add_template(StubTemplate::new("./index.md").arc()).await?;
    map.cache().await?;

    let collections = map.collections_data();
    assert_eq!(collections.names().collect::<Vec<_>>(), vec!["all", "featured", "post"]);
    assert_eq!(collections.get("all"), Some(&[0, 1, 2][..]));
    assert_eq!(collections.get("post"), Some(&[0, 1][..]));
    assert_eq!(collections.get("featured"), Some(&[1][..]));
    Ok(())
}

#[tokio::test]
async fn test_numeric_tags_form_collections() -> Result<()> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./a.md").with_data(json!({"tags": 2024})).arc()).await?;
    map.add_template(StubTemplate::new("./b.md").with_data(json!({"tags": [2024, "post"]})).arc()).await?;
    map.cache().await?;

    let collections = map.collections_data();
    assert_eq!(collections.get("2024"), Some(&[0, 1][..]));
    assert_eq!(collections.get("post"), Some(&[1][..]));
    Ok(())
}

#[tokio::test]
async fn test_collection_reads_are_attributed_to_reader() -> Result<()> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./index.md").reading(&["post"]).arc()).await?;
    map.add_template(StubTemplate::new("./a.md").with_tags(&["post"]).arc()).await?;
    map.add_template(StubTemplate::new("./b.md").with_tags(&["post"]).arc()).await?;
    map.cache().await?;

    let index = map.entry("./index.md").unwrap();
    assert_eq!(index.template_content.as_deref(), Some("[post:./a.md,./b.md]"));
    assert_eq!(index.consumed, vec!["collections.post"]);

    let dependencies = map.dependencies();
    assert_eq!(
        dependencies.dependencies(),
        &[
            ("./index.md".to_string(), "./a.md".to_string()),
            ("./index.md".to_string(), "./b.md".to_string()),
        ]
    );
    assert!(map.entry("./a.md").unwrap().consumed.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_undefined_collection_read_is_not_recorded() -> Result<()> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./index.md").reading(&["missing"]).arc()).await?;
    map.cache().await?;

    assert!(map.dependencies().is_empty());
    assert!(map.entry("./index.md").unwrap().consumed.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sorted_map_puts_read_templates_first() -> Result<()> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./index.md").reading(&["post"]).arc()).await?;
    map.add_template(StubTemplate::new("./about.md").arc()).await?;
    map.add_template(StubTemplate::new("./a.md").with_tags(&["post"]).arc()).await?;
    map.add_template(StubTemplate::new("./b.md").with_tags(&["post"]).arc()).await?;
    map.cache().await?;

    assert_eq!(paths(map.get_sorted_map()?), vec!["./about.md", "./b.md", "./a.md", "./index.md"]);
    Ok(())
}

#[tokio::test]
async fn test_cycle_surfaces_from_sorted_map() -> Result<()> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./a.md").with_tags(&["x"]).reading(&["y"]).arc()).await?;
    map.add_template(StubTemplate::new("./b.md").with_tags(&["y"]).reading(&["x"]).arc()).await?;
    map.cache().await?;

    let err = map.get_sorted_map().unwrap_err();
    match err.downcast_ref::<SiteError>() {
        Some(SiteError::CircularDependency {
            chain,
        }) => {
            assert!(chain.contains("./a.md"));
            assert!(chain.contains("./b.md"));
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_user_collection_sees_whole_map() -> Result<()> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./drafts/x.md").arc()).await?;
    map.add_template(StubTemplate::new("./posts/one.md").with_data(serde_json::json!({"date": "2024-03-01"})).arc())
        .await?;
    map.add_template(StubTemplate::new("./posts/two.md").with_data(serde_json::json!({"date": "2024-01-01"})).arc())
        .await?;
    map.add_template(StubTemplate::new("./archive.md").reading(&["posts"]).arc()).await?;
    map.add_collection(
        "posts",
        user_collection(|collection| {
            let mut posts = collection.get_filtered_by_glob("posts/*.md").unwrap_or_default();
            posts.sort_by(|a, b| a.date.cmp(&b.date));
            posts
        }),
    );
    map.cache().await?;

    assert_eq!(map.collections_data().get("posts"), Some(&[2, 1][..]));
    let archive = map.entry("./archive.md").unwrap();
    assert_eq!(archive.template_content.as_deref(), Some("[posts:./posts/two.md,./posts/one.md]"));
    Ok(())
}

#[tokio::test]
async fn test_pagination_over_collection_runs_after_collections() -> Result<()> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./tags.md").paginating_over("post").arc()).await?;
    map.add_template(StubTemplate::new("./a.md").with_tags(&["post"]).arc()).await?;
    map.add_template(StubTemplate::new("./b.md").with_tags(&["post"]).arc()).await?;
    map.cache().await?;

    let tags = map.entry("./tags.md").unwrap();
    assert_eq!(tags.pages.as_ref().map(Vec::len), Some(2));
    assert_eq!(tags.url.as_deref(), Some("/tags/"));
    assert_eq!(tags.paged_template_content.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_pagination_without_pages_skips_content() -> Result<()> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./tags.md").paginated(0).reading(&["all"]).arc()).await?;
    map.cache().await?;

    let tags = map.entry("./tags.md").unwrap();
    assert_eq!(tags.pages.as_ref().map(Vec::len), Some(0));
    assert!(tags.url.is_none());
    assert!(tags.template_content.is_none());
    assert!(map.dependencies().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_recache_discards_previous_pass() -> Result<()> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./index.md").reading(&["post"]).arc()).await?;
    map.add_template(StubTemplate::new("./a.md").with_tags(&["post"]).arc()).await?;
    map.cache().await?;
    assert_eq!(map.dependencies().dependencies().len(), 1);

    map.add_template(StubTemplate::new("./b.md").with_tags(&["post"]).arc()).await?;
    assert!(!map.is_cached());
    map.cache().await?;

    assert_eq!(map.dependencies().dependencies().len(), 2);
    assert_eq!(map.entry("./index.md").unwrap().consumed, vec!["collections.post"]);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_input_path_is_rejected() -> Result<()> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./a.md").arc()).await?;
    assert!(map.add_template(StubTemplate::new("./a.md").arc()).await.is_err());
    assert_eq!(map.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_collections_snapshot_without_cache() -> Result<()> {
    let mut map = TemplateMap::new();
    map.add_template(StubTemplate::new("./a.md").with_tags(&["post"]).arc()).await?;
    map.add_collection("everything", user_collection(|collection| collection.get_all()));

    let snapshot = map.collections_snapshot();
    assert_eq!(snapshot.get("post"), Some(&[0][..]));
    assert_eq!(snapshot.get("everything"), Some(&[0][..]));
    assert!(!map.is_cached());
    Ok(())
}
