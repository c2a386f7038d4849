//! Sites on disk, from discovery to rendering.

use anyhow::Result;
use sitegraph::core::SiteError;
use sitegraph::test_utils::SiteEnvironment;

use crate::common::{build_site, order_paths};

#[tokio::test]
async fn test_blog_build_order() -> Result<()> {
    let env = SiteEnvironment::blog()?;
    let site = build_site(&env).await?;

    assert_eq!(
        order_paths(&site)?,
        vec!["./about.md", "./posts/second.md", "./posts/first.md", "./index.tera"]
    );
    Ok(())
}

#[tokio::test]
async fn test_layout_change_rebuilds_posts_and_their_readers() -> Result<()> {
    let env = SiteEnvironment::blog()?;
    let site = build_site(&env).await?;

    let consumers = site.consumers_of("./_includes/post.tera").await?;
    assert_eq!(consumers, vec!["./index.tera", "./posts/first.md", "./posts/second.md"]);
    assert!(site.consumers_of("./_includes/nothing.tera").await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_config_collection() -> Result<()> {
    let env = SiteEnvironment::blog()?;
    env.create_file(
        "sitegraph.toml",
        "[collections.recent]\ntag = \"post\"\nsort = \"date\"\nreverse = true\nlimit = 1\n",
    )?;
    env.create_file("recent.tera", "{% for p in collections.recent %}{{ p.data.title }}{% endfor %}")?;
    let site = build_site(&env).await?;

    let recent = site.map().entry("./recent.tera").unwrap();
    assert_eq!(recent.template_content.as_deref().map(str::trim), Some("Second"));
    assert_eq!(recent.consumed, vec!["collections.recent"]);
    assert_eq!(site.consumers_of("collections.recent").await?, vec!["./recent.tera"]);
    Ok(())
}

#[tokio::test]
async fn test_pagination_over_tag_collection() -> Result<()> {
    let env = SiteEnvironment::blog()?;
    env.create_file(
        "tags.tera",
        "---\npagination:\n  data: collections.post\n  size: 1\n  alias: post\n---\n{{ post.data.title }}",
    )?;
    let site = build_site(&env).await?;

    let tags = site.map().entry("./tags.tera").unwrap();
    let content: Vec<&str> = tags.paged_template_content.iter().map(|s| s.trim()).collect();
    assert_eq!(content, vec!["First", "Second"]);
    assert_eq!(tags.url.as_deref(), Some("/tags/"));
    assert!(tags.consumed.is_empty());

    let pages = site.render("./tags.tera").await?;
    assert_eq!(pages.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_pagination_over_own_collection() -> Result<()> {
    let env = SiteEnvironment::new()?;
    env.create_file("a.md", "a")?;
    env.create_file("b.md", "b")?;
    env.create_file(
        "sitemap.md",
        "---\npagination:\n  data: collections.all\n  alias: item\n---\n{{ item.inputPath }}",
    )?;
    let site = build_site(&env).await?;

    assert_eq!(order_paths(&site)?.len(), 3);
    let sitemap = site.map().entry("./sitemap.md").unwrap();
    let content: Vec<&str> = sitemap.paged_template_content.iter().map(|s| s.trim()).collect();
    assert_eq!(content, vec!["./a.md", "./b.md", "./sitemap.md"]);
    assert!(sitemap.consumed.is_empty());
    assert_eq!(site.render("./sitemap.md").await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_layout_reads_collections() -> Result<()> {
    let env = SiteEnvironment::new()?;
    env.create_file(
        "_includes/base.tera",
        "<nav>{% for p in collections.post %}{{ p.data.title }};{% endfor %}</nav>{{ content }}",
    )?;
    env.create_file("a.md", "---\nlayout: base\ntitle: A\ntags: post\n---\nbody A")?;
    env.create_file("b.md", "---\ntitle: B\ntags: post\n---\nbody B")?;
    let site = build_site(&env).await?;

    let pages = site.render("./a.md").await?;
    assert_eq!(pages.len(), 1);
    let page = pages[0].replace('\n', "");
    assert!(page.starts_with("<nav>"), "{page}");
    assert!(page.contains("A;") && page.contains("B;"), "{page}");
    assert!(page.ends_with("</nav>body A"), "{page}");
    Ok(())
}

#[tokio::test]
async fn test_collection_cycle_fails_build() -> Result<()> {
    let env = SiteEnvironment::new()?;
    env.create_file("a.tera", "---\ntags: a\n---\n{{ collections.b | length }}")?;
    env.create_file("b.tera", "---\ntags: b\n---\n{{ collections.a | length }}")?;

    let err = match build_site(&env).await {
        Ok(_) => panic!("expected the build to fail"),
        Err(err) => err,
    };
    assert!(matches!(
        err.downcast_ref::<SiteError>(),
        Some(SiteError::CircularDependency { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_missing_layout_names_template() -> Result<()> {
    let env = SiteEnvironment::new()?;
    env.create_file("_includes/base.tera", "{{ content }}")?;
    env.create_file("page.md", "---\nlayout: bsae\n---\nhi")?;

    let err = match build_site(&env).await {
        Ok(_) => panic!("expected the build to fail"),
        Err(err) => err,
    };
    assert_eq!(
        err.downcast_ref::<SiteError>(),
        Some(&SiteError::LayoutNotFound {
            layout: "bsae".to_string(),
            template: "./page.md".to_string(),
            suggestion: Some("base.tera".to_string()),
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_render_cache_policy() -> Result<()> {
    let env = SiteEnvironment::blog()?;
    let site = build_site(&env).await?;
    site.render("./about.md").await?;
    site.render("./about.md").await?;
    assert_eq!(site.render_cache_stats(), (0, 2));

    env.create_file("sitegraph.toml", "render_cache = true\n")?;
    let site = build_site(&env).await?;
    let first = site.render("./about.md").await?;
    let second = site.render("./about.md").await?;
    assert_eq!(first, second);
    assert_eq!(site.render_cache_stats(), (1, 1));
    Ok(())
}
