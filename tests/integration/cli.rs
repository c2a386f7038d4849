//! The `sitegraph` binary.

use anyhow::Result;
use predicates::prelude::*;
use sitegraph::test_utils::SiteEnvironment;

use crate::common::sitegraph_cmd;

#[test]
fn test_order_prints_paths_and_urls() -> Result<()> {
    let env = SiteEnvironment::blog()?;

    sitegraph_cmd(env.path())
        .arg("order")
        .assert()
        .success()
        .stdout("./about.md\t/about/\n./posts/second.md\t/posts/second/\n./posts/first.md\t/posts/first/\n./index.tera\t/\n");
    Ok(())
}

#[test]
fn test_order_paths_only() -> Result<()> {
    let env = SiteEnvironment::blog()?;

    sitegraph_cmd(env.path())
        .args(["order", "--paths-only"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("./about.md\n./posts/second.md\n"));
    Ok(())
}

#[test]
fn test_consumers_of_data_file() -> Result<()> {
    let env = SiteEnvironment::blog()?;

    sitegraph_cmd(env.path())
        .args(["consumers", "./_data/metadata.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("./about.md"))
        .stdout(predicate::str::contains("./posts/first.md"));
    Ok(())
}

#[test]
fn test_consumers_of_unknown_node_fails() -> Result<()> {
    let env = SiteEnvironment::blog()?;

    sitegraph_cmd(env.path())
        .args(["consumers", "./nope.md"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Node does not exist in dependency graph: ./nope.md"));
    Ok(())
}

#[test]
fn test_render_wraps_layouts() -> Result<()> {
    let env = SiteEnvironment::blog()?;

    sitegraph_cmd(env.path())
        .args(["render", "./posts/second.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<title>Example Blog</title>"))
        .stdout(predicate::str::contains("<article>"));
    Ok(())
}

#[test]
fn test_explicit_config_must_exist() -> Result<()> {
    let env = SiteEnvironment::blog()?;

    sitegraph_cmd(env.path())
        .args(["--config", "missing.toml", "order"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.toml"));
    Ok(())
}

#[test]
fn test_invalid_config_is_reported() -> Result<()> {
    let env = SiteEnvironment::blog()?;
    env.create_file("sitegraph.toml", "template_formats = []\n")?;

    sitegraph_cmd(env.path())
        .arg("order")
        .assert()
        .failure()
        .stderr(predicate::str::contains("template_formats"));
    Ok(())
}
