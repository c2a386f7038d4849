//! Common helpers for sitegraph integration tests

// Not every helper is used by every test file
#![allow(dead_code)]

use anyhow::Result;
use assert_cmd::Command;
use sitegraph::config::SiteConfig;
use sitegraph::site::Site;
use sitegraph::test_utils::SiteEnvironment;
use std::path::Path;

/// The `sitegraph` binary, pointed at `input` with logging off.
pub fn sitegraph_cmd(input: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sitegraph").unwrap();
    cmd.arg("--quiet").arg("--input").arg(input).env_remove("RUST_LOG").env_remove("SITEGRAPH_CONFIG");
    cmd
}

/// Load and build the site in `env` with its own `sitegraph.toml`, if any.
pub async fn build_site(env: &SiteEnvironment) -> Result<Site> {
    let config = SiteConfig::load(env.path(), None).await?;
    let mut site = Site::load(env.path(), config).await?;
    site.build().await?;
    Ok(site)
}

/// Input paths of the site's build order.
pub fn order_paths(site: &Site) -> Result<Vec<String>> {
    Ok(site.order()?.iter().map(|entry| entry.input_path.clone()).collect())
}
