//! Print the templates that consume a node.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;

/// Print the templates to rebuild when a node changes.
///
/// A node is a template or layout path as printed by `order`
/// (`./_includes/base.tera`), a global data file (`./_data/site.json`), or a
/// data path (`collections.post`, `metadata`).
#[derive(Args, Debug)]
pub struct ConsumersCommand {
    /// Node key
    node: String,
}

impl ConsumersCommand {
    /// Execute the command.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let site = config.load_site().await?;
        let consumers = site.consumers_of(&self.node).await?;

        if consumers.is_empty() {
            eprintln!("{}", format!("No templates consume {}", self.node).yellow());
        }
        for consumer in consumers {
            println!("{consumer}");
        }
        Ok(())
    }
}
