//! Print templates in build order.

use anyhow::Result;
use clap::Args;

use super::CliConfig;

/// Print every template in build order, one `input path<TAB>url` per line.
///
/// Templates whose content others read come before their readers. Templates
/// that produce no pages print `-` as their URL.
#[derive(Args, Debug)]
pub struct OrderCommand {
    /// Print input paths only.
    #[arg(long)]
    paths_only: bool,
}

impl OrderCommand {
    /// Execute the command.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let site = config.load_site().await?;
        for entry in site.order()? {
            if self.paths_only {
                println!("{}", entry.input_path);
            } else {
                println!("{}\t{}", entry.input_path, entry.url.as_deref().unwrap_or("-"));
            }
        }
        Ok(())
    }
}
