//! Render one template.

use anyhow::Result;
use clap::Args;

use super::CliConfig;

/// Print every page of a template, wrapped in its layout chain.
#[derive(Args, Debug)]
pub struct RenderCommand {
    /// Input path as printed by `order`, e.g. `./posts/first.md`
    input_path: String,
}

impl RenderCommand {
    /// Execute the command.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let site = config.load_site().await?;
        let pages = site.render(&self.input_path).await?;
        tracing::debug!("Rendered {} page(s) of {}", pages.len(), self.input_path);

        for page in pages {
            print!("{page}");
            if !page.ends_with('\n') {
                println!();
            }
        }
        Ok(())
    }
}
