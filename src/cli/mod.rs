//! Command-line interface for sitegraph.
//!
//! Every command loads the site under `--input`, runs a full cache pass and
//! builds the dependency graph before answering.
//!
//! # Available Commands
//!
//! - `order` - print templates in build order with their URLs
//! - `consumers` - print the templates to rebuild when a file or data path changes
//! - `render` - print the pages of one template wrapped in its layouts
//!
//! # Global Options
//!
//! - `--input` - site root (default: current directory)
//! - `--config` - config file (default: `<input>/sitegraph.toml`, or `SITEGRAPH_CONFIG`)
//! - `--verbose` - enable debug output
//! - `--quiet` - suppress all output except errors
//!
//! ```bash
//! sitegraph --input site order
//! sitegraph --input site consumers ./_includes/base.tera
//! sitegraph --input site render ./posts/first.md
//! ```

mod consumers;
mod order;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::SiteConfig;
use crate::constants::CONFIG_PATH_ENV;
use crate::site::Site;

/// Runtime configuration derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log level, `None` to disable logging. `RUST_LOG` takes precedence.
    pub log_level: Option<String>,
    /// Site root.
    pub input_dir: PathBuf,
    /// Explicit config file.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Install the tracing subscriber. Only the first call in a process has any effect.
    pub fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if let Some(level) = &self.log_level {
            EnvFilter::new(format!("sitegraph={level}"))
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    /// Load the site and run a full build.
    pub async fn load_site(&self) -> Result<Site> {
        let config = SiteConfig::load(&self.input_dir, self.config_path.as_deref()).await?;
        let mut site = Site::load(&self.input_dir, config).await?;
        site.build().await?;
        Ok(site)
    }
}

/// Incremental dependency inspector for static sites.
#[derive(Parser)]
#[command(
    name = "sitegraph",
    about = "Inspect build order and rebuild dependencies of a static site",
    version,
    long_about = "sitegraph discovers the templates of a static site, resolves their layouts and collections, and reports which templates depend on which files and data."
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Site root containing templates, includes and data.
    #[arg(short, long, global = true, default_value = ".")]
    input: PathBuf,

    /// Path to the config file.
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Enable debug output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print templates in build order.
    ///
    /// See [`order::OrderCommand`].
    Order(order::OrderCommand),

    /// Print templates that consume a node.
    ///
    /// See [`consumers::ConsumersCommand`].
    Consumers(consumers::ConsumersCommand),

    /// Render one template with its layouts.
    ///
    /// See [`render::RenderCommand`].
    Render(render::RenderCommand),
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            input_dir: self.input.clone(),
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        match self.command {
            Commands::Order(cmd) => cmd.execute(&config).await,
            Commands::Consumers(cmd) => cmd.execute(&config).await,
            Commands::Render(cmd) => cmd.execute(&config).await,
        }
    }
}
