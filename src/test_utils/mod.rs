//! Test utilities for sitegraph
//!
//! This module provides helpers shared by unit and integration tests:
//! - [`init_test_logging`] for opt-in tracing output
//! - [`StubTemplate`] and [`StubLayouts`], in-memory implementations of the
//!   template and layout seams
//! - [`SiteEnvironment`], a temporary site directory with a small blog fixture
//!
//! # Example
//!
//! ```rust,no_run
//! use sitegraph::map::TemplateMap;
//! use sitegraph::test_utils::StubTemplate;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut map = TemplateMap::new();
//! map.add_template(StubTemplate::new("./post.md").with_tags(&["post"]).arc()).await?;
//! map.add_template(StubTemplate::new("./index.md").reading(&["post"]).arc()).await?;
//! map.cache().await?;
//! # Ok(())
//! # }
//! ```

pub mod environment;
pub mod stubs;

pub use environment::SiteEnvironment;
pub use stubs::{StubLayouts, StubTemplate, fill, object};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG` when set, otherwise leaves
/// logging off. Only the first call has any effect.
///
/// ```bash
/// RUST_LOG=sitegraph=trace cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
