//! sitegraph - incremental dependency core for static site builds
//!
//! sitegraph discovers the templates of a site, resolves their layout chains
//! and collections, renders them once while recording which data each template
//! actually reads, and answers the two questions an incremental build needs:
//!
//! - in which order must templates be built so that content read by others is
//!   ready first?
//! - which templates must be rebuilt when a template, layout, data file or
//!   collection changes?
//!
//! # Core Modules
//!
//! - [`graph`] - dependency graph over templates, includes and data paths,
//!   plus the instrumented accessors that record data reads
//! - [`dependencies`] - per-pass `(reader, read)` edges and their topological order
//! - [`layout`] - layout chain resolution, data merging and composed rendering
//! - [`map`] - the template map and its multi-phase cache pass
//! - [`templating`] - the [`Template`](templating::Template) seam, Tera engine,
//!   front matter, global data, file-backed templates and the render cache
//!
//! ## Supporting Modules
//!
//! - [`site`] - discovery and assembly of a site on disk
//! - [`config`] - `sitegraph.toml`
//! - [`core`] - error types and user-facing error formatting
//! - [`cli`] - the `sitegraph` command line
//!
//! # Example
//!
//! ```rust,no_run
//! use sitegraph::config::SiteConfig;
//! use sitegraph::site::Site;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = SiteConfig::load("site".as_ref(), None).await?;
//! let mut site = Site::load("site", config).await?;
//! site.build().await?;
//!
//! for entry in site.order()? {
//!     println!("{} -> {:?}", entry.input_path, entry.url);
//! }
//! println!("{:?}", site.consumers_of("./_includes/base.tera").await?);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod dependencies;
pub mod graph;
pub mod layout;
pub mod map;
pub mod site;
pub mod templating;

// test_utils is available for tests and when the test-utils feature is enabled
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
