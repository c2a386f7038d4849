//! Integration test suite for sitegraph
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **template_map**: cache pass phases over in-memory templates
//! - **graph_population**: dependency graph built from a cached map
//! - **site_build**: sites on disk, from discovery to rendering
//! - **cli**: the `sitegraph` binary

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod graph_population;
mod site_build;
mod template_map;
