//! Core types shared across sitegraph.
//!
//! Currently this is the error layer: [`SiteError`] for the failure modes of
//! the dependency core and [`ErrorContext`] / [`user_friendly_error`] for
//! presenting them on the command line.

pub mod error;

pub use error::{ErrorContext, SiteError, user_friendly_error};
