//! Error handling for sitegraph
//!
//! Two layers, mirroring how the rest of the crate reports failures:
//! - [`SiteError`] - strongly-typed failures raised by the dependency core
//!   (cycles, missing layouts, runaway chains, unresolved data paths)
//! - [`ErrorContext`] - a display wrapper adding suggestions for CLI users
//!
//! Library functions return [`anyhow::Result`]. A [`SiteError`] converted into
//! an [`anyhow::Error`] stays recoverable with `downcast_ref::<SiteError>()`,
//! which is how both tests and [`user_friendly_error`] inspect it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use sitegraph::core::{SiteError, user_friendly_error};
//!
//! fn sort() -> anyhow::Result<Vec<String>> {
//!     Err(SiteError::CircularDependency {
//!         chain: "a.md → b.md → a.md".to_string(),
//!     }
//!     .into())
//! }
//!
//! if let Err(e) = sort() {
//!     user_friendly_error(e).display();
//! }
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The error type for the dependency core.
///
/// Every variant aborts the enclosing cache pass or chain resolution. None of
/// them are retried or downgraded to warnings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SiteError {
    /// The accumulated dependency edges do not form a DAG.
    #[error("Circular dependency detected: {chain}")]
    CircularDependency {
        /// Cycle members joined with arrows, first member repeated at the end
        chain: String,
    },

    /// A graph query named a node that was never inserted.
    #[error("Node does not exist in dependency graph: {key}")]
    UnknownNode {
        /// The missing node key
        key: String,
    },

    /// An instrumented view was requested over a data path that is absent.
    #[error("Target {path} not found in data object")]
    UnresolvedTarget {
        /// The dotted path that could not be resolved
        path: String,
    },

    /// A layout key has no backing file in the includes directory.
    #[error("Layout '{layout}' referenced by '{template}' could not be found")]
    LayoutNotFound {
        /// The front-matter layout key
        layout: String,
        /// The template (or layout) that referenced it
        template: String,
        /// Closest known layout name, if any
        suggestion: Option<String>,
    },

    /// A layout chain revisits a layout and would never terminate.
    #[error("Layout chain for '{template}' does not terminate: {chain}")]
    RunawayLayoutChain {
        /// The template whose chain was being resolved
        template: String,
        /// The chain walked so far, ending with the repeated layout
        chain: String,
    },

    /// The rendering engine rejected a template.
    #[error("Failed to render '{path}': {reason}")]
    RenderFailed {
        /// Template or layout path
        path: String,
        /// Engine message
        reason: String,
    },

    /// Front matter could not be parsed.
    #[error("Invalid front matter in '{path}': {reason}")]
    FrontMatter {
        /// File path
        path: String,
        /// Parser message
        reason: String,
    },

    /// A render cache lookup missed.
    #[error("Could not find {key} in render cache")]
    NotCached {
        /// Cache key
        key: String,
    },

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },
}

/// An error with optional details and a suggestion for terminal display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The rendered error message (including its cause chain)
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with a suggestion where one is known.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let message = message_with_chain(&error);

    if let Some(site_error) = error.downcast_ref::<SiteError>() {
        return match site_error {
            SiteError::CircularDependency {
                ..
            } => ErrorContext::new(message)
                .with_details("Templates that read each other's collections must not form a loop")
                .with_suggestion(
                    "Remove one of the collection reads along the cycle, or move shared content into an include",
                ),
            SiteError::LayoutNotFound {
                suggestion: Some(name),
                ..
            } => ErrorContext::new(message).with_suggestion(format!("Did you mean '{name}'?")),
            SiteError::LayoutNotFound {
                ..
            } => ErrorContext::new(message)
                .with_suggestion("Check the layout key and the includes directory in sitegraph.toml"),
            SiteError::RunawayLayoutChain {
                ..
            } => ErrorContext::new(message)
                .with_suggestion("A layout must not name itself (directly or through other layouts)"),
            SiteError::UnknownNode {
                ..
            } => ErrorContext::new(message)
                .with_suggestion("Node keys are input paths as discovered, e.g. ./posts/first.md"),
            SiteError::FrontMatter {
                ..
            } => ErrorContext::new(message)
                .with_suggestion("Front matter must be a YAML mapping between two '---' lines"),
            SiteError::ConfigError {
                ..
            } => ErrorContext::new(message).with_suggestion("Check the syntax of sitegraph.toml"),
            _ => ErrorContext::new(message),
        };
    }

    if error.downcast_ref::<toml::de::Error>().is_some() {
        return ErrorContext::new(message)
            .with_suggestion("Check the TOML syntax in sitegraph.toml")
            .with_details("TOML parsing errors are usually missing quotes or mismatched brackets");
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::NotFound
    {
        return ErrorContext::new(message)
            .with_suggestion("Check that the input directory exists and the path is correct");
    }

    ErrorContext::new(message)
}

fn message_with_chain(error: &anyhow::Error) -> String {
    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    message
}
