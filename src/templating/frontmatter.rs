//! YAML front matter extraction.
//!
//! Templates and layouts may start with a YAML mapping between `---` lines.
//! The mapping becomes the file's own data; the rest is the template body.

use anyhow::Result;
use gray_matter::Matter;
use gray_matter::engine::YAML;
use serde_json::Value;

use super::Data;
use crate::core::SiteError;

/// A file split into its front matter data and body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    /// Parsed front matter; empty when the file has none.
    pub data: Data,
    /// Everything after the front matter block.
    pub body: String,
}

/// Splits files into [`FrontMatter`].
pub struct FrontMatterParser {
    yaml_matter: Matter<YAML>,
}

impl Default for FrontMatterParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrontMatterParser {
    /// Create a parser for `---` delimited YAML.
    pub fn new() -> Self {
        Self {
            yaml_matter: Matter::<YAML>::new(),
        }
    }

    /// Parse `content` read from `path`.
    ///
    /// # Errors
    ///
    /// [`SiteError::FrontMatter`] when the block is not valid YAML or is not a
    /// mapping.
    pub fn parse(&self, content: &str, path: &str) -> Result<FrontMatter> {
        let invalid = |reason: String| SiteError::FrontMatter {
            path: path.to_string(),
            reason,
        };

        let parsed = self
            .yaml_matter
            .parse::<serde_yaml::Value>(content)
            .map_err(|e| invalid(e.to_string()))?;

        let data = match parsed.data {
            None => Data::new(),
            Some(yaml) => match serde_json::to_value(&yaml).map_err(|e| invalid(e.to_string()))? {
                Value::Object(map) => map,
                Value::Null => Data::new(),
                other => {
                    return Err(invalid(format!("expected a mapping, found {}", type_name(&other))).into());
                }
            },
        };

        Ok(FrontMatter {
            data,
            body: parsed.content,
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
