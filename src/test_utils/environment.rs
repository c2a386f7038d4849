//! Temporary site directories for tests.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A site directory that is removed when dropped.
pub struct SiteEnvironment {
    temp_dir: TempDir,
}

impl SiteEnvironment {
    /// An empty site.
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new().context("Failed to create temp site directory")?,
        })
    }

    /// A small blog: two tagged posts sharing a two-level layout chain, a
    /// listing page reading the `post` collection and a global data file.
    pub fn blog() -> Result<Self> {
        let env = Self::new()?;
        env.create_file(
            "_includes/base.tera",
            "<title>{{ metadata.title }}</title>\n<main>{{ content }}</main>\n",
        )?;
        env.create_file("_includes/post.tera", "---\nlayout: base\n---\n<article>{{ content }}</article>\n")?;
        env.create_file("_data/metadata.json", r#"{ "title": "Example Blog" }"#)?;
        env.create_file(
            "posts/first.md",
            "---\ntitle: First\nlayout: post\ntags: post\ndate: 2024-01-01\n---\nFirst body\n",
        )?;
        env.create_file(
            "posts/second.md",
            "---\ntitle: Second\nlayout: post\ntags:\n  - post\ndate: 2024-02-01\n---\nSecond body\n",
        )?;
        env.create_file(
            "index.tera",
            "---\ntitle: Home\n---\n{% for post in collections.post %}{{ post.data.title }};{% endfor %}\n",
        )?;
        env.create_file("about.md", "---\ntitle: About\n---\nAbout {{ metadata.title }}\n")?;
        Ok(env)
    }

    /// The site root.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `content` to `path` relative to the site root, creating directories.
    pub fn create_file(&self, path: impl AsRef<Path>, content: &str) -> Result<PathBuf> {
        let full_path = self.temp_dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full_path, content)?;
        Ok(full_path)
    }

    /// Read a file relative to the site root.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let full_path = self.temp_dir.path().join(path);
        fs::read_to_string(&full_path).with_context(|| format!("Failed to read {}", full_path.display()))
    }

    /// Whether a file exists relative to the site root.
    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        self.temp_dir.path().join(path).exists()
    }
}
