//! Guided documentation library
//!
//! Loads the `.md` templates the server walks the agent through and renders
//! them with handlebars against a caller-supplied context. The template
//! language itself is handlebars' - nothing here extends it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use handlebars::Handlebars;
use serde_json::Value;
use tracing::{debug, info};

/// A library of named doc templates under one directory.
pub struct DocLibrary {
    registry: Handlebars<'static>,
    sources: BTreeMap<String, PathBuf>,
}

impl DocLibrary {
    /// Load every `*.md` template under `dir`. A missing directory yields an
    /// empty library rather than an error - guides are optional.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        let mut sources = BTreeMap::new();

        if !dir.is_dir() {
            info!(dir = %dir.display(), "Doc directory not found, starting with empty library");
            return Ok(Self { registry, sources });
        }

        for entry in fs::read_dir(dir).context("Failed to read docs directory")? {
            let entry = entry.context("Failed to read docs directory entry")?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let template = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read doc template {}", path.display()))?;
            registry
                .register_template_string(name, template)
                .with_context(|| format!("Failed to compile doc template {}", path.display()))?;

            debug!(name, path = %path.display(), "DocLibrary::load: registered template");
            sources.insert(name.to_string(), path);
        }

        info!(count = sources.len(), dir = %dir.display(), "Doc library loaded");
        Ok(Self { registry, sources })
    }

    /// Names of all registered templates, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.sources.keys().map(|s| s.as_str()).collect()
    }

    /// True if `name` is a registered template.
    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Render `name` with `context` (any JSON value; `null` for none).
    pub fn render(&self, name: &str, context: &Value) -> Result<String> {
        if !self.contains(name) {
            return Err(eyre::eyre!("Unknown guide: {}", name));
        }
        self.registry
            .render(name, context)
            .with_context(|| format!("Failed to render guide {}", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn library_with(files: &[(&str, &str)]) -> DocLibrary {
        let temp = TempDir::new().unwrap();
        for (name, body) in files {
            fs::write(temp.path().join(name), body).unwrap();
        }
        DocLibrary::load(temp.path()).unwrap()
    }

    #[test]
    fn test_load_and_render() {
        let lib = library_with(&[("phases.md", "# Phase {{phase}}\n\nDo the work.")]);

        assert_eq!(lib.names(), vec!["phases"]);
        let rendered = lib.render("phases", &json!({"phase": "design"})).unwrap();
        assert_eq!(rendered, "# Phase design\n\nDo the work.");
    }

    #[test]
    fn test_non_md_files_ignored() {
        let lib = library_with(&[("guide.md", "hello"), ("notes.txt", "ignored")]);
        assert_eq!(lib.names(), vec!["guide"]);
    }

    #[test]
    fn test_unknown_guide_errors() {
        let lib = library_with(&[]);
        assert!(lib.render("missing", &Value::Null).is_err());
    }

    #[test]
    fn test_missing_directory_is_empty_library() {
        let lib = DocLibrary::load(Path::new("/nonexistent/guidepost-docs")).unwrap();
        assert!(lib.names().is_empty());
    }
}
