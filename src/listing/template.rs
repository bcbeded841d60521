//! Listing document templates.
//!
//! The layout is a minijinja template with HTML auto-escaping. It sees
//! `dirname` (the directory relative to the base, empty for the base) and
//! `files`, whose items carry `filetype`, `name`, `link`, `size` and
//! `last_modified`.

use std::fs;
use std::path::Path;

use minijinja::{context, AutoEscape, Environment, Value};

use super::render::ListingEntry;
use crate::error::ListingError;
use crate::{Error, Result};

const TEMPLATE_NAME: &str = "listing.html";

/// Layout used when no template file is configured.
pub const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Index of /{{ dirname }}</title>
</head>
<body>
<h1>Index of /{{ dirname }}</h1>
<table>
<tr><th>Type</th><th>Name</th><th>Last modified</th><th>Size</th></tr>
{% for file in files -%}
<tr><td>{{ file.filetype }}</td><td><a href="{{ file.link }}">{{ file.name }}</a></td><td>{{ file.last_modified }}</td><td>{{ file.size }}</td></tr>
{% endfor -%}
</table>
</body>
</html>
"#;

/// Compiled listing template, loaded once and shared by every render.
#[derive(Debug)]
pub struct ListingTemplate {
    env: Environment<'static>,
}

impl ListingTemplate {
    /// Compile a template from source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the source does not parse.
    pub fn from_source(source: impl Into<String>) -> Result<Self> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.add_template_owned(TEMPLATE_NAME, source.into())
            .map_err(|e| Error::config(format!("invalid listing template: {e}")))?;
        Ok(Self { env })
    }

    /// The built-in layout.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the built-in source is covered by tests.
    pub fn builtin() -> Result<Self> {
        Self::from_source(DEFAULT_TEMPLATE)
    }

    /// Load the template at `path`, or the built-in layout when `None`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::builtin();
        };
        let source = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read template '{}': {e}", path.display()))
        })?;
        tracing::info!(path = %path.display(), "Loaded listing template");
        Self::from_source(source)
    }

    /// Render the listing for `dir` from its rows.
    ///
    /// Links are already percent-encoded and inserted as they are; every
    /// other value is escaped.
    ///
    /// # Errors
    ///
    /// Returns `ListingError::Render` if the template fails at render time.
    pub fn render(
        &self,
        dir: &Path,
        dirname: &str,
        entries: &[ListingEntry],
    ) -> std::result::Result<String, ListingError> {
        let files: Vec<Value> = entries
            .iter()
            .map(|entry| {
                context! {
                    filetype => entry.kind.as_str(),
                    name => &entry.name,
                    link => Value::from_safe_string(entry.link.clone()),
                    size => &entry.size,
                    last_modified => &entry.modified,
                }
            })
            .collect();

        self.env
            .get_template(TEMPLATE_NAME)
            .and_then(|template| template.render(context! { dirname, files }))
            .map_err(|e| ListingError::render(dir, e.to_string()))
    }
}
