//! Template discovery: the nearest `template.html` wins.
//!
//! Batch builds collect every template into a [`TemplateTable`] before any
//! page is rendered. The dev server has no table and probes the filesystem
//! per request with [`find_template_file`]. Both walk from the page's own
//! directory upwards and stop at the first hit, so a template in `/blog/`
//! shadows the one in `/`.

use super::path::{TEMPLATE_NAME, dir_of};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

/// Used when no directory above a page has a template.
pub const FALLBACK_TEMPLATE: &str = "<!doctype html><body>{{slot}}</body>";

/// Marker replaced by the rendered Markdown body.
pub const SLOT: &str = "{{slot}}";

/// Raw template text keyed by directory (`/`, `/blog/`, ...).
#[derive(Debug, Default)]
pub struct TemplateTable {
    templates: FxHashMap<String, String>,
}

impl TemplateTable {
    /// Register the template governing `dir`. Keys end with `/`.
    pub fn insert(&mut self, dir: impl Into<String>, text: String) {
        let mut dir = dir.into();
        if !dir.ends_with('/') {
            dir.push('/');
        }
        self.templates.insert(dir, text);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }
}

/// Find the template for a source-space content path.
///
/// Returns the template text and the directory key it was registered
/// under, or [`FALLBACK_TEMPLATE`] with an empty key.
///
/// `/blog/post/index.md` checks `/blog/post/`, then `/blog/`, then `/`.
pub fn find_template<'a>(content_path: &str, table: &'a TemplateTable) -> (&'a str, &'a str) {
    let mut dir = dir_of(content_path);
    while !dir.is_empty() {
        if let Some((key, text)) = table.templates.get_key_value(dir) {
            return (text.as_str(), key.as_str());
        }
        // "/blog/post/" -> "/blog/"
        dir = dir_of(&dir[..dir.len() - 1]);
    }
    (FALLBACK_TEMPLATE, "")
}

/// Find the `template.html` governing a content file on disk.
///
/// Walks up from the file's directory until a directory is its own parent.
pub fn find_template_file(content_file: &Path) -> Option<PathBuf> {
    content_file
        .parent()?
        .ancestors()
        .map(|dir| dir.join(TEMPLATE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Split a template around its slot marker.
///
/// A template without the marker is all prefix; the body is appended
/// after it. Only the first marker is a slot.
pub fn split_slot(template: &str) -> (&str, &str) {
    template.split_once(SLOT).unwrap_or((template, ""))
}
