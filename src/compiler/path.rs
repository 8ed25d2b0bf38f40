//! Path algebra between source space and output space.
//!
//! Both spaces use slash-separated paths rooted at `/`: `/blog/post.md` is
//! `<content>/blog/post.md` on disk and renders to `/blog/post/index.html`
//! under the output directory. Nothing here touches the filesystem.
//!
//! # Output Mapping
//!
//! | Source | Output |
//! |--------|--------|
//! | `/index.md` | `/index.html` |
//! | `/blog/index.md` | `/blog/index.html` |
//! | `/about.md` | `/about/index.html` |
//! | `/img/logo.png` | `/img/logo.png` |

use std::path::Path;

/// Extension of Markdown content files.
pub const MARKDOWN_EXT: &str = "md";
/// File name that marks a directory template.
pub const TEMPLATE_NAME: &str = "template.html";
/// File name every rendered page ends up as.
pub const INDEX_HTML: &str = "index.html";

/// What a file in the source tree is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `template.html`, governs its directory and descendants.
    Template,
    /// Markdown rendered through a template.
    Content,
    /// Copied byte-for-byte.
    Static,
}

impl SourceKind {
    /// Classify a slash-separated path by its file name.
    pub fn of(path: &str) -> Self {
        match (file_name(path), extension(path)) {
            (TEMPLATE_NAME, _) => Self::Template,
            (_, MARKDOWN_EXT) => Self::Content,
            _ => Self::Static,
        }
    }
}

/// A file discovered while walking the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Slash-normalized path rooted at the source directory, e.g. `/blog/post.md`.
    pub path: String,
    pub kind: SourceKind,
    pub extension: String,
}

impl SourceEntry {
    /// Build an entry from a path relative to the source root.
    pub fn from_relative(rel: &Path) -> Self {
        let path = to_rooted(rel);
        Self {
            kind: SourceKind::of(&path),
            extension: extension(&path).to_owned(),
            path,
        }
    }

    /// Directory key of the entry, e.g. `/blog/` for `/blog/post.md`.
    pub fn dir(&self) -> &str {
        dir_of(&self.path)
    }

    /// Output-space path of the entry.
    pub fn output_path(&self) -> String {
        output_path(&self.path)
    }
}

/// Convert a path relative to a root into the rooted slash form.
///
/// `blog\post.md` (on Windows) and `blog/post.md` both become `/blog/post.md`.
pub fn to_rooted(rel: &Path) -> String {
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}

/// Last segment of a slash-separated path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Extension of the last segment, without the dot. Empty when there is none.
pub fn extension(path: &str) -> &str {
    match file_name(path).rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext,
        _ => "",
    }
}

/// Directory part of a path including the trailing slash: `/a/b.md` → `/a/`.
pub fn dir_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..=pos],
        None => "",
    }
}

/// Map a source-space path to its output-space path.
///
/// Index files stay in their directory as `index.html`, other Markdown
/// files get a pretty-URL directory of their own, everything else keeps
/// its relative location.
pub fn output_path(source: &str) -> String {
    let dir = dir_of(source);
    let name = file_name(source);

    if name == "index.md" || name == INDEX_HTML {
        return format!("{dir}{INDEX_HTML}");
    }
    if extension(source) == MARKDOWN_EXT {
        let stem = &name[..name.len() - MARKDOWN_EXT.len() - 1];
        return format!("{dir}{stem}/{INDEX_HTML}");
    }
    source.to_owned()
}

/// Check if a link is external (has a scheme like `http:`, `mailto:`, `tel:`).
#[inline]
pub fn is_external_link(link: &str) -> bool {
    link.find(':').is_some_and(|pos| {
        let scheme = &link[..pos];
        scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Whether a URL points at another file of the source tree.
///
/// External (`https:`, `mailto:`, `tel:`, `//host`), root-absolute (`/x`),
/// fragment-only (`#x`) and empty URLs are left alone.
pub fn is_relative_file_link(url: &str) -> bool {
    !(url.is_empty() || url.starts_with('/') || url.starts_with('#') || is_external_link(url))
}

/// Rewrite a link found in `current` (a source-space path) to the
/// root-absolute URL of its target in the output tree.
///
/// | Link in `/blog/post.md` | Result |
/// |-------------------------|--------|
/// | `../about.md` | `/about/` |
/// | `img/a.png` | `/blog/img/a.png` |
/// | `index.md#top` | `/blog/#top` |
/// | `https://example.com` | unchanged |
/// | `/about/` | unchanged |
pub fn resolve_relative_link(url: &str, current: &str) -> String {
    if !is_relative_file_link(url) {
        return url.to_owned();
    }

    let (target, suffix) = match url.find(['#', '?']) {
        Some(pos) => url.split_at(pos),
        None => (url, ""),
    };
    if target.is_empty() {
        return url.to_owned();
    }

    let joined = normalize(&format!("{}{target}", dir_of(current)));
    let output = output_path(&joined);
    let mut web = output
        .strip_suffix(INDEX_HTML)
        .unwrap_or(&output)
        .to_owned();

    if target.ends_with('/') && !web.ends_with('/') {
        web.push('/');
    }
    if !web.starts_with('/') {
        web.insert(0, '/');
    }
    while web.contains("//") {
        web = web.replace("//", "/");
    }

    web.push_str(suffix);
    web
}

/// Resolve `.` and `..` segments of a rooted path; `..` never climbs above `/`.
fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

// ============================================================================
// Tests
// ============================================================================
