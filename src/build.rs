//! Site building orchestration.
//!
//! # Architecture
//!
//! ```text
//! build_site()
//!     │
//!     ├── scan_sources()
//!     │       │
//!     │       └── Walk content dir → TemplateTable + SourceEntry[]
//!     │           (every template is known before any page renders)
//!     │
//!     └── for each SourceEntry
//!             ├── Content ──► find_template() ──► render() ──► write
//!             └── Static  ──► copy bytes ──────────────────────► write
//! ```
//!
//! The build is all-or-nothing: the first error stops it.

use crate::{
    compiler::{SourceEntry, SourceKind, TemplateTable, find_template, render},
    config::SiteConfig,
    error::{SiteError, SiteResult},
    log,
};
use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Files to ignore during directory traversal
const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// Everything discovered in one walk of the content directory.
#[derive(Debug, Default)]
pub struct SourceTree {
    pub templates: TemplateTable,
    pub entries: Vec<SourceEntry>,
}

/// Counts reported after a build.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub pages: usize,
    pub assets: usize,
}

/// Build the entire site from `config.build.content` into `config.build.output`.
///
/// If `config.build.clean` is true, clears the output directory first.
pub fn build_site(config: &SiteConfig) -> Result<BuildSummary> {
    let content = &config.build.content;
    let output = &config.build.output;

    if config.build.clean && output.exists() {
        fs::remove_dir_all(output)
            .with_context(|| format!("Failed to clear output directory: {}", output.display()))?;
    }

    let tree = scan_sources(content)?;
    log!("template"; "found {} templates", tree.templates.len());

    let summary = write_site(&tree, content, output)
        .with_context(|| format!("Failed to build {}", content.display()))?;

    log!("build"; "{} pages, {} assets", summary.pages, summary.assets);
    Ok(summary)
}

/// Walk the content directory, splitting templates from everything else.
pub fn scan_sources(content: &Path) -> SiteResult<SourceTree> {
    let mut tree = SourceTree::default();

    let walker = WalkDir::new(content).sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| SiteError::Walk(content.to_path_buf(), e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_str().unwrap_or_default();
        if IGNORED_FILES.contains(&name) {
            continue;
        }

        let rel = entry.path().strip_prefix(content).unwrap_or(entry.path());
        let source = SourceEntry::from_relative(rel);

        if source.kind == SourceKind::Template {
            let text = fs::read_to_string(entry.path())
                .map_err(|e| SiteError::Template(entry.path().to_path_buf(), e))?;
            tree.templates.insert(source.dir(), text);
        } else {
            tree.entries.push(source);
        }
    }

    Ok(tree)
}

/// Render or copy every entry of a scanned tree into `output`.
pub fn write_site(tree: &SourceTree, content: &Path, output: &Path) -> SiteResult<BuildSummary> {
    let mut summary = BuildSummary::default();

    for entry in &tree.entries {
        let src = resolve(content, &entry.path);
        let dst = resolve(output, &entry.output_path());
        let bytes = fs::read(&src).map_err(|e| SiteError::Read(src.clone(), e))?;

        let finished = match entry.kind {
            SourceKind::Content => {
                let (template, dir) = find_template(&entry.path, &tree.templates);
                log!("content"; "{} (template: {})", entry.path, if dir.is_empty() { "builtin" } else { dir });
                summary.pages += 1;
                render(&bytes, template, &entry.path, &src)?.into_bytes()
            }
            _ => {
                match entry.extension.as_str() {
                    "" => log!("static"; "{}", entry.path),
                    ext => log!("static"; "{} ({ext})", entry.path),
                }
                summary.assets += 1;
                bytes
            }
        };

        write_file(&dst, &finished)?;
    }

    Ok(summary)
}

/// Join a rooted slash path (`/blog/post.md`) onto a directory.
fn resolve(root: &Path, rooted: &str) -> PathBuf {
    rooted
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

fn write_file(path: &Path, bytes: &[u8]) -> SiteResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SiteError::Write(parent.to_path_buf(), e))?;
    }
    fs::write(path, bytes).map_err(|e| SiteError::Write(path.to_path_buf(), e))
}

// ============================================================================
// Tests
// ============================================================================
