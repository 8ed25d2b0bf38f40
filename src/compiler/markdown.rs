//! Markdown to HTML conversion with front matter extraction.
//!
//! Uses `pulldown-cmark` with the GitHub-flavored extensions. The event
//! stream is adjusted before rendering:
//!
//! - the YAML metadata block is pulled out and parsed into [`Metadata`]
//! - soft line breaks become `<br />`
//! - headings without an id get a slug id (`## Getting Started` → `getting-started`)
//!
//! `pulldown-cmark` already self-closes void elements (`<br />`, `<hr />`,
//! `<img ... />`), so the output is XHTML-compatible.

use crate::error::{SiteError, SiteResult};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_yaml::Value;
use std::{collections::BTreeMap, path::Path};

/// Front matter of one document, keyed by top-level YAML key.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    /// Parse a YAML front matter block. Blank input is empty metadata.
    pub fn parse(yaml: &str, path: &Path) -> SiteResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let invalid = |msg: String| SiteError::FrontMatter(path.to_path_buf(), msg);

        match serde_yaml::from_str::<Value>(yaml).map_err(|e| invalid(e.to_string()))? {
            Value::Null => Ok(Self::default()),
            Value::Mapping(mapping) => {
                let entries = mapping
                    .into_iter()
                    .map(|(key, value)| (scalar_to_string(&key), value))
                    .collect();
                Ok(Self(entries))
            }
            _ => Err(invalid("front matter must be a mapping".into())),
        }
    }

    /// Value of `key` as placeholder text. Missing keys are empty.
    pub fn get(&self, key: &str) -> String {
        self.0.get(key).map(value_to_string).unwrap_or_default()
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => value_to_string(other),
    }
}

/// Render a YAML value the way it is spliced into a template.
///
/// | YAML | Text |
/// |------|------|
/// | `Hello` | `Hello` |
/// | `3` / `true` | `3` / `true` |
/// | `~` | `` |
/// | `[a, b]` | `a, b` |
fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Mapping(_) => serde_yaml::to_string(value)
            .map(|s| s.trim_end().to_owned())
            .unwrap_or_default(),
        Value::Tagged(tagged) => value_to_string(&tagged.value),
    }
}

/// Result of converting one Markdown document.
#[derive(Debug)]
pub struct Converted {
    pub body: String,
    pub metadata: Metadata,
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_GFM
        | Options::ENABLE_YAML_STYLE_METADATA_BLOCKS
}

/// Convert Markdown source into an HTML body and its front matter.
///
/// `path` only labels errors.
pub fn convert_markdown(source: &str, path: &Path) -> SiteResult<Converted> {
    let mut front_matter = String::new();
    let mut in_metadata = false;
    let mut events = Vec::new();

    for event in Parser::new_ext(source, options()) {
        match event {
            Event::Start(Tag::MetadataBlock(_)) => in_metadata = true,
            Event::End(TagEnd::MetadataBlock(_)) => in_metadata = false,
            Event::Text(text) if in_metadata => front_matter.push_str(&text),
            Event::SoftBreak => events.push(Event::HardBreak),
            event => events.push(event),
        }
    }

    assign_heading_ids(&mut events);

    let mut body = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut body, events.into_iter());

    Ok(Converted {
        body,
        metadata: Metadata::parse(&front_matter, path)?,
    })
}

// ============================================================================
// Heading IDs
// ============================================================================

/// Give every heading without an explicit id a unique slug id.
fn assign_heading_ids(events: &mut [Event<'_>]) {
    let mut slugger = HeadingSlugger::default();

    for i in 0..events.len() {
        let Event::Start(Tag::Heading { id: None, .. }) = &events[i] else {
            continue;
        };
        let slug = slugger.slug(&heading_text(&events[i + 1..]));
        if let Event::Start(Tag::Heading { id, .. }) = &mut events[i] {
            *id = Some(CowStr::from(slug));
        }
    }
}

/// Plain text of a heading, up to its end tag.
fn heading_text(events: &[Event<'_>]) -> String {
    events
        .iter()
        .take_while(|e| !matches!(e, Event::End(TagEnd::Heading(_))))
        .filter_map(|e| match e {
            Event::Text(t) | Event::Code(t) => Some(t.as_ref()),
            _ => None,
        })
        .collect()
}

/// Generates heading ids, suffixing `-1`, `-2`, ... until an id is unused.
#[derive(Default)]
struct HeadingSlugger {
    /// Every id handed out so far.
    issued: FxHashSet<String>,
    /// Next suffix to try per base slug.
    next_suffix: FxHashMap<String, usize>,
}

impl HeadingSlugger {
    fn slug(&mut self, text: &str) -> String {
        let mut base: String = text
            .trim()
            .chars()
            .filter_map(|c| match c {
                c if c.is_alphanumeric() => Some(c.to_lowercase().next().unwrap_or(c)),
                '-' | '_' => Some(c),
                c if c.is_whitespace() => Some('-'),
                _ => None,
            })
            .collect();
        if base.is_empty() {
            base.push_str("heading");
        }

        let mut slug = base.clone();
        if self.issued.contains(&slug) {
            let n = self.next_suffix.entry(base.clone()).or_insert(1);
            loop {
                slug = format!("{base}-{n}");
                *n += 1;
                if !self.issued.contains(&slug) {
                    break;
                }
            }
        }
        self.issued.insert(slug.clone());
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(source: &str) -> Converted {
        convert_markdown(source, Path::new("test.md")).unwrap()
    }

    #[test]
    fn test_front_matter_extracted() {
        let out = convert("---\ntitle: Hello\ntags: [a, b]\ndraft: false\n---\n# Hi\n");

        assert_eq!(out.metadata.get("title"), "Hello");
        assert_eq!(out.metadata.get("tags"), "a, b");
        assert_eq!(out.metadata.get("draft"), "false");
        assert_eq!(out.metadata.get("missing"), "");
        assert!(!out.body.contains("title"));
        assert!(out.body.contains("<h1 id=\"hi\">Hi</h1>"));
    }

    #[test]
    fn test_no_front_matter() {
        let out = convert("Just text.\n");
        assert_eq!(out.metadata, Metadata::default());
        assert_eq!(out.body, "<p>Just text.</p>\n");
    }

    #[test]
    fn test_invalid_front_matter_is_error() {
        let err = convert_markdown("---\ntitle: [unclosed\n---\nbody\n", Path::new("bad.md"));
        assert!(matches!(err, Err(SiteError::FrontMatter(path, _)) if path == Path::new("bad.md")));
    }

    #[test]
    fn test_non_mapping_front_matter_is_error() {
        let err = convert_markdown("---\n- a\n- b\n---\nbody\n", Path::new("list.md"));
        assert!(matches!(err, Err(SiteError::FrontMatter(..))));
    }

    #[test]
    fn test_soft_breaks_become_hard() {
        let out = convert("line one\nline two\n");
        assert_eq!(out.body, "<p>line one<br />\nline two</p>\n");
    }

    #[test]
    fn test_xhtml_void_elements() {
        let out = convert("![logo](logo.png)\n\n---\n");
        assert!(out.body.contains("<img src=\"logo.png\" alt=\"logo\" />"));
        assert!(out.body.contains("<hr />"));
    }

    #[test]
    fn test_gfm_extensions() {
        let out = convert("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done\n");
        assert!(out.body.contains("<table>"));
        assert!(out.body.contains("<del>gone</del>"));
        assert!(out.body.contains("type=\"checkbox\""));
    }

    #[test]
    fn test_heading_ids_deduplicated() {
        let out = convert("# Intro\n\n## Intro\n\n### Getting `Started`!\n");
        assert!(out.body.contains("<h1 id=\"intro\">"));
        assert!(out.body.contains("<h2 id=\"intro-1\">"));
        assert!(out.body.contains("<h3 id=\"getting-started\">"));
    }

    #[test]
    fn test_heading_ids_unique_against_suffixed_text() {
        let out = convert("# A\n\n# A\n\n# A 1\n");
        assert_eq!(out.body.matches("id=\"a-1\"").count(), 1);
        assert!(out.body.contains("<h1 id=\"a-1-1\">A 1</h1>"));

        let mut slugger = HeadingSlugger::default();
        let ids: Vec<_> = ["A 1", "A", "A", "A"].iter().map(|t| slugger.slug(t)).collect();
        assert_eq!(ids, ["a-1", "a", "a-2", "a-3"]);
    }

    #[test]
    fn test_slugger_edge_cases() {
        let mut slugger = HeadingSlugger::default();
        assert_eq!(slugger.slug("  Hello,  World  "), "hello--world");
        assert_eq!(slugger.slug("???"), "heading");
        assert_eq!(slugger.slug("snake_case-ok"), "snake_case-ok");
    }

    #[test]
    fn test_metadata_value_rendering() {
        let meta = Metadata::parse(
            "n: 3\nnothing: ~\nnested:\n  a: 1\n",
            Path::new("m.md"),
        )
        .unwrap();
        assert_eq!(meta.get("n"), "3");
        assert_eq!(meta.get("nothing"), "");
        assert_eq!(meta.get("nested"), "a: 1");
    }
}
