//! Render one content file into a template.
//!
//! ```text
//! template ──split_slot──► prefix ──populate_meta──┐
//!                          suffix ──populate_meta──┤
//! content ──convert_markdown──► body ──────────────┤
//!                                                  ▼
//!                        prefix + body + suffix ──rewrite_links──► HTML
//! ```

use super::{
    link::rewrite_links,
    markdown::{Metadata, convert_markdown},
    template::split_slot,
};
use crate::error::{SiteError, SiteResult};
use std::path::Path;

const META_OPEN: &str = "{{meta.";
const META_CLOSE: &str = "}}";

/// Render Markdown `content` into `template`.
///
/// `source` is the page's source-space path (`/blog/post.md`), used to
/// resolve its relative links. `file` is where it was read from, for errors.
pub fn render(content: &[u8], template: &str, source: &str, file: &Path) -> SiteResult<String> {
    let content =
        std::str::from_utf8(content).map_err(|_| SiteError::NotUtf8(file.to_path_buf()))?;
    let converted = convert_markdown(content, file)?;
    let (prefix, suffix) = split_slot(template);

    let document = [
        populate_meta(prefix, &converted.metadata),
        converted.body,
        populate_meta(suffix, &converted.metadata),
    ]
    .concat();

    Ok(rewrite_links(&document, source))
}

/// Replace `{{meta.KEY}}` markers with front matter values.
///
/// Substituted values are not scanned again. A marker without a closing
/// `}}` is copied through with everything after it.
pub fn populate_meta(text: &str, metadata: &Metadata) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(META_OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + META_OPEN.len()..];
        let Some(end) = after.find(META_CLOSE) else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str(&metadata.get(&after[..end]));
        rest = &after[end + META_CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(yaml: &str) -> Metadata {
        Metadata::parse(yaml, Path::new("test.md")).unwrap()
    }

    fn render_str(content: &str, template: &str, source: &str) -> String {
        render(content.as_bytes(), template, source, Path::new("test.md")).unwrap()
    }

    #[test]
    fn test_title_substitution() {
        let html = render_str(
            "---\ntitle: Hello\n---\n# Hi\n",
            "<title>{{meta.title}}</title>{{slot}}",
            "/index.md",
        );
        assert_eq!(html, "<title>Hello</title><h1 id=\"hi\">Hi</h1>\n");
    }

    #[test]
    fn test_values_not_escaped() {
        let html = render_str(
            "---\ntitle: \"<b>Bold</b> & co\"\n---\n",
            "<title>{{meta.title}}</title>{{slot}}",
            "/index.md",
        );
        assert_eq!(html, "<title><b>Bold</b> & co</title>");
    }

    #[test]
    fn test_missing_slot_appends_body() {
        let html = render_str("text\n", "<header>{{meta.title}}</header>", "/index.md");
        assert_eq!(html, "<header></header><p>text</p>\n");
    }

    #[test]
    fn test_suffix_substituted() {
        let html = render_str(
            "---\nauthor: Ann\n---\nbody\n",
            "<main>{{slot}}</main><footer>{{meta.author}}</footer>",
            "/index.md",
        );
        assert_eq!(html, "<main><p>body</p>\n</main><footer>Ann</footer>");
    }

    #[test]
    fn test_links_in_body_and_template_rewritten() {
        let html = render_str(
            "[About](../about.md)\n",
            r#"<link href="../style.css">{{slot}}"#,
            "/blog/post.md",
        );
        assert_eq!(
            html,
            "<link href=\"/style.css\"><p><a href=\"/about/\">About</a></p>\n"
        );
    }

    #[test]
    fn test_invalid_utf8_is_error() {
        let err = render(&[0xff, 0xfe], "{{slot}}", "/a.md", Path::new("routes/a.md"));
        assert!(matches!(err, Err(SiteError::NotUtf8(_))));
    }

    #[test]
    fn test_populate_meta_multiple_markers() {
        let m = meta("a: 1\nb: two\n");
        assert_eq!(populate_meta("{{meta.a}}-{{meta.b}}-{{meta.c}}!", &m), "1-two-!");
    }

    #[test]
    fn test_populate_meta_unterminated_marker() {
        let m = meta("a: 1\n");
        assert_eq!(populate_meta("x {{meta.a}} y {{meta.b", &m), "x 1 y {{meta.b");
    }

    #[test]
    fn test_populate_meta_does_not_rescan_values() {
        let m = meta("a: \"{{meta.b}}\"\nb: nope\nc: \"}}\"\n");
        assert_eq!(populate_meta("[{{meta.a}}]", &m), "[{{meta.b}}]");
        assert_eq!(populate_meta("{{meta.c}}{{meta.b}}", &m), "}}nope");
    }

    #[test]
    fn test_populate_meta_without_markers() {
        let m = Metadata::default();
        assert_eq!(populate_meta("<p>{{slot}} {{other}}</p>", &m), "<p>{{slot}} {{other}}</p>");
    }
}
