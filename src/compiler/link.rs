//! Rewrite `href` and `src` attributes for the output layout.
//!
//! Only double-quoted attributes are recognised. `href='x'` and unquoted
//! values pass through untouched.

use super::path::{is_relative_file_link, resolve_relative_link};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static LINK_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(href|src)="([^"]*)""#).expect("link attribute pattern is valid")
});

/// Rewrite every relative file link in `html`, as seen from the source-space
/// path `current`.
pub fn rewrite_links(html: &str, current: &str) -> String {
    LINK_ATTR
        .replace_all(html, |caps: &Captures<'_>| {
            let url = &caps[2];
            if is_relative_file_link(url) {
                format!(r#"{}="{}""#, &caps[1], resolve_relative_link(url, current))
            } else {
                caps[0].to_owned()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_href_and_src() {
        let html = r#"<a href="../about.md">About</a><img src="img/a.png" />"#;
        assert_eq!(
            rewrite_links(html, "/blog/post.md"),
            r#"<a href="/about/">About</a><img src="/blog/img/a.png" />"#
        );
    }

    #[test]
    fn test_leaves_absolute_and_external() {
        let html = r##"<a href="https://x.org">x</a><a href="/a/">a</a><a href="#top">t</a>"##;
        assert_eq!(rewrite_links(html, "/blog/post.md"), html);
    }

    #[test]
    fn test_single_quoted_not_rewritten() {
        let html = "<a href='../about.md'>About</a>";
        assert_eq!(rewrite_links(html, "/blog/post.md"), html);
    }

    #[test]
    fn test_template_links_rewritten_too() {
        let html = r#"<link href="style.css" rel="stylesheet"><script src="../app.js"></script>"#;
        assert_eq!(
            rewrite_links(html, "/docs/guide.md"),
            r#"<link href="/docs/style.css" rel="stylesheet"><script src="/app.js"></script>"#
        );
    }
}
