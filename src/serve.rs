//! Development server with live reload support.
//!
//! Pages are rendered from the content directory on every request; there is
//! no build output and no template table. Built on `tiny_http`:
//!
//! - `GET /path/` → Markdown page rendered with the nearest template,
//!   plus the reload script
//! - `GET /path/file.ext` → static file from the content directory
//! - `GET /_devws/path/` → live reload channel for that page (see `reload`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐      ┌──────────────────────┐
//! │   Main Thread   │─────▶│  Request Thread (n)  │
//! │ (accept loop)   │      │  resolve() → respond │
//! └─────────────────┘      └──────────┬───────────┘
//!                                     │ /_devws/...
//!                                     ▼
//!                          ┌──────────────────────┐
//!                          │    ReloadSession     │
//!                          │ watch + websocket    │
//!                          └──────────────────────┘
//! ```

use crate::{
    compiler::{
        find_template_file,
        path::{MARKDOWN_EXT, to_rooted},
        render,
        template::FALLBACK_TEMPLATE,
    },
    config::SiteConfig,
    error::SiteError,
    log,
    reload::{self, RELOAD_PREFIX},
};
use anyhow::{Context, Result, anyhow};
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

/// Reload script injected into rendered pages (embedded at compile time)
const RELOAD_SCRIPT: &str = include_str!("embed/serve/reload.html");

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Start the development server.
///
/// Blocks until Ctrl+C is received.
pub fn serve_site(config: &SiteConfig) -> Result<()> {
    let server = DevServer::bind(config)?;

    let handle = Arc::clone(&server.server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        handle.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}", server.addr());
    server.run();
    Ok(())
}

/// A bound dev server serving one content directory.
pub struct DevServer {
    server: Arc<Server>,
    addr: SocketAddr,
    content: Arc<PathBuf>,
}

impl DevServer {
    pub fn bind(config: &SiteConfig) -> Result<Self> {
        let interface: std::net::IpAddr = config.serve.interface.parse()?;
        let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;

        Ok(Self {
            server: Arc::new(server),
            addr,
            content: Arc::new(config.build.content.clone()),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle requests, one thread each, until the server is unblocked.
    pub fn run(&self) {
        for request in self.server.incoming_requests() {
            let content = Arc::clone(&self.content);
            thread::spawn(move || {
                if let Err(e) = handle_request(request, &content) {
                    log!("serve"; "request error: {e:#}");
                }
            });
        }
    }
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: std::net::IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                // Port 0 asks the OS for a free port; report the real one.
                let addr = server.server_addr().to_ip().unwrap_or(addr);
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Request Handling
// ============================================================================

fn handle_request(request: Request, content: &Path) -> Result<()> {
    let url_path = request_path(request.url());
    log!("serve"; "{} {}", request.method(), url_path);

    if let Some(page) = reload_page(&url_path) {
        return reload::handle_reload(request, &page, content);
    }

    respond(request, resolve(&url_path, content))
}

/// Decode `%xx` escapes and drop the query string.
fn request_path(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    urlencoding::decode(path)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| path.to_owned())
}

/// Page path watched by a reload request: `/_devws/blog/` → `/blog/`.
fn reload_page(url_path: &str) -> Option<String> {
    let rest = url_path.strip_prefix(RELOAD_PREFIX)?;
    match rest {
        "" => Some("/".to_owned()),
        rest if rest.starts_with('/') => Some(rest.to_owned()),
        _ => None,
    }
}

/// What to send back for a page or file request.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// A file served byte-for-byte.
    Static {
        body: Vec<u8>,
        content_type: &'static str,
    },
    /// A rendered Markdown page with the reload script.
    Page(String),
    /// A discovered `.html` page, served as-is.
    Raw(Vec<u8>),
    NotFound(String),
    Failed(String),
}

/// Content file found for a directory-style URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    pub path: PathBuf,
    pub is_markdown: bool,
}

/// Decide the reply for a request path.
///
/// Paths ending in `/` are pages, everything else is a static file.
pub fn resolve(url_path: &str, content: &Path) -> Reply {
    if climbs_out(url_path) {
        return not_found(url_path);
    }

    if !url_path.ends_with('/') {
        let file = join_url(content, url_path);
        return match fs::read(&file) {
            Ok(body) => Reply::Static {
                body,
                content_type: guess_content_type(&file),
            },
            Err(_) => not_found(url_path),
        };
    }

    match find_content(content, url_path) {
        Some(found) if found.is_markdown => render_page(&found.path, content, url_path),
        Some(found) => match fs::read(&found.path) {
            Ok(body) => Reply::Raw(body),
            Err(_) => not_found(url_path),
        },
        None => not_found(url_path),
    }
}

/// Find the content file behind a directory-style URL.
///
/// For `/blog/` the candidates are, in order: `blog/index.md`,
/// `blog/index.html`, `blog.md`, `blog.html`. Paths with `..` find nothing.
pub fn find_content(content: &Path, url_path: &str) -> Option<ContentFile> {
    if climbs_out(url_path) {
        return None;
    }
    let dir = join_url(content, url_path);
    let mut candidates = vec![dir.join("index.md"), dir.join("index.html")];

    let trimmed = url_path.trim_end_matches('/');
    if !trimmed.is_empty() {
        candidates.push(join_url(content, &format!("{trimmed}.md")));
        candidates.push(join_url(content, &format!("{trimmed}.html")));
    }

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .map(|path| ContentFile {
            is_markdown: path.extension().is_some_and(|ext| ext == MARKDOWN_EXT),
            path,
        })
}

fn render_page(file: &Path, content: &Path, url_path: &str) -> Reply {
    let bytes = match fs::read(file) {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = SiteError::Read(file.to_path_buf(), e);
            if !err.is_not_found() {
                log!("error"; "{:#}", anyhow::Error::from(err));
            }
            return not_found(url_path);
        }
    };

    let template = match find_template_file(file) {
        Some(path) => match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => return failed(SiteError::Template(path, e)),
        },
        None => {
            log!("template"; "no template for {}, using builtin", file.display());
            FALLBACK_TEMPLATE.to_owned()
        }
    };

    let source = to_rooted(file.strip_prefix(content).unwrap_or(file));
    match render(&bytes, &template, &source, file) {
        Ok(html) => Reply::Page(inject_reload_script(&html)),
        Err(e) => failed(e),
    }
}

/// Insert the reload script after `<head>`, else after the doctype,
/// else wrap it in a `<head>` of its own in front of the document.
pub fn inject_reload_script(html: &str) -> String {
    let insert_at = |pos: usize| format!("{}{RELOAD_SCRIPT}{}", &html[..pos], &html[pos..]);

    if let Some(pos) = html.find("<head>") {
        return insert_at(pos + "<head>".len());
    }
    if let Some(pos) = doctype_end(html) {
        return insert_at(pos);
    }
    format!("<head>{RELOAD_SCRIPT}</head>{html}")
}

/// Byte offset just past the `<!doctype ...>` declaration, if any.
fn doctype_end(html: &str) -> Option<usize> {
    let start = html.to_ascii_lowercase().find("<!doctype")?;
    let end = html[start..].find('>')?;
    Some(start + end + 1)
}

/// Whether a URL path has a `..` segment.
fn climbs_out(url_path: &str) -> bool {
    url_path.split('/').any(|segment| segment == "..")
}

/// Join a URL path onto a directory, one segment at a time.
fn join_url(root: &Path, url_path: &str) -> PathBuf {
    url_path
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

fn not_found(url_path: &str) -> Reply {
    Reply::NotFound(format!(
        "404 Not Found: The requested resource '{url_path}' could not be found."
    ))
}

fn failed(err: SiteError) -> Reply {
    let err = anyhow::Error::from(err);
    log!("error"; "{err:#}");
    Reply::Failed(format!("500 Internal Server Error: {err:#}"))
}

// ============================================================================
// Response Helpers
// ============================================================================

pub fn header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name, value).map_err(|()| anyhow!("invalid header `{name}: {value}`"))
}

fn respond(request: Request, reply: Reply) -> Result<()> {
    const HTML: &str = "text/html; charset=utf-8";
    const TEXT: &str = "text/plain; charset=utf-8";

    let (status, body, content_type) = match reply {
        Reply::Static { body, content_type } => (200, body, content_type),
        Reply::Page(html) => (200, html.into_bytes(), HTML),
        Reply::Raw(body) => (200, body, HTML),
        Reply::NotFound(msg) => (404, msg.into_bytes(), TEXT),
        Reply::Failed(msg) => (500, msg.into_bytes(), TEXT),
    };

    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(header("Content-Type", content_type)?);
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        // Media
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",

        // Documents
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",

        // Default binary
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn routes(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, text) in files {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        dir
    }

    fn page(reply: Reply) -> String {
        match reply {
            Reply::Page(html) => html,
            other => panic!("expected page, got {other:?}"),
        }
    }

    #[test]
    fn test_index_page_gets_script_after_head() {
        let dir = routes(&[
            ("index.md", "# Welcome"),
            ("template.html", "<html><head></head><body>{{slot}}</body></html>"),
        ]);
        let html = page(resolve("/", dir.path()));

        assert!(html.starts_with(&format!("<html><head>{RELOAD_SCRIPT}</head>")));
        assert!(html.contains("<h1 id=\"welcome\">Welcome</h1>"));
    }

    #[test]
    fn test_named_markdown_page() {
        let dir = routes(&[
            ("template.html", "<head></head>{{slot}}"),
            ("blog/post.md", "[About](../about.md)"),
        ]);
        let html = page(resolve("/blog/post/", dir.path()));
        assert!(html.contains(r#"href="/about/""#));
    }

    #[test]
    fn test_nearest_template_on_disk() {
        let dir = routes(&[
            ("template.html", "ROOT{{slot}}"),
            ("blog/template.html", "BLOG{{slot}}"),
            ("blog/post/index.md", "post"),
        ]);
        let html = page(resolve("/blog/post/", dir.path()));
        assert!(html.contains("BLOG"));
        assert!(!html.contains("ROOT"));
    }

    #[test]
    fn test_lookup_order_prefers_index() {
        let dir = routes(&[
            ("docs/index.md", "index"),
            ("docs/index.html", "raw index"),
            ("docs.md", "named"),
        ]);
        let found = find_content(dir.path(), "/docs/").unwrap();
        assert_eq!(found.path, dir.path().join("docs/index.md"));
        assert!(found.is_markdown);

        fs::remove_file(dir.path().join("docs/index.md")).unwrap();
        let found = find_content(dir.path(), "/docs/").unwrap();
        assert_eq!(found.path, dir.path().join("docs/index.html"));
        assert!(!found.is_markdown);

        fs::remove_file(dir.path().join("docs/index.html")).unwrap();
        let found = find_content(dir.path(), "/docs/").unwrap();
        assert_eq!(found.path, dir.path().join("docs.md"));
    }

    #[test]
    fn test_raw_html_served_unprocessed() {
        let dir = routes(&[
            ("template.html", "<head></head>{{slot}}"),
            ("about.html", "<head></head><a href=\"x.md\">{{meta.title}}</a>"),
        ]);
        assert_eq!(
            resolve("/about/", dir.path()),
            Reply::Raw(b"<head></head><a href=\"x.md\">{{meta.title}}</a>".to_vec())
        );
    }

    #[test]
    fn test_static_file() {
        let dir = routes(&[("css/site.css", "body{}")]);
        assert_eq!(
            resolve("/css/site.css", dir.path()),
            Reply::Static {
                body: b"body{}".to_vec(),
                content_type: "text/css; charset=utf-8",
            }
        );
    }

    #[test]
    fn test_not_found() {
        let dir = routes(&[("index.md", "hi")]);
        assert!(matches!(resolve("/missing.png", dir.path()), Reply::NotFound(_)));
        assert!(matches!(resolve("/missing/", dir.path()), Reply::NotFound(_)));
        // a directory without trailing slash is not a static file
        fs::create_dir(dir.path().join("blog")).unwrap();
        assert!(matches!(resolve("/blog", dir.path()), Reply::NotFound(_)));
    }

    #[test]
    fn test_parent_segments_rejected() {
        let dir = routes(&[("index.md", "hi")]);
        assert!(matches!(resolve("/../secret.txt", dir.path()), Reply::NotFound(_)));
    }

    #[test]
    fn test_find_content_stays_inside_content_dir() {
        let dir = routes(&[("routes/index.md", "hi"), ("secret.md", "hidden")]);
        let content = dir.path().join("routes");

        assert!(find_content(&content, "/../secret/").is_none());
        assert!(find_content(&content, "/blog/../../secret/").is_none());
        assert!(find_content(&content, "/").is_some());
    }

    #[test]
    fn test_render_failure_is_500() {
        let dir = routes(&[("bad.md", "---\ntitle: [oops\n---\n")]);
        assert!(matches!(resolve("/bad/", dir.path()), Reply::Failed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_template_is_500() {
        let dir = routes(&[("index.md", "hi")]);
        use std::os::unix::fs::PermissionsExt;
        let template = dir.path().join("template.html");
        fs::write(&template, "{{slot}}").unwrap();
        fs::set_permissions(&template, fs::Permissions::from_mode(0o000)).unwrap();

        // Root can read anything; only assert when the permission took effect.
        if fs::read(&template).is_err() {
            assert!(matches!(resolve("/", dir.path()), Reply::Failed(_)));
        }
    }

    #[test]
    fn test_inject_after_doctype() {
        let html = inject_reload_script("<!DOCTYPE html><body>x</body>");
        assert_eq!(html, format!("<!DOCTYPE html>{RELOAD_SCRIPT}<body>x</body>"));
    }

    #[test]
    fn test_inject_wraps_bare_document() {
        let html = inject_reload_script("<p>x</p>");
        assert_eq!(html, format!("<head>{RELOAD_SCRIPT}</head><p>x</p>"));
    }

    #[test]
    fn test_fallback_template_gets_script() {
        let dir = routes(&[("solo.md", "alone")]);
        let html = page(resolve("/solo/", dir.path()));
        assert!(html.starts_with(&format!("<!doctype html>{RELOAD_SCRIPT}<body>")));
    }

    #[test]
    fn test_request_path() {
        assert_eq!(request_path("/blog/my%20post/?t=1"), "/blog/my post/");
        assert_eq!(request_path("/a.css?v=2"), "/a.css");
    }

    #[test]
    fn test_reload_page() {
        assert_eq!(reload_page("/_devws/blog/"), Some("/blog/".into()));
        assert_eq!(reload_page("/_devws"), Some("/".into()));
        assert_eq!(reload_page("/_devwsx/"), None);
        assert_eq!(reload_page("/blog/"), None);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a.png")), "image/png");
        assert_eq!(guess_content_type(Path::new("a.unknown")), "application/octet-stream");
        assert_eq!(guess_content_type(Path::new("CNAME")), "application/octet-stream");
    }
}
