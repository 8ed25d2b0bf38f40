//! Live reload channel.
//!
//! Each open page holds one WebSocket to `/_devws/<page path>`. The
//! connection owns a `notify` watcher on the page's content file and its
//! template, and pushes `"reload"` when either is written.
//!
//! ```text
//! Connecting ──watch ok + upgrade──► Open ──close / read error / watch error──► Closed
//!      │
//!      └── no page (404), no key (400), watch failed (500): never upgraded
//! ```
//!
//! `tiny_http` hands back the upgraded connection as one stream that cannot
//! be split, so the session thread does both jobs: it waits on watch events
//! and, when the wait times out, pings the client and reads until the pong
//! to find out whether it is still there.

use crate::{
    compiler::find_template_file,
    error::{SiteError, SiteResult},
    log,
    serve::{find_content, header},
};
use anyhow::Result;
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{ModifyKind, RemoveKind},
};
use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    time::Duration,
};
use tiny_http::{Request, Response, StatusCode};
use tungstenite::{Message, WebSocket, handshake::derive_accept_key, protocol::Role};

/// URL prefix of the reload endpoint.
pub const RELOAD_PREFIX: &str = "/_devws";

/// Text frame telling the page to refresh.
pub const RELOAD_MESSAGE: &str = "reload";

/// Idle time after which the client is pinged.
const HEARTBEAT: Duration = Duration::from_secs(2);

/// Frames read while waiting for a pong before the client is given up on.
const MAX_PROBE_FRAMES: usize = 8;

/// Accept a reload connection for `page` (a directory-style URL like `/blog/`).
pub fn handle_reload(request: Request, page: &str, content: &Path) -> Result<()> {
    let Some(found) = find_content(content, page) else {
        return reject(request, 404, &format!("no page at `{page}`"));
    };

    let key = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Sec-WebSocket-Key"))
        .map(|h| h.value.as_str().to_owned());
    let Some(key) = key else {
        return reject(request, 400, "missing Sec-WebSocket-Key");
    };

    let template = if found.is_markdown {
        find_template_file(&found.path)
    } else {
        None
    };

    let watch = match WatchSet::new(&found.path, template.as_deref()) {
        Ok(watch) => watch,
        Err(e) => {
            let err = anyhow::Error::from(e);
            log!("error"; "{err:#}");
            return reject(request, 500, &format!("{err:#}"));
        }
    };

    let response = Response::new_empty(StatusCode(101))
        .with_header(header("Upgrade", "websocket")?)
        .with_header(header("Connection", "Upgrade")?)
        .with_header(header("Sec-WebSocket-Accept", &derive_accept_key(key.as_bytes()))?);
    let stream = request.upgrade("websocket", response);
    let socket = WebSocket::from_raw_socket(stream, Role::Server, None);

    ReloadSession::new(socket, watch, page).run();
    Ok(())
}

fn reject(request: Request, status: u16, message: &str) -> Result<()> {
    log!("reload"; "{status}: {message}");
    let response = Response::from_string(message)
        .with_status_code(StatusCode(status))
        .with_header(header("Content-Type", "text/plain; charset=utf-8")?);
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Watch
// ============================================================================

/// The files one page depends on, and the events raised for them.
pub struct WatchSet {
    // Dropping the watcher closes the event channel.
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    paths: Vec<PathBuf>,
}

impl WatchSet {
    /// Watch `content`, and `template` when the page has one.
    pub fn new(content: &Path, template: Option<&Path>) -> SiteResult<Self> {
        let (tx, events) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx)
            .map_err(|e| SiteError::Watch(content.to_path_buf(), e))?;

        let paths: Vec<PathBuf> = std::iter::once(content)
            .chain(template)
            .map(Path::to_path_buf)
            .collect();
        for path in &paths {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| SiteError::Watch(path.clone(), e))?;
        }

        Ok(Self {
            _watcher: watcher,
            events,
            paths,
        })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Whether an event means a watched file now has different content.
///
/// Editors that save by renaming a new file over the old one show up as
/// a rename or removal of the watched path.
fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Name(_))
            | EventKind::Remove(RemoveKind::File | RemoveKind::Any)
    )
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// One upgraded reload connection and the watch it reports on.
pub struct ReloadSession<S: Read + Write> {
    socket: WebSocket<S>,
    watch: WatchSet,
    page: String,
    state: SessionState,
}

impl<S: Read + Write> ReloadSession<S> {
    pub fn new(socket: WebSocket<S>, watch: WatchSet, page: &str) -> Self {
        Self {
            socket,
            watch,
            page: page.to_owned(),
            state: SessionState::Connecting,
        }
    }

    /// Serve the connection until it closes. Socket and watcher are
    /// released when `self` drops.
    pub fn run(mut self) {
        self.state = SessionState::Open;
        log!("reload"; "watching {} for {}", self.watch.paths().len(), self.page);

        while self.state == SessionState::Open {
            self.state = self.step();
        }

        let _ = self.socket.close(None);
        let _ = self.socket.flush();
        log!("reload"; "closed {}", self.page);
    }

    fn step(&mut self) -> SessionState {
        match self.watch.events.recv_timeout(HEARTBEAT) {
            Ok(Ok(event)) if is_change(&event.kind) => self.send_reload(),
            Ok(Ok(_)) => SessionState::Open,
            Ok(Err(e)) => {
                log!("error"; "watch error for {}: {e}", self.page);
                SessionState::Closed
            }
            Err(RecvTimeoutError::Timeout) => self.probe(),
            Err(RecvTimeoutError::Disconnected) => SessionState::Closed,
        }
    }

    fn send_reload(&mut self) -> SessionState {
        // One save often raises several events; answer them with one message.
        while self.watch.events.try_recv().is_ok() {}

        log!("reload"; "{}", self.page);
        match self.socket.send(Message::text(RELOAD_MESSAGE)) {
            Ok(()) => SessionState::Open,
            Err(_) => SessionState::Closed,
        }
    }

    /// Ping the client and read until its pong. Anything else it sends is
    /// discarded, up to [`MAX_PROBE_FRAMES`] frames.
    ///
    /// The ping stays unacknowledged on a half-open connection, so the
    /// kernel eventually fails the read with a timeout.
    fn probe(&mut self) -> SessionState {
        if self.socket.send(Message::Ping(Default::default())).is_err() {
            return SessionState::Closed;
        }
        for _ in 0..MAX_PROBE_FRAMES {
            match self.socket.read() {
                Ok(Message::Pong(_)) => return SessionState::Open,
                Ok(Message::Close(_)) | Err(_) => return SessionState::Closed,
                Ok(_) => {}
            }
        }
        log!("reload"; "no pong from {}, closing", self.page);
        SessionState::Closed
    }
}

// ============================================================================
// Tests
// ============================================================================
