//! Dev server and live-reload signal
//!
//! Serves the output root as static content over `tiny_http` and accepts
//! WebSocket sessions on a sibling port for reload notifications. Served HTML
//! gets a small client script injected before `</body>`; the script itself is
//! served from memory.
//!
//! The reload signal is best-effort end to end: no connected session is a
//! silent no-op, and a failed send just prunes that client.

use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tiny_http::{Header, Request, Response, Server};
use tracing::{debug, warn};
use tungstenite::{Message, WebSocket};

use crate::error::{Error, Result};
use crate::executor::PipelineContext;
use crate::graph::NodeResult;

/// Base WebSocket port (the conventional livereload port); retried upward
const WS_PORT_BASE: u16 = 35729;

/// Maximum bind retry attempts per listener
const MAX_PORT_RETRIES: u16 = 10;

/// Reserved URL for the in-memory reload client script
const CLIENT_SCRIPT_PATH: &str = "/__assetpipe/reload.js";

const CLIENT_SCRIPT: &str = r#"(function () {
  var socket = new WebSocket("ws://" + location.hostname + ":__WS_PORT__");
  socket.onmessage = function (event) {
    if (event.data === "reload") {
      location.reload();
    }
  };
})();
"#;

/// Handle to the connected reload sessions.
///
/// Created empty with the pipeline context; the serve task feeds it accepted
/// sessions. `notify` before the server is up is therefore a no-op, which is
/// exactly the best-effort contract.
pub struct ReloadHandle {
    clients: Mutex<Vec<WebSocket<TcpStream>>>,
}

impl ReloadHandle {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
        }
    }

    /// Broadcast a reload to every connected session, pruning dead ones.
    /// Never fails; delivery problems only drop that client.
    pub fn notify(&self) {
        let Ok(mut clients) = self.clients.lock() else {
            return;
        };
        if clients.is_empty() {
            debug!("reload: no sessions connected");
            return;
        }

        let before = clients.len();
        clients.retain_mut(|ws| ws.send(Message::Text("reload".into())).is_ok());
        debug!(
            "reload: notified {} session(s), dropped {}",
            clients.len(),
            before - clients.len()
        );
    }

    fn register(&self, ws: WebSocket<TcpStream>) {
        if let Ok(mut clients) = self.clients.lock() {
            clients.push(ws);
        }
    }

    /// Number of connected sessions
    pub fn sessions(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for ReloadHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the dev server until the shutdown signal fires.
///
/// The accept loops live on detached threads; shutdown stops the graph and
/// process exit reaps them.
pub async fn run_server(ctx: Arc<PipelineContext>) -> NodeResult {
    use console::style;

    // A cloned receiver marks the current value as seen, so an already-fired
    // shutdown has to be checked explicitly.
    let mut shutdown = ctx.shutdown.clone();
    if *shutdown.borrow() {
        return NodeResult::default();
    }

    match start(&ctx) {
        Ok((addr, ws_port)) => {
            println!(
                "{} Serving {} at {}",
                style("🌐").cyan(),
                style(ctx.config.output_root().display()).bold(),
                style(format!("http://{addr}")).green()
            );
            debug!("reload websocket on port {ws_port}");
        }
        Err(e) => {
            tracing::error!("{e}");
            return NodeResult::default();
        }
    }

    let _ = shutdown.changed().await;
    NodeResult::default()
}

/// Bind both listeners and spawn their accept loops
fn start(ctx: &Arc<PipelineContext>) -> Result<(String, u16)> {
    let interface = ctx.config.serve.interface.clone();
    let root = ctx.config.output_root();

    let (server, http_port) = bind_http(&interface, ctx.config.serve.port)?;
    let (ws_listener, ws_port) = bind_ws(&interface, WS_PORT_BASE)?;

    let reload = Arc::clone(&ctx.reload);
    std::thread::spawn(move || {
        for stream in ws_listener.incoming() {
            let Ok(stream) = stream else { continue };
            match tungstenite::accept(stream) {
                Ok(ws) => {
                    debug!("reload session connected");
                    reload.register(ws);
                }
                Err(e) => debug!("websocket handshake failed: {e}"),
            }
        }
    });

    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            if let Err(e) = handle_request(request, &root, ws_port) {
                warn!("request failed: {e}");
            }
        }
    });

    Ok((format!("{interface}:{http_port}"), ws_port))
}

/// Bind the HTTP server, retrying successive ports when occupied
fn bind_http(interface: &str, base_port: u16) -> Result<(Server, u16)> {
    let mut last_error = None;

    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        match Server::http(format!("{interface}:{port}")) {
            Ok(server) => return Ok((server, port)),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    Err(Error::ServeBind {
        reason: format!(
            "no free port after {MAX_PORT_RETRIES} attempts from {base_port}: {}",
            last_error.unwrap_or_default()
        ),
    })
}

/// Bind the WebSocket listener, retrying successive ports when occupied
fn bind_ws(interface: &str, base_port: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind((interface, port)) {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    Err(Error::ServeBind {
        reason: format!(
            "no free websocket port after {MAX_PORT_RETRIES} attempts from {base_port}: {}",
            last_error.unwrap_or_default()
        ),
    })
}

/// Handle a single HTTP request
fn handle_request(request: Request, root: &Path, ws_port: u16) -> std::io::Result<()> {
    let url = request.url();
    let path_part = url.split(['?', '#']).next().unwrap_or("/");

    if path_part == CLIENT_SCRIPT_PATH {
        let body = CLIENT_SCRIPT.replace("__WS_PORT__", &ws_port.to_string());
        return respond(request, body.into_bytes(), "application/javascript");
    }

    let Some(path) = resolve_path(root, path_part) else {
        return respond_not_found(request);
    };

    match std::fs::read(&path) {
        Ok(bytes) => {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            if ext == "html" {
                return match String::from_utf8(bytes) {
                    Ok(html) => respond(
                        request,
                        inject_client_script(&html).into_bytes(),
                        "text/html; charset=utf-8",
                    ),
                    Err(e) => respond(request, e.into_bytes(), mime_for(ext)),
                };
            }
            respond(request, bytes, mime_for(ext))
        }
        Err(_) => respond_not_found(request),
    }
}

/// Map a URL path to a file under the output root.
///
/// Directory URLs resolve to `index.html`; parent traversal is rejected.
fn resolve_path(root: &Path, url_path: &str) -> Option<PathBuf> {
    let rel = url_path.trim_start_matches('/');
    if rel.split('/').any(|segment| segment == "..") {
        return None;
    }

    let mut path = root.join(rel);
    if path.is_dir() {
        path = path.join("index.html");
    }
    Some(path)
}

/// Insert the reload client `<script>` tag before the closing body tag
fn inject_client_script(html: &str) -> String {
    let tag = format!("<script src=\"{CLIENT_SCRIPT_PATH}\"></script>");
    match html.rfind("</body>") {
        Some(idx) => format!("{}{}{}", &html[..idx], tag, &html[idx..]),
        None => format!("{html}{tag}"),
    }
}

fn respond(request: Request, body: Vec<u8>, content_type: &str) -> std::io::Result<()> {
    let mut response = Response::from_data(body);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        response = response.with_header(header);
    }
    request.respond(response)
}

fn respond_not_found(request: Request) -> std::io::Result<()> {
    request.respond(Response::from_string("404 Not Found").with_status_code(404))
}

fn mime_for(ext: &str) -> &'static str {
    match ext {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" | "webmanifest" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_with_no_sessions_is_a_noop() {
        let handle = ReloadHandle::new();
        assert_eq!(handle.sessions(), 0);
        handle.notify();
        handle.notify();
        assert_eq!(handle.sessions(), 0);
    }

    #[test]
    fn test_inject_before_closing_body() {
        let html = "<html><body><h1>hi</h1></body></html>";
        let out = inject_client_script(html);
        let script_at = out.find(CLIENT_SCRIPT_PATH).unwrap();
        let body_close_at = out.rfind("</body>").unwrap();
        assert!(script_at < body_close_at);
    }

    #[test]
    fn test_inject_appends_without_body_tag() {
        let out = inject_client_script("<p>fragment</p>");
        assert!(out.ends_with("</script>"));
        assert!(out.starts_with("<p>fragment</p>"));
    }

    #[test]
    fn test_resolve_path_rejects_traversal() {
        let root = Path::new("/srv/dist");
        assert!(resolve_path(root, "/../etc/passwd").is_none());
        assert!(resolve_path(root, "/css/../../secret").is_none());
        assert_eq!(
            resolve_path(root, "/css/site.css"),
            Some(PathBuf::from("/srv/dist/css/site.css"))
        );
    }

    #[test]
    fn test_mime_table() {
        assert_eq!(mime_for("css"), "text/css");
        assert_eq!(mime_for("woff2"), "font/woff2");
        assert_eq!(mime_for("weird"), "application/octet-stream");
    }
}
