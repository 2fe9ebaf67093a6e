//! Development server with live reload
//!
//! Provides a local development server with:
//! - Static file serving with the reload client injected into HTML
//! - One live reload transport (polling, SSE or WebSocket)
//! - File watching feeding the reload core

mod watcher;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::lookup_host;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use crate::cli::DevServerOptions;
use crate::client::inject_client;
use crate::config::Config;
use crate::reload::ReloadContext;
use crate::utils::{clean_path, is_subpath};

pub use watcher::{host_payload_for, FileWatcher};

/// Shared server state
struct ServerState {
    /// Directory being served
    root: PathBuf,

    /// Live reload core
    context: Arc<ReloadContext>,
}

/// Development server
pub struct DevServer {
    /// Project configuration
    config: Arc<Config>,

    /// Server options
    options: DevServerOptions,
}

impl DevServer {
    /// Create a new development server
    pub fn new(config: Arc<Config>, options: DevServerOptions) -> Result<Self> {
        Ok(Self { config, options })
    }

    /// Start the development server and run until Ctrl+C
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = lookup_host((self.options.host.as_str(), self.options.port))
            .await
            .with_context(|| format!("Failed to resolve {}", self.options.host))?
            .next()
            .with_context(|| format!("No address for {}", self.options.host))?;

        let context = ReloadContext::new(self.config.clone())?;
        let root = self.config.root();

        let _watcher = FileWatcher::start(root.clone(), context.clone())?;

        let app = build_router(root, context.clone());

        // Open browser if requested
        if self.options.open {
            let url = format!("http://{}", addr);
            if let Err(e) = webbrowser_open(&url) {
                debug!("Failed to open browser: {}", e);
            }
        }

        info!("Server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(context.clone()))
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

/// Resolve once Ctrl+C arrives, tearing the reload context down first so
/// open event streams end and the server can drain
async fn shutdown_signal(context: Arc<ReloadContext>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    context.shutdown();
}

/// Router serving `root` with the context's transport mounted
pub fn build_router(root: PathBuf, context: Arc<ReloadContext>) -> Router {
    let transport_routes = context.transport().routes();
    let state = Arc::new(ServerState { root, context });

    Router::new()
        .route("/", get(serve_index))
        .route("/*path", get(serve_file))
        .with_state(state)
        .merge(transport_routes)
        .layer(CorsLayer::permissive())
}

/// Serve the index.html file
async fn serve_index(State(state): State<Arc<ServerState>>) -> Response {
    serve_path(&state, "").await
}

/// Serve static files
async fn serve_file(
    State(state): State<Arc<ServerState>>,
    axum::extract::Path(path): axum::extract::Path<String>,
) -> Response {
    serve_path(&state, &path).await
}

async fn serve_path(state: &ServerState, path: &str) -> Response {
    // Joining an absolute path would replace the root, so the result is
    // always relative
    let relative = clean_path(path).trim_start_matches('/').to_string();
    let mut file_path = state.root.join(&relative);

    if file_path.is_dir() {
        file_path = file_path.join("index.html");
    }

    // Symlinks may still point elsewhere
    if file_path.exists() && !is_subpath(&file_path, &state.root) {
        debug!("Refusing to serve {} outside the root", file_path.display());
        return (StatusCode::NOT_FOUND, format!("File not found: {}", path)).into_response();
    }

    if !file_path.exists() {
        if relative.is_empty() {
            let html = generate_default_index(&state.root);
            return Html(inject_client(&html, &state.context.client_script())).into_response();
        }
        return (StatusCode::NOT_FOUND, format!("File not found: {}", path)).into_response();
    }

    let content_type = get_content_type(&file_path);

    if content_type.starts_with("text/html") {
        return match tokio::fs::read_to_string(&file_path).await {
            Ok(content) => {
                Html(inject_client(&content, &state.context.client_script())).into_response()
            }
            Err(e) => {
                error!("Failed to read {}: {}", file_path.display(), e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
            }
        };
    }

    match tokio::fs::read(&file_path).await {
        Ok(content) => {
            let mut response = content.into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(content_type),
            );
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            response
        }
        Err(e) => {
            error!("Failed to read file {}: {}", path, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
        }
    }
}

/// Get content type for a file
fn get_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" | "map" => "application/json; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Generate a placeholder index.html for a root without one
fn generate_default_index(root: &Path) -> String {
    let title = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dev-reload");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>{}</title>
  </head>
  <body>
    <p>No index.html in this directory yet. Create one and this page reloads.</p>
  </body>
</html>
"#,
        title
    )
}

/// Open URL in browser (simple implementation)
fn webbrowser_open(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .spawn()?;
    }

    Ok(())
}
