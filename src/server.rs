//!
//! filegate HTTP server
//! --------------------
//! This module defines the Axum-based HTTP surface for filegate.
//!
//! Responsibilities:
//! - Session management with a simple cookie model.
//! - Login/logout endpoints backed by the `security` module.
//! - Direct-mode serving (`/files`): resolver-cleared bytes with type,
//!   length and private one-hour cache headers, or the group fallback, or a
//!   plain-text denial.
//! - Embedded-mode rendering (`/files/embed`): a hyperlink-wrapped image
//!   reference or an escaped error notice, always as an HTML fragment.
//! - Startup wiring: data root, default admin, group table, message catalog.

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use getrandom::getrandom;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::ServeError;
use crate::messages::{Catalog, Localizer};
use crate::mimetype::{self, SniffDetector};
use crate::render::{self, DisplayHints};
use crate::resolver::{self, ResolveRequest, Resolution};
use crate::security::{self, UserStore};

const SESSION_COOKIE: &str = "filegate_session";

/// Shared server state injected into all handlers.
///
/// The group table and message catalog are immutable after startup; the
/// session map is the only mutable shared state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub data_root: PathBuf,
    pub catalog: Arc<Catalog>,
    /// Session id -> username mapping
    pub sessions: Arc<RwLock<HashMap<String, String>>>,
}

impl AppState {
    pub fn new(config: AppConfig, data_root: PathBuf, catalog: Catalog) -> Self {
        Self {
            config: Arc::new(config),
            data_root,
            catalog: Arc::new(catalog),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

/// Start the filegate HTTP server with settings taken from the environment.
pub async fn run() -> anyhow::Result<()> {
    let http_port: u16 = std::env::var("FILEGATE_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7878);
    let groups_file =
        std::env::var("FILEGATE_GROUPS").unwrap_or_else(|_| "groups.json".to_string());
    let data_root = std::env::var("FILEGATE_DATA_ROOT").unwrap_or_else(|_| "data".to_string());
    let locale = std::env::var("FILEGATE_LOCALE").unwrap_or_else(|_| "en".to_string());
    run_with(
        http_port,
        Path::new(&groups_file),
        Path::new(&data_root),
        &locale,
    )
    .await
}

/// Start the server with explicit settings.
pub async fn run_with(
    http_port: u16,
    groups_file: &Path,
    data_root: &Path,
    locale: &str,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_root)
        .with_context(|| format!("Failed to create or access data root: {}", data_root.display()))?;
    security::ensure_default_admin(data_root)
        .with_context(|| format!("While ensuring default admin under: {}", data_root.display()))?;

    let config = AppConfig::load(groups_file)
        .with_context(|| format!("While loading group table from: {}", groups_file.display()))?;
    log_configured_groups(&config);

    let catalog = Catalog::load(data_root, locale);
    let app_state = AppState::new(config, data_root.to_path_buf(), catalog);

    let app = router(app_state);
    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Mount all routes. `render::FILES_ROUTE` is the direct-fetch mount point
/// the embedded fragments link back to.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "filegate ok" }))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route(render::FILES_ROUTE, get(fetch_file))
        .route("/files/embed", get(embed_file))
        .with_state(state)
}

fn log_configured_groups(config: &AppConfig) {
    if config.is_empty() {
        println!("No file groups configured");
        tracing::warn!("No file groups configured, every request will be denied");
        return;
    }
    println!("Configured file groups:");
    tracing::info!("Configured file groups:");
    for name in config.group_names() {
        let group = config.group(name).unwrap();
        let line = format!(
            "- {}: base={}, right={}, mimetypes=[{}]",
            name,
            group.base.display(),
            group.right.as_deref().unwrap_or("<none>"),
            group.mimetypes.join(", ")
        );
        println!("{}", line);
        tracing::info!("{}", line);
    }
}

// ---- Session plumbing ----

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

async fn actor_from_headers(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let sid = parse_cookie(headers, SESSION_COOKIE)?;
    let map = state.sessions.read().await;
    map.get(&sid).cloned()
}

fn set_session_cookie(sid: &str) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Secure; SameSite=Strict; Path=/",
        SESSION_COOKIE, sid
    ))
    .unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/",
        SESSION_COOKIE
    ))
    .unwrap()
}

fn random_hex(len_bytes: usize) -> String {
    let mut bytes = vec![0u8; len_bytes];
    let _ = getrandom(&mut bytes);
    let mut out = String::with_capacity(len_bytes * 2);
    use std::fmt::Write as _;
    for b in &bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> Response {
    match security::authenticate(&state.data_root, &payload.username, &payload.password) {
        Ok(true) => {
            let sid = random_hex(16);
            {
                let mut map = state.sessions.write().await;
                map.insert(sid.clone(), payload.username.clone());
            }
            info!(user = %payload.username, "login");
            let mut headers = HeaderMap::new();
            headers.insert("Set-Cookie", set_session_cookie(&sid));
            (StatusCode::OK, headers, Json(serde_json::json!({"status":"ok"}))).into_response()
        }
        Ok(false) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"status":"unauthorized"})),
        )
            .into_response(),
        Err(e) => {
            error!("login error: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status":"error","error": e.to_string()})),
            )
                .into_response()
        }
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(sid) = parse_cookie(&headers, SESSION_COOKIE) {
        let mut map = state.sessions.write().await;
        map.remove(&sid);
    }
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", clear_session_cookie());
    (StatusCode::OK, h, Json(serde_json::json!({"status":"ok"}))).into_response()
}

// ---- File serving ----

#[derive(Debug, Deserialize, Default)]
pub struct FileQuery {
    #[serde(default)]
    pub g: String,
    #[serde(default)]
    pub f: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct EmbedQuery {
    #[serde(default)]
    pub g: String,
    #[serde(default)]
    pub f: String,
    #[serde(default)]
    pub width: String,
    #[serde(default)]
    pub height: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub title: String,
}

/// Numeric display hints are read leniently: anything non-numeric counts as
/// absent rather than rejecting the request.
fn lenient_u32(raw: &str) -> u32 {
    raw.trim().parse().unwrap_or(0)
}

/// Direct mode: resolve and stream the bytes, or fall back, or deny.
pub async fn fetch_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<FileQuery>,
) -> Response {
    let actor = actor_from_headers(&state, &headers).await;
    let perms = UserStore::new(state.data_root.clone());
    let req = ResolveRequest {
        group: &q.g,
        filename: &q.f,
        embedded: false,
        actor: actor.as_deref(),
    };
    match resolver::resolve(&state.config, &perms, &SniffDetector, &req) {
        Resolution::Serve { path, mime } => serve_bytes(&state, &path, &mime).await,
        Resolution::Deny { error, fallback } => deny_direct(&state, error, fallback.as_deref()).await,
    }
}

/// Embedded mode: resolve without the permission gate and answer an HTML
/// fragment either way; the direct URL inside the fragment re-enforces the
/// gate when the bytes are actually fetched.
pub async fn embed_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<EmbedQuery>,
) -> Response {
    let actor = actor_from_headers(&state, &headers).await;
    let perms = UserStore::new(state.data_root.clone());
    let req = ResolveRequest {
        group: &q.g,
        filename: &q.f,
        embedded: true,
        actor: actor.as_deref(),
    };
    match resolver::resolve(&state.config, &perms, &SniffDetector, &req) {
        Resolution::Serve { .. } => {
            let url = render::self_url(&q.g, &q.f);
            let hints = DisplayHints {
                width: lenient_u32(&q.width),
                height: lenient_u32(&q.height),
                alt: q.alt.clone(),
                title: q.title.clone(),
            };
            html_fragment(render::image_fragment(&url, &hints))
        }
        Resolution::Deny { error, .. } => {
            html_fragment(render::error_fragment(&state.catalog.text(error.message_key())))
        }
    }
}

fn html_fragment(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
        .into_response()
}

fn content_type_value(mime: &str) -> HeaderValue {
    HeaderValue::from_str(mime)
        .unwrap_or_else(|_| HeaderValue::from_static(mimetype::FALLBACK_TYPE))
}

/// Stream a resolver-cleared file with type, length and the private one-hour
/// cache pair.
pub async fn serve_bytes(state: &AppState, path: &Path, mime: &str) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            // Cleared by the resolver but gone or unreadable by the time we
            // read it; answer like any other unreadable file.
            error!(path = %path.display(), error = %e, "read failed after resolution");
            return plain_denial(state, ServeError::UnreadableFile);
        }
    };
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type_value(mime));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=3600"),
    );
    let expires = chrono::Utc::now() + chrono::Duration::hours(1);
    if let Ok(v) = HeaderValue::from_str(&expires.to_rfc2822()) {
        headers.insert(header::EXPIRES, v);
    }
    (StatusCode::OK, headers, bytes).into_response()
}

/// Direct-mode denial: serve the group fallback when one applies, otherwise
/// the localized plain-text message with the taxonomy status.
///
/// Historical behavior, preserved on purpose: the fallback body answers with
/// the default 200 status even though the logical outcome is 404/500.
pub async fn deny_direct(state: &AppState, error: ServeError, fallback: Option<&Path>) -> Response {
    if let Some(fb) = fallback {
        match tokio::fs::read(fb).await {
            Ok(bytes) => {
                let mime = mimetype::detect(fb)
                    .unwrap_or_else(|_| mimetype::FALLBACK_TYPE.to_string());
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, content_type_value(&mime));
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
                return (StatusCode::OK, headers, bytes).into_response();
            }
            Err(e) => {
                warn!(fallback = %fb.display(), error = %e, "configured fallback is unreadable");
            }
        }
    }
    plain_denial(state, error)
}

fn plain_denial(state: &AppState, error: ServeError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let text = state.catalog.text(error.message_key());
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    )
        .into_response()
}
