use crate::errors::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path as UrlPath, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::warn;

pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("webmanifest") => "application/manifest+json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff2") => "font/woff2",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Join `requested` under `root`, refusing anything that could climb out of
/// it. `None` means the path was rejected.
pub fn resolve_static_path(root: &Path, requested: &str) -> Option<PathBuf> {
    if requested.is_empty() || requested.contains('\\') || requested.contains('\0') {
        return None;
    }

    let mut resolved = root.to_path_buf();
    for component in Path::new(requested).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

pub async fn serve_static(
    State(state): State<AppState>,
    UrlPath(requested): UrlPath<String>,
) -> Result<Response, AppError> {
    let Some(path) = resolve_static_path(&state.static_dir, &requested) else {
        warn!("rejected static path {requested:?}");
        return Err(AppError::forbidden("forbidden"));
    };

    match fs::read(&path).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, content_type_for(&path))], bytes).into_response()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(AppError::not_found("not found")),
        Err(err) if err.kind() == std::io::ErrorKind::IsADirectory => Err(AppError::not_found("not found")),
        Err(err) => Err(AppError::internal(err)),
    }
}
