use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use std::{
    io::ErrorKind,
    path::{Component, PathBuf},
    sync::Arc,
};
use tracing::{debug, error, warn};

/// Maps a request path onto a file under `root`. Only plain path segments
/// are accepted, so nothing outside `root` can be addressed.
pub fn resolve_path(root: &std::path::Path, requested: &str) -> Option<PathBuf> {
    let requested = std::path::Path::new(requested);
    let mut resolved = root.to_path_buf();
    let mut segments = 0;
    for component in requested.components() {
        match component {
            // Dot-files include snapshots still being written.
            Component::Normal(segment) if segment.to_string_lossy().starts_with('.') => {
                return None;
            }
            Component::Normal(segment) => {
                resolved.push(segment);
                segments += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (segments > 0).then_some(resolved)
}

fn content_type(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|extension| extension.to_str()) {
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

async fn serve_file(State(root): State<Arc<PathBuf>>, Path(requested): Path<String>) -> Response {
    let Some(path) = resolve_path(&root, &requested) else {
        warn!(path = %requested, "Rejected path outside the cache directory");
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(contents) => {
            debug!(path = %path.display(), bytes = contents.len(), "Serving cache file");
            Response::builder()
                .header(CONTENT_TYPE, content_type(&path))
                .header(CACHE_CONTROL, "no-cache")
                .body(Body::from(contents))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
            StatusCode::NOT_FOUND.into_response()
        }
        Err(err) => {
            error!(error = %err, path = %path.display(), "Failed to read cache file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn allow_any_origin(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

pub fn router(cache_dir: PathBuf) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/{*path}", get(serve_file))
        .with_state(Arc::new(cache_dir))
        .layer(middleware::map_response(allow_any_origin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_segments_stay_under_the_root() {
        let root = std::path::Path::new("/app/cache");
        assert_eq!(
            resolve_path(root, "initialArcState-rinkeby.json"),
            Some(PathBuf::from("/app/cache/initialArcState-rinkeby.json"))
        );
        assert_eq!(
            resolve_path(root, "./nested/file.json"),
            Some(PathBuf::from("/app/cache/nested/file.json"))
        );
    }

    #[test]
    fn traversal_is_rejected() {
        let root = std::path::Path::new("/app/cache");
        assert_eq!(resolve_path(root, "../etc/passwd"), None);
        assert_eq!(resolve_path(root, "nested/../../secret"), None);
        assert_eq!(resolve_path(root, "/etc/passwd"), None);
        assert_eq!(resolve_path(root, ""), None);
    }

    #[test]
    fn hidden_files_are_not_served() {
        let root = std::path::Path::new("/app/cache");
        assert_eq!(
            resolve_path(root, ".initialArcState-main.json.tmp"),
            None
        );
        assert_eq!(resolve_path(root, "nested/.env"), None);
    }

    #[test]
    fn json_files_are_served_as_json() {
        assert_eq!(
            content_type(std::path::Path::new("initialArcState-main.json")),
            "application/json"
        );
        assert_eq!(
            content_type(std::path::Path::new("snapshot.bin")),
            "application/octet-stream"
        );
    }
}
