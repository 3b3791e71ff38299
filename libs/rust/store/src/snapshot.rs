use crate::{
    errors::{StoreError, StoreResult},
    reducer::Store,
};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Location of the snapshot the static cache server hands out for `network`.
pub fn snapshot_path(cache_dir: &Path, network: &str) -> PathBuf {
    cache_dir.join(format!("initialArcState-{network}.json"))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Hidden sibling the snapshot is staged in. The cache server never hands
/// out dot-files.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Writes the store next to `path` and renames it into place, so readers never
/// see a half-written file.
#[instrument(skip_all, fields(path = %path.display(), last_block = store.last_block))]
pub async fn write_snapshot(path: &Path, store: &Store) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_error(parent))?;
    }

    let body = serde_json::to_vec(store)?;
    let tmp_path = temp_path(path);
    tokio::fs::write(&tmp_path, &body)
        .await
        .map_err(io_error(&tmp_path))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(io_error(path))?;

    debug!(bytes = body.len(), "Snapshot written");
    Ok(())
}

#[instrument(skip_all, fields(path = %path.display()))]
pub async fn read_snapshot(path: &Path) -> StoreResult<Store> {
    let body = tokio::fs::read(path).await.map_err(io_error(path))?;
    let store = serde_json::from_slice(&body)?;
    Ok(store)
}
