use postwatch_core::StorageError;
use std::path::Path;
use uuid::Uuid;

/// Writes `bytes` to a sibling temp file and renames it over `path`, so
/// readers never observe a partially written file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let write_failed = |reason: String| StorageError::WriteFailed {
        path: path.display().to_string(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write_failed(format!("creating {}: {}", parent.display(), e)))?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| write_failed("path has no file name".to_string()))?;
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e.to_string()));
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(format!("rename: {}", e)));
    }

    Ok(())
}
