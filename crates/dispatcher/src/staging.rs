//! Config staging area.
//!
//! One subdirectory per active job, named by `SID`, holding the job's
//! uploaded config artifact. Created on submission, read on lease,
//! deleted after result archival (or on delete/redo). Callers hold the
//! dispatcher's filesystem lock around multi-step sequences.

use std::path::{Path, PathBuf};

use simdock_core::Sid;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// The staging subdirectory for a job.
pub fn job_dir(staging_root: &Path, sid: Sid) -> PathBuf {
    staging_root.join(sid.to_string())
}

/// Write uploaded bytes to a private temporary file under the staging
/// root. The file is promoted into the job directory with [`promote`]
/// once the row exists.
pub async fn write_temp(staging_root: &Path, bytes: &[u8]) -> AppResult<PathBuf> {
    tokio::fs::create_dir_all(staging_root).await.map_err(|e| {
        AppError::Filesystem(format!(
            "failed to create staging root {}: {e}",
            staging_root.display()
        ))
    })?;

    let temp = staging_root.join(format!("upload-{}.tmp", Uuid::new_v4()));
    tokio::fs::write(&temp, bytes).await.map_err(|e| {
        AppError::Filesystem(format!("failed to write temp file {}: {e}", temp.display()))
    })?;
    Ok(temp)
}

/// Create `<staging>/<sid>/` and move the temp file into it under the
/// submitter's original filename.
pub async fn promote(
    temp: &Path,
    staging_root: &Path,
    sid: Sid,
    original_filename: &str,
) -> AppResult<PathBuf> {
    let dir = job_dir(staging_root, sid);
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        AppError::Filesystem(format!("failed to create {}: {e}", dir.display()))
    })?;

    let dest = dir.join(original_filename);
    tokio::fs::rename(temp, &dest).await.map_err(|e| {
        AppError::Filesystem(format!(
            "failed to rename {} to {}: {e}",
            temp.display(),
            dest.display()
        ))
    })?;
    Ok(dest)
}

/// Locate the job's config file: the single `*.json5` file in its
/// staging directory.
pub async fn find_config_file(dir: &Path) -> AppResult<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        AppError::Filesystem(format!("failed to read {}: {e}", dir.display()))
    })?;

    while let Some(entry) = entries.next_entry().await.map_err(|e| {
        AppError::Filesystem(format!("failed to read {}: {e}", dir.display()))
    })? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json5") {
            return Ok(path);
        }
    }

    Err(AppError::Filesystem(format!(
        "no config file found in {}",
        dir.display()
    )))
}

/// Remove a job's staging directory. Missing directories are fine.
pub async fn remove_job_dir(staging_root: &Path, sid: Sid) -> AppResult<()> {
    let dir = job_dir(staging_root, sid);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::Filesystem(format!(
            "failed to remove {}: {e}",
            dir.display()
        ))),
    }
}
