//! Results archive area.
//!
//! Result bundles are extracted into a date-partitioned tree:
//! `<root>/YYYY/M/D/<sid>/`. Month and day are unpadded; `Redo` relies
//! on that exact shape when it searches for a job's results.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Datelike;
use tokio::process::Command;

use simdock_core::{Sid, Timestamp};

use crate::error::{AppError, AppResult};

/// Tar extraction attempts before the ingest is declared fatal.
const MAX_EXTRACT_ATTEMPTS: u32 = 3;

/// Delay between extraction attempts.
const EXTRACT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// The results directory for a job archived at `when`.
pub fn partition_dir(results_root: &Path, when: Timestamp, sid: Sid) -> PathBuf {
    results_root
        .join(when.year().to_string())
        .join(when.month().to_string())
        .join(when.day().to_string())
        .join(sid.to_string())
}

/// Extract `filename` (a gzipped tar) in place inside `dir`, retrying
/// transient failures. The tarball itself is left on disk; the caller
/// deletes it after a successful extraction.
pub async fn extract_tarball(dir: &Path, filename: &str) -> AppResult<()> {
    let mut last_err = String::new();

    for attempt in 1..=MAX_EXTRACT_ATTEMPTS {
        match run_tar_extract(dir, filename).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max = MAX_EXTRACT_ATTEMPTS,
                    dir = %dir.display(),
                    error = %e,
                    "tar extraction attempt failed",
                );
                last_err = e;
                if attempt < MAX_EXTRACT_ATTEMPTS {
                    tokio::time::sleep(EXTRACT_RETRY_DELAY).await;
                }
            }
        }
    }

    Err(AppError::Archive(format!(
        "failed to extract {filename} after {MAX_EXTRACT_ATTEMPTS} attempts: {last_err}"
    )))
}

async fn run_tar_extract(dir: &Path, filename: &str) -> Result<(), String> {
    let output = Command::new("tar")
        .args(["xzf", filename])
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| format!("failed to run tar: {e}"))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(format!(
            "tar exited with {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim(),
        ))
    }
}

/// Search `<root>/*/*/*/<sid>` for a job's results directory. The scan
/// is pinned to exactly root + year/month/day + sid, so stray files or
/// deeper trees are never matched.
pub async fn find_results_dir(results_root: &Path, sid: Sid) -> AppResult<Option<PathBuf>> {
    let target = sid.to_string();

    for year in subdirs(results_root).await? {
        for month in subdirs(&year).await? {
            for day in subdirs(&month).await? {
                let candidate = day.join(&target);
                if candidate.is_dir() {
                    return Ok(Some(candidate));
                }
            }
        }
    }
    Ok(None)
}

async fn subdirs(dir: &Path) -> AppResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(e) => {
            return Err(AppError::Filesystem(format!(
                "failed to read {}: {e}",
                dir.display()
            )))
        }
    };

    while let Some(entry) = entries.next_entry().await.map_err(|e| {
        AppError::Filesystem(format!("failed to read {}: {e}", dir.display()))
    })? {
        let path = entry.path();
        if path.is_dir() {
            found.push(path);
        }
    }
    Ok(found)
}
