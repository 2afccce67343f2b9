//! Result archival.
//!
//! On completion (or during recovery) the job directory's interesting
//! files are bundled into `results.tar.gz`: configs, CSV outputs, and
//! logs, non-recursively. The archive is built by the system `tar`, the
//! same tool the dispatcher uses to unpack it.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{AgentError, Result};

/// Fixed name of the result bundle.
pub const ARCHIVE_NAME: &str = "results.tar.gz";

/// File extensions worth shipping back.
const ARCHIVE_EXTENSIONS: &[&str] = &["json5", "csv", "log"];

/// Marker file written by a simulator that finished its run.
pub const FINAL_REPORT: &str = "finrep.csv";

/// Secondary marker; present when the simulator got far enough to dump
/// statistics even if the final report is missing.
pub const STATS_REPORT: &str = "simstats.csv";

/// Build `results.tar.gz` in `dir` from all files matching the archive
/// patterns. Returns the archive path.
pub async fn build_results_archive(dir: &Path) -> Result<PathBuf> {
    let files = matching_files(dir).await?;
    if files.is_empty() {
        return Err(AgentError::Archive(format!(
            "no result files to archive in {}",
            dir.display()
        )));
    }

    let output = Command::new("tar")
        .arg("czf")
        .arg(ARCHIVE_NAME)
        .args(&files)
        .current_dir(dir)
        .output()
        .await?;

    if !output.status.success() {
        return Err(AgentError::Archive(format!(
            "tar exited with {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim(),
        )));
    }

    Ok(dir.join(ARCHIVE_NAME))
}

/// Names of the files in `dir` (non-recursive) that belong in the
/// archive. A stale archive from an earlier attempt is excluded.
pub async fn matching_files(dir: &Path) -> Result<Vec<String>> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == ARCHIVE_NAME {
            continue;
        }
        if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ARCHIVE_EXTENSIONS.contains(&ext))
        {
            found.push(name.to_string());
        }
    }

    found.sort();
    Ok(found)
}

/// Does the job directory contain a file with the given name?
pub async fn has_file(dir: &Path, name: &str) -> bool {
    tokio::fs::try_exists(dir.join(name)).await.unwrap_or(false)
}
