//! Machine identity.
//!
//! The lease contract keys on a stable per-host identifier. The OS
//! machine id is used where available; otherwise a UUID is generated
//! once and persisted next to the agent's data so restarts keep the
//! same identity (recovery depends on it).

use std::path::Path;

use crate::error::{AgentError, Result};

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Resolve this host's machine id.
pub fn machine_id(data_dir: &Path) -> Result<String> {
    for path in MACHINE_ID_PATHS {
        if let Ok(contents) = std::fs::read_to_string(path) {
            let id = contents.trim();
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
    }
    persisted_fallback(data_dir)
}

/// Generate a UUID on first run and reuse it afterwards.
fn persisted_fallback(data_dir: &Path) -> Result<String> {
    let path = data_dir.join("machine-id");
    if let Ok(contents) = std::fs::read_to_string(&path) {
        let id = contents.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&path, &id).map_err(AgentError::Io)?;
    Ok(id)
}
