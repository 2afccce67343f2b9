//! Crash recovery.
//!
//! At startup the agent reconciles its on-disk simulations with the
//! dispatcher's view of what this machine owes, without losing work:
//!
//! 1. Fetch the dispatcher's incomplete-items list for this machine.
//! 2. Enumerate local simulation directories.
//! 3. Delete local directories the dispatcher no longer attributes to
//!    us (the job was rebooked elsewhere).
//! 4. Recover each remaining item according to its state.
//!
//! Recovery assumes simulator launches are idempotent while the job
//! directory is intact, and that the dispatcher never leases one `SID`
//! to two machines at once.

use std::collections::HashSet;

use simdock_core::protocol::QueueItem;
use simdock_core::state::SimState;
use simdock_core::Sid;

use crate::archive;
use crate::client::BookOutcome;
use crate::error::Result;
use crate::monitor;
use crate::probe;
use crate::supervisor::Supervisor;

/// Reconcile local state with the dispatcher and resume or finish every
/// simulation this machine still owes.
pub async fn rebuild(supervisor: &Supervisor) -> Result<()> {
    let owed = supervisor.client.machine_queue().await?;
    let owed_sids: HashSet<Sid> = owed.iter().map(|item| item.sid).collect();

    let sims_dir = supervisor.cfg.simulations_dir();
    tokio::fs::create_dir_all(&sims_dir).await?;

    if !owed.is_empty() {
        tracing::info!(
            count = owed.len(),
            sids = ?owed_sids,
            "dispatcher reports simulations belonging to this machine",
        );
    }

    // Garbage-collect directories the dispatcher no longer believes we
    // own; the job was rebooked elsewhere or deleted.
    let mut entries = tokio::fs::read_dir(&sims_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let known = name
            .parse::<Sid>()
            .is_ok_and(|sid| owed_sids.contains(&sid));
        if !known {
            tracing::info!(dir = %name, "deleting simulation not listed by dispatcher");
            if let Err(e) = tokio::fs::remove_dir_all(entry.path()).await {
                tracing::warn!(dir = %name, error = %e, "failed to delete stale directory");
            }
        }
    }

    for item in &owed {
        match SimState::from_code(item.state) {
            Some(SimState::Booked) => recover_booked(supervisor, item).await,
            Some(SimState::Executing) => recover_executing(supervisor, item).await,
            Some(SimState::Completed) => recover_completed(supervisor, item).await,
            _ => {
                tracing::warn!(sid = item.sid, state = item.state, "unexpected state in machine queue");
            }
        }
    }

    Ok(())
}

/// Booked: the simulator never reported executing. It may nevertheless
/// have finished (results on disk), still be running (reattach), have
/// lost its config (rebook), or simply need a restart.
async fn recover_booked(supervisor: &Supervisor, item: &QueueItem) {
    let sid = item.sid;
    tracing::info!(sid, "recovering booked simulation");
    let dir = supervisor.cfg.job_dir(sid);

    if recover_by_files(supervisor, sid).await {
        return;
    }

    if let Some(found) = probe::find_running_simulator(
        &supervisor.probe_http,
        supervisor.cfg.probe_ports(),
        sid,
    )
    .await
    {
        supervisor.attach(sid, found).await;
        return;
    }

    match find_config(&dir).await {
        Some(config_path) => {
            tracing::info!(sid, "restarting simulator with existing config");
            if let Err(e) = supervisor.start_simulation(sid, config_path).await {
                tracing::error!(sid, error = %e, "failed to restart simulator");
            }
        }
        None => {
            tracing::info!(sid, "config file missing; rebooking");
            rebook(supervisor, sid).await;
        }
    }
}

/// Executing: the simulator got far enough to report in. Prefer a live
/// reattach, fall back to results on disk, else rebook from scratch.
async fn recover_executing(supervisor: &Supervisor, item: &QueueItem) {
    let sid = item.sid;
    tracing::info!(sid, "recovering executing simulation");

    if let Some(found) = probe::find_running_simulator(
        &supervisor.probe_http,
        supervisor.cfg.probe_ports(),
        sid,
    )
    .await
    {
        supervisor.attach(sid, found).await;
        return;
    }

    if recover_by_files(supervisor, sid).await {
        return;
    }

    tracing::info!(sid, "no simulator and no results; rebooking");
    rebook(supervisor, sid).await;
}

/// Completed: the run finished but the archive may never have reached
/// the dispatcher.
async fn recover_completed(supervisor: &Supervisor, item: &QueueItem) {
    let sid = item.sid;
    tracing::info!(sid, "recovering completed simulation");
    let dir = supervisor.cfg.job_dir(sid);

    if archive::has_file(&dir, archive::ARCHIVE_NAME).await {
        monitor::deliver(supervisor, sid, &dir.join(archive::ARCHIVE_NAME)).await;
        return;
    }

    if archive::has_file(&dir, archive::FINAL_REPORT).await
        || archive::has_file(&dir, archive::STATS_REPORT).await
    {
        monitor::finish(supervisor, sid).await;
        return;
    }

    tracing::info!(sid, "no simulator output found; rebooking to regenerate results");
    rebook(supervisor, sid).await;
}

/// If the final report is on disk the simulation effectively finished:
/// archive the directory and ship it. Returns true when this path owns
/// the item; restarting a simulator over finished results would be
/// wrong even if delivery fails, so a failed send is retried on the
/// next startup rather than falling through to the other paths.
async fn recover_by_files(supervisor: &Supervisor, sid: Sid) -> bool {
    let dir = supervisor.cfg.job_dir(sid);
    if !archive::has_file(&dir, archive::FINAL_REPORT).await {
        return false;
    }

    tracing::info!(sid, "final report present; recovering from files");
    monitor::finish(supervisor, sid).await;
    true
}

/// The job's `.json5` config file, if it survived in the directory.
async fn find_config(dir: &std::path::Path) -> Option<std::path::PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json5") {
            return Some(path);
        }
    }
    None
}

/// Re-acquire the lease; the dispatcher resends the config under the
/// same `SID`, and the simulation starts over.
async fn rebook(supervisor: &Supervisor, sid: Sid) {
    match supervisor.client.rebook(sid).await {
        Ok(BookOutcome::Booked(lease)) => {
            if let Err(e) = supervisor.start_from_lease(lease).await {
                tracing::error!(sid, error = %e, "failed to start rebooked simulation");
            }
        }
        Ok(BookOutcome::NoneQueued) => {
            tracing::warn!(sid, "rebook returned no lease");
        }
        Err(e) => {
            tracing::error!(sid, error = %e, "rebook failed");
        }
    }
}
