//! Per-simulation monitor task.
//!
//! Waits out a short startup grace, discovers the simulator's port by
//! scanning the configured range, then polls `/status` until the child
//! stops answering. A dead (or never-found) simulator is treated as
//! exited: whatever it produced is archived and shipped to the
//! dispatcher.

use std::time::Duration;

use simdock_core::Sid;

use crate::archive;
use crate::probe;
use crate::supervisor::Supervisor;

/// Time to let a fresh child set up its HTTP listener.
const STARTUP_GRACE: Duration = Duration::from_secs(3);

/// Interval between `/status` polls once the simulator is attached.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(supervisor: Supervisor, sid: Sid) {
    tracing::info!(sid, "monitor started");

    // A reattached simulation already knows its status URL; a freshly
    // spawned one needs the grace period and the port scan.
    let known_url = supervisor.get_sim(sid).await.and_then(|sim| sim.status_url);

    let status_url = match known_url {
        Some(url) => Some(url),
        None => {
            tokio::time::sleep(STARTUP_GRACE).await;
            match probe::discover_with_retry(
                &supervisor.probe_http,
                supervisor.cfg.probe_ports(),
                sid,
            )
            .await
            {
                Some(found) => {
                    supervisor
                        .set_sim_urls(sid, found.base_url.clone(), found.status_url.clone())
                        .await;
                    Some(found.status_url)
                }
                None => None,
            }
        }
    };

    match status_url {
        Some(url) => {
            tracing::info!(sid, url = %url, "monitoring simulator");
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                if !probe::is_alive(&supervisor.probe_http, &url).await {
                    tracing::info!(sid, "simulator is no longer running");
                    break;
                }
            }
        }
        None => {
            tracing::warn!(sid, "no simulator answered the port scan; treating as exited");
        }
    }

    finish(&supervisor, sid).await;
}

/// Archive the job directory and deliver the bundle to the dispatcher.
/// On success the local directory and registry entry are removed; on
/// failure everything stays for the recovery engine to retry.
pub async fn finish(supervisor: &Supervisor, sid: Sid) {
    let dir = supervisor.cfg.job_dir(sid);

    let tarball = match archive::build_results_archive(&dir).await {
        Ok(path) => path,
        Err(e) => {
            tracing::error!(sid, error = %e, "failed to archive simulation results");
            return;
        }
    };
    tracing::info!(sid, archive = %tarball.display(), "results archived");

    deliver(supervisor, sid, &tarball).await;
}

/// Send an existing tarball and clean up on success.
pub async fn deliver(supervisor: &Supervisor, sid: Sid, tarball: &std::path::Path) {
    let dir = supervisor.cfg.job_dir(sid);

    match supervisor.client.end_simulation(sid, tarball).await {
        Ok(()) => {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                tracing::warn!(sid, error = %e, "failed to remove job directory");
            }
            supervisor.remove_sim(sid).await;
            tracing::info!(sid, "results delivered to dispatcher");
        }
        Err(e) => {
            tracing::error!(
                sid,
                error = %e,
                "failed to deliver results; leaving directory for recovery",
            );
        }
    }
}
