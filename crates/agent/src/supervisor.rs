//! The per-host supervisor: booking loop, simulator launch, and the
//! registry of live simulations.
//!
//! Simulator children are deliberately detached (own process group) so
//! the agent can restart without killing running work; the recovery
//! engine re-attaches to them afterwards via the port scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use simdock_core::{Sid, Timestamp};

use crate::client::{BookOutcome, DispatcherClient, Lease};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::monitor;
use crate::probe::SimulatorProbe;

/// Interval between booking attempts.
const BOOKING_TICK: Duration = Duration::from_secs(60);

/// Deadline for local status probes. Everything probed lives on
/// loopback, so this only guards against a wedged simulator.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A simulation under supervision.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub sid: Sid,
    pub directory: PathBuf,
    /// Simulator base URL, once discovered by the port scan.
    pub base_url: Option<String>,
    /// Fully qualified `/status` URL, once discovered.
    pub status_url: Option<String>,
    /// Child pid, when this agent spawned the process itself.
    pub pid: Option<u32>,
}

#[derive(Clone)]
pub struct Supervisor {
    pub cfg: Arc<AgentConfig>,
    pub client: Arc<DispatcherClient>,
    /// Short-deadline client for loopback status probes.
    pub probe_http: reqwest::Client,
    sims: Arc<Mutex<HashMap<Sid, Simulation>>>,
    paused: Arc<AtomicBool>,
    pub started_at: Timestamp,
    pub shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(cfg: AgentConfig, client: DispatcherClient, paused: bool) -> Self {
        let probe_http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");

        Self {
            cfg: Arc::new(cfg),
            client: Arc::new(client),
            probe_http,
            sims: Arc::new(Mutex::new(HashMap::new())),
            paused: Arc::new(AtomicBool::new(paused)),
            started_at: Utc::now(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub async fn active_count(&self) -> usize {
        self.sims.lock().await.len()
    }

    /// Can this host take another simulation right now?
    pub async fn available(&self) -> bool {
        self.active_count().await < self.cfg.max_simulations && !self.is_paused()
    }

    pub async fn snapshot(&self) -> Vec<Simulation> {
        self.sims.lock().await.values().cloned().collect()
    }

    pub async fn get_sim(&self, sid: Sid) -> Option<Simulation> {
        self.sims.lock().await.get(&sid).cloned()
    }

    pub async fn insert_sim(&self, sim: Simulation) {
        self.sims.lock().await.insert(sim.sid, sim);
    }

    pub async fn set_sim_urls(&self, sid: Sid, base_url: String, status_url: String) {
        if let Some(sim) = self.sims.lock().await.get_mut(&sid) {
            sim.base_url = Some(base_url);
            sim.status_url = Some(status_url);
        }
    }

    pub async fn remove_sim(&self, sid: Sid) {
        self.sims.lock().await.remove(&sid);
    }

    /// The booking loop: try once right away, then on a fixed tick,
    /// until shutdown.
    pub async fn run(&self) {
        if self.available().await {
            self.book_one().await;
        }

        let mut ticker = tokio::time::interval(BOOKING_TICK);
        ticker.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.available().await {
                        self.book_one().await;
                    }
                }
                () = self.shutdown.cancelled() => {
                    tracing::info!("shutting down booking loop");
                    return;
                }
            }
        }
    }

    async fn book_one(&self) {
        match self.client.book().await {
            Ok(BookOutcome::Booked(lease)) => {
                let sid = lease.sid;
                if let Err(e) = self.start_from_lease(lease).await {
                    tracing::error!(sid, error = %e, "failed to start booked simulation");
                }
            }
            Ok(BookOutcome::NoneQueued) => {
                tracing::debug!("dispatcher has no queued items");
            }
            Err(e) => {
                // Transient network trouble; the next tick retries.
                tracing::warn!(error = %e, "booking attempt failed");
            }
        }
    }

    /// Land a lease's config on disk and start the simulator for it.
    pub async fn start_from_lease(&self, lease: Lease) -> Result<()> {
        let dir = self.cfg.job_dir(lease.sid);
        tokio::fs::create_dir_all(&dir).await?;

        let config_path = dir.join(&lease.config_filename);
        tokio::fs::write(&config_path, &lease.config).await?;
        tracing::info!(
            sid = lease.sid,
            config = %config_path.display(),
            "lease config written",
        );

        self.start_simulation(lease.sid, config_path).await
    }

    /// Spawn the simulator for `sid` and begin monitoring it.
    pub async fn start_simulation(&self, sid: Sid, config_path: PathBuf) -> Result<()> {
        let dir = self.cfg.job_dir(sid);
        let pid = spawn_simulator(&self.cfg, sid, &config_path, &dir)?;
        tracing::info!(sid, pid, "simulator started");

        self.insert_sim(Simulation {
            sid,
            directory: dir,
            base_url: None,
            status_url: None,
            pid: Some(pid),
        })
        .await;

        let supervisor = self.clone();
        tokio::spawn(async move {
            monitor::run(supervisor, sid).await;
        });
        Ok(())
    }

    /// Adopt an already-running simulator discovered by the port scan.
    pub async fn attach(&self, sid: Sid, probe: SimulatorProbe) {
        self.insert_sim(Simulation {
            sid,
            directory: self.cfg.job_dir(sid),
            base_url: Some(probe.base_url),
            status_url: Some(probe.status_url),
            pid: None,
        })
        .await;

        let supervisor = self.clone();
        tokio::spawn(async move {
            monitor::run(supervisor, sid).await;
        });
    }
}

/// Launch the simulator detached: its own process group, stdout/stderr
/// into `sim.log` in the job directory, working directory set there.
fn spawn_simulator(cfg: &AgentConfig, sid: Sid, config_path: &Path, dir: &Path) -> Result<u32> {
    let log = std::fs::File::create(dir.join("sim.log"))?;
    let log_err = log.try_clone()?;

    let mut command = std::process::Command::new(&cfg.simulator_bin);
    command
        .arg("-c")
        .arg(config_path)
        .arg("-SID")
        .arg(sid.to_string())
        // The simulator reports its own progress straight to the
        // dispatcher, so it gets the base URL, not /command.
        .arg("-DISPATCHER")
        .arg(&cfg.dispatcher_url)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command.spawn()?;
    Ok(child.id())
}
