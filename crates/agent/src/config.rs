use std::path::PathBuf;

use simdock_core::Sid;

/// Worker agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Dispatcher base URL (default: `http://127.0.0.1:8250`). Passed
    /// to simulator children as-is; the agent itself talks to
    /// [`AgentConfig::command_url`].
    pub dispatcher_url: String,
    /// The dispatcher's command endpoint, `<dispatcher_url>/command`.
    pub command_url: String,
    /// Data root; simulations live under `<root>/simulations/<SID>/`.
    pub sims_root: PathBuf,
    /// Maximum concurrently supervised simulations (default: `1`).
    pub max_simulations: usize,
    /// Port for the agent's HTTP control surface (default: `8251`).
    pub listen_port: u16,
    /// Simulator binary to spawn (default: `simulator` on `$PATH`).
    pub simulator_bin: PathBuf,
    /// First port a simulator may listen on (default: `8090`).
    pub probe_port_start: u16,
    /// Last port a simulator may listen on (default: `8100`).
    pub probe_port_end: u16,
}

impl AgentConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default                 |
    /// |--------------------|-------------------------|
    /// | `DISPATCHER_URL`   | `http://127.0.0.1:8250` |
    /// | `SIMS_DIR`         | `./sims`                |
    /// | `MAX_SIMULATIONS`  | `1`                     |
    /// | `AGENT_PORT`       | `8251`                  |
    /// | `SIMULATOR_BIN`    | `simulator`             |
    /// | `PROBE_PORT_START` | `8090`                  |
    /// | `PROBE_PORT_END`   | `8100`                  |
    pub fn from_env() -> Self {
        let dispatcher_url = std::env::var("DISPATCHER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8250".into());

        let sims_root =
            PathBuf::from(std::env::var("SIMS_DIR").unwrap_or_else(|_| "./sims".into()));

        let max_simulations: usize = std::env::var("MAX_SIMULATIONS")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("MAX_SIMULATIONS must be a valid usize");

        let listen_port: u16 = std::env::var("AGENT_PORT")
            .unwrap_or_else(|_| "8251".into())
            .parse()
            .expect("AGENT_PORT must be a valid u16");

        let simulator_bin = PathBuf::from(
            std::env::var("SIMULATOR_BIN").unwrap_or_else(|_| "simulator".into()),
        );

        let probe_port_start: u16 = std::env::var("PROBE_PORT_START")
            .unwrap_or_else(|_| "8090".into())
            .parse()
            .expect("PROBE_PORT_START must be a valid u16");

        let probe_port_end: u16 = std::env::var("PROBE_PORT_END")
            .unwrap_or_else(|_| "8100".into())
            .parse()
            .expect("PROBE_PORT_END must be a valid u16");

        Self::new(
            dispatcher_url,
            sims_root,
            max_simulations,
            listen_port,
            simulator_bin,
            probe_port_start,
            probe_port_end,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dispatcher_url: String,
        sims_root: PathBuf,
        max_simulations: usize,
        listen_port: u16,
        simulator_bin: PathBuf,
        probe_port_start: u16,
        probe_port_end: u16,
    ) -> Self {
        let command_url = format!("{}/command", dispatcher_url.trim_end_matches('/'));
        Self {
            dispatcher_url,
            command_url,
            sims_root,
            max_simulations,
            listen_port,
            simulator_bin,
            probe_port_start,
            probe_port_end,
        }
    }

    /// The directory holding one subdirectory per supervised simulation.
    pub fn simulations_dir(&self) -> PathBuf {
        self.sims_root.join("simulations")
    }

    /// The working directory for one simulation.
    pub fn job_dir(&self, sid: Sid) -> PathBuf {
        self.simulations_dir().join(sid.to_string())
    }

    /// The port range a local simulator may answer `/status` on.
    pub fn probe_ports(&self) -> std::ops::RangeInclusive<u16> {
        self.probe_port_start..=self.probe_port_end
    }
}
