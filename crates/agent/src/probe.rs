//! Port-scan discovery of local simulator processes.
//!
//! A simulator exposes `GET /status` on some port in a known range and
//! reports its own `SID` in the JSON reply. That pair of facts is the
//! whole reattach contract: scan the range, match the `SID`, and the
//! simulation is live.

use std::ops::RangeInclusive;
use std::time::Duration;

use simdock_core::Sid;

use crate::error::{AgentError, Result};

/// Attempts before giving up on discovering a just-started simulator.
const DISCOVERY_ATTEMPTS: u32 = 3;

/// Delay between discovery attempts.
const DISCOVERY_RETRY_DELAY: Duration = Duration::from_secs(3);

/// A discovered simulator endpoint.
#[derive(Debug, Clone)]
pub struct SimulatorProbe {
    pub port: u16,
    pub base_url: String,
    pub status_url: String,
}

/// Scan the port range once for a simulator answering with our `SID`.
pub async fn find_running_simulator(
    http: &reqwest::Client,
    ports: RangeInclusive<u16>,
    sid: Sid,
) -> Option<SimulatorProbe> {
    let mut not_listening = Vec::new();

    for port in ports {
        let base_url = format!("http://127.0.0.1:{port}");
        let status_url = format!("{base_url}/status");
        match fetch_sid(http, &status_url).await {
            Ok(Some(found)) if found == sid => {
                tracing::info!(sid, port, "connected to running simulator");
                return Some(SimulatorProbe {
                    port,
                    base_url,
                    status_url,
                });
            }
            Ok(_) => {}
            Err(AgentError::Http(e)) if e.is_connect() => not_listening.push(port),
            Err(e) => tracing::debug!(port, error = %e, "status probe failed"),
        }
    }

    if !not_listening.is_empty() {
        tracing::debug!(ports = ?not_listening, "nothing listening");
    }
    None
}

/// Scan with retries; a freshly spawned simulator needs a moment before
/// its listener is up.
pub async fn discover_with_retry(
    http: &reqwest::Client,
    ports: RangeInclusive<u16>,
    sid: Sid,
) -> Option<SimulatorProbe> {
    for attempt in 1..=DISCOVERY_ATTEMPTS {
        if let Some(probe) = find_running_simulator(http, ports.clone(), sid).await {
            return Some(probe);
        }
        if attempt < DISCOVERY_ATTEMPTS {
            tokio::time::sleep(DISCOVERY_RETRY_DELAY).await;
        }
    }
    None
}

/// GET a simulator status URL and extract the `SID` field, if present.
pub async fn fetch_sid(http: &reqwest::Client, url: &str) -> Result<Option<Sid>> {
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(AgentError::Protocol(format!(
            "received non-200 response code: {}",
            response.status()
        )));
    }
    let body: serde_json::Value = response.json().await?;
    Ok(body.get("SID").and_then(serde_json::Value::as_i64))
}

/// Is the simulator behind `status_url` still answering?
pub async fn is_alive(http: &reqwest::Client, status_url: &str) -> bool {
    match http.get(status_url).send().await {
        Ok(response) if response.status().is_success() => {
            response.json::<serde_json::Value>().await.is_ok()
        }
        _ => false,
    }
}
