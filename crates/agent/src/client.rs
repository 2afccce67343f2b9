//! HTTP client for the dispatcher's `/command` endpoint.

use std::path::Path;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use simdock_core::protocol::{
    BookRequest, BookedReply, EndSimulationEnvelope, Envelope, MachineQueueRequest, QueueItem,
    QueueListReply, RebookRequest, StatusReply,
};
use simdock_core::Sid;

use crate::error::{AgentError, Result};

/// Username stamped on every command this daemon issues.
const AGENT_USERNAME: &str = "agent";

/// Per-request deadline for dispatcher calls. Result uploads can be
/// large, so this is generous; nothing blocks indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A successful lease: the job id plus its config artifact.
#[derive(Debug)]
pub struct Lease {
    pub sid: Sid,
    pub config_filename: String,
    pub config: Vec<u8>,
}

/// Outcome of a `Book`/`Rebook` call.
#[derive(Debug)]
pub enum BookOutcome {
    Booked(Lease),
    /// The queue had nothing for us. Normal; try again next tick.
    NoneQueued,
}

pub struct DispatcherClient {
    http: reqwest::Client,
    command_url: String,
    machine_id: String,
}

impl DispatcherClient {
    pub fn new(command_url: String, machine_id: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            http,
            command_url,
            machine_id,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Lease the highest-priority queued job, if any.
    pub async fn book(&self) -> Result<BookOutcome> {
        let request = BookRequest {
            machine_id: self.machine_id.clone(),
            cpus: std::thread::available_parallelism()
                .map(|n| n.get() as i32)
                .unwrap_or(1),
            memory: String::new(),
            cpu_architecture: std::env::consts::ARCH.to_string(),
            availability: "always".to_string(),
        };
        let envelope = Envelope::with_data("Book", AGENT_USERNAME, &request)?;
        self.send_booking(&envelope).await
    }

    /// Re-acquire a specific in-flight job; the dispatcher resends the
    /// existing config under the same `SID`.
    pub async fn rebook(&self, sid: Sid) -> Result<BookOutcome> {
        let request = RebookRequest {
            sid,
            machine_id: self.machine_id.clone(),
        };
        let envelope = Envelope::with_data("Rebook", AGENT_USERNAME, &request)?;
        self.send_booking(&envelope).await
    }

    async fn send_booking(&self, envelope: &Envelope) -> Result<BookOutcome> {
        let response = self
            .http
            .post(&self.command_url)
            .json(envelope)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AgentError::Protocol(format!(
                "unexpected status code: {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("multipart/") {
            self.read_lease(response, &content_type).await
        } else {
            let reply: StatusReply = response.json().await?;
            if reply.message.contains("no queued items") {
                return Ok(BookOutcome::NoneQueued);
            }
            if !reply.is_success() {
                return Err(AgentError::Protocol(reply.message));
            }
            // Success without a config attached: nothing to run.
            Ok(BookOutcome::NoneQueued)
        }
    }

    async fn read_lease(
        &self,
        response: reqwest::Response,
        content_type: &str,
    ) -> Result<BookOutcome> {
        let boundary = multer::parse_boundary(content_type)?;
        let mut multipart = multer::Multipart::new(response.bytes_stream(), boundary);

        let mut reply: Option<BookedReply> = None;
        let mut config: Option<Vec<u8>> = None;

        while let Some(field) = multipart.next_field().await? {
            match field.name() {
                Some("json") => {
                    let bytes = field.bytes().await?;
                    reply = Some(serde_json::from_slice(&bytes)?);
                }
                Some("file") => {
                    config = Some(field.bytes().await?.to_vec());
                }
                _ => {}
            }
        }

        let reply =
            reply.ok_or_else(|| AgentError::Protocol("missing json part in lease".into()))?;
        let config =
            config.ok_or_else(|| AgentError::Protocol("missing file part in lease".into()))?;

        Ok(BookOutcome::Booked(Lease {
            sid: reply.sid,
            config_filename: reply.config_filename,
            config,
        }))
    }

    /// The jobs the dispatcher believes this machine is working on.
    pub async fn machine_queue(&self) -> Result<Vec<QueueItem>> {
        let request = MachineQueueRequest {
            machine_id: self.machine_id.clone(),
        };
        let envelope = Envelope::with_data("GetMachineQueue", AGENT_USERNAME, &request)?;
        let response = self
            .http
            .post(&self.command_url)
            .json(&envelope)
            .send()
            .await?;
        let reply: QueueListReply = response.json().await?;
        if reply.status != simdock_core::protocol::STATUS_SUCCESS {
            return Err(AgentError::Protocol(format!(
                "GetMachineQueue failed: {}",
                reply.status
            )));
        }
        Ok(reply.data)
    }

    /// Ship a result tarball for `sid`.
    pub async fn end_simulation(&self, sid: Sid, tarball: &Path) -> Result<()> {
        let filename = tarball
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results.tar.gz".to_string());

        let envelope = EndSimulationEnvelope {
            command: "EndSimulation".to_string(),
            username: AGENT_USERNAME.to_string(),
            sid,
            filename: filename.clone(),
        };
        let data = serde_json::to_string(&envelope)?;
        let bytes = tokio::fs::read(tarball).await?;

        let form = reqwest::multipart::Form::new()
            .text("data", data)
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(filename),
            );

        let response = self
            .http
            .post(&self.command_url)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AgentError::Protocol(format!(
                "unexpected status code: {}",
                response.status()
            )));
        }
        let reply: StatusReply = response.json().await?;
        if !reply.is_success() {
            return Err(AgentError::Protocol(reply.message));
        }
        Ok(())
    }
}
