//! Thin HTTP client over the dispatcher's `/command` endpoint.

use std::path::Path;
use std::time::Duration;

use simdock_core::protocol::{Envelope, STATUS_SUCCESS};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Dispatcher(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub struct CliClient {
    http: reqwest::Client,
    command_url: String,
    pub username: String,
}

impl CliClient {
    pub fn new(dispatcher_url: &str, username: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            http,
            command_url: format!("{}/command", dispatcher_url.trim_end_matches('/')),
            username,
        }
    }

    /// Send a JSON command and return the reply, failing on
    /// `{Status: "error"}`.
    pub async fn send(&self, envelope: &Envelope) -> Result<serde_json::Value, CliError> {
        let response = self
            .http
            .post(&self.command_url)
            .json(envelope)
            .send()
            .await?;
        let reply: serde_json::Value = response.json().await?;
        check_status(reply)
    }

    /// Send a multipart command: envelope as the `data` field, plus the
    /// given file.
    pub async fn send_with_file(
        &self,
        envelope: &Envelope,
        file: &Path,
    ) -> Result<serde_json::Value, CliError> {
        let bytes = tokio::fs::read(file).await?;
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config.json5".to_string());

        let form = reqwest::multipart::Form::new()
            .text("data", serde_json::to_string(envelope)?)
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
        let reply: serde_json::Value = response.json().await?;
        check_status(reply)
    }

    /// GET a worker-agent endpoint.
    pub async fn get_agent(&self, url: &str) -> Result<serde_json::Value, CliError> {
        let response = self.http.get(url).send().await?;
        Ok(response.json().await?)
    }
}

fn check_status(reply: serde_json::Value) -> Result<serde_json::Value, CliError> {
    match reply["Status"].as_str() {
        Some(status) if status == STATUS_SUCCESS => Ok(reply),
        Some(_) => Err(CliError::Dispatcher(
            reply["Message"].as_str().unwrap_or("request failed").to_string(),
        )),
        None => Err(CliError::Dispatcher("malformed dispatcher reply".into())),
    }
}
