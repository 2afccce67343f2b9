// Shared helpers for agent integration tests: a stub dispatcher served
// on an ephemeral port, plus fixture builders.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio::sync::Mutex;

use simdock_agent::client::DispatcherClient;
use simdock_agent::config::AgentConfig;
use simdock_agent::supervisor::Supervisor;

/// What the stub hands out for a `Book`/`Rebook` call.
#[derive(Clone)]
pub struct StubLease {
    pub sid: i64,
    pub config_filename: String,
    pub config: Vec<u8>,
}

/// A canned dispatcher: records the commands it receives and replies
/// from fixed fixtures.
#[derive(Clone, Default)]
pub struct StubDispatcher {
    /// Command names received, in order. Multipart requests are
    /// recorded as `EndSimulation` (the only multipart command the
    /// agent sends).
    pub commands: Arc<Mutex<Vec<String>>>,
    /// Items returned by `GetMachineQueue`.
    pub machine_items: Arc<Mutex<Vec<serde_json::Value>>>,
    /// Lease returned by `Book`/`Rebook`; `None` means "no queued items".
    pub lease: Arc<Mutex<Option<StubLease>>>,
}

impl StubDispatcher {
    pub async fn received(&self) -> Vec<String> {
        self.commands.lock().await.clone()
    }

    pub async fn set_machine_items(&self, items: Vec<serde_json::Value>) {
        *self.machine_items.lock().await = items;
    }

    pub async fn set_lease(&self, lease: Option<StubLease>) {
        *self.lease.lock().await = lease;
    }
}

async fn command(State(stub): State<StubDispatcher>, req: Request) -> Response {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        stub.commands.lock().await.push("EndSimulation".to_string());
        return Json(serde_json::json!({ "Status": "success", "Message": "stored" }))
            .into_response();
    }

    let bytes = axum::body::to_bytes(req.into_body(), 1 << 20).await.unwrap();
    let envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let command = envelope["Command"].as_str().unwrap_or_default().to_string();
    stub.commands.lock().await.push(command.clone());

    match command.as_str() {
        "GetMachineQueue" => {
            let items = stub.machine_items.lock().await.clone();
            Json(serde_json::json!({ "Status": "success", "Data": items })).into_response()
        }
        "Book" | "Rebook" => match stub.lease.lock().await.clone() {
            Some(lease) => lease_response(&lease),
            None => Json(serde_json::json!({
                "Status": "success",
                "Message": "no queued items need booking",
                "ID": 0,
            }))
            .into_response(),
        },
        other => Json(serde_json::json!({
            "Status": "error",
            "Message": format!("stub does not implement {other}"),
        }))
        .into_response(),
    }
}

fn lease_response(lease: &StubLease) -> Response {
    let boundary = "stub-boundary";
    let json = serde_json::json!({
        "Status": "success",
        "Message": "simulation booked",
        "SID": lease.sid,
        "ConfigFilename": lease.config_filename,
    });

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"json\"\r\nContent-Type: application/json\r\n\r\n",
    );
    body.extend_from_slice(json.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            lease.config_filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(&lease.config);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Response::builder()
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(axum::body::Body::from(body))
        .unwrap()
}

/// Serve the stub on an ephemeral port; returns its base URL.
pub async fn spawn_stub(stub: StubDispatcher) -> String {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/command", post(command))
        .with_state(stub);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A supervisor wired to the stub, with its data under a temp dir.
/// `probe_ports` should point at nothing unless the test runs a fake
/// simulator.
pub async fn test_supervisor(
    stub: StubDispatcher,
    sims_root: PathBuf,
    probe_ports: (u16, u16),
) -> Supervisor {
    let base_url = spawn_stub(stub).await;
    let cfg = AgentConfig::new(
        base_url,
        sims_root,
        2,
        0,
        PathBuf::from("/bin/true"),
        probe_ports.0,
        probe_ports.1,
    );
    let client = DispatcherClient::new(cfg.command_url.clone(), "machine-test".to_string());
    Supervisor::new(cfg, client, false)
}

/// A full wire-form queue item for stub replies.
pub fn wire_item(sid: i64, state: i32, machine_id: &str) -> serde_json::Value {
    serde_json::json!({
        "SID": sid,
        "File": "cfg.json5",
        "Username": "tester",
        "Name": format!("sim{sid}"),
        "Priority": 5,
        "Description": "",
        "MachineID": machine_id,
        "URL": "",
        "State": state,
        "DtEstimate": null,
        "DtCompleted": null,
        "Created": "2026-08-01T00:00:00Z",
        "Modified": "2026-08-01T00:00:00Z",
    })
}
