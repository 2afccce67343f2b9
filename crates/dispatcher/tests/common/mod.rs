// Shared test helpers. Not every test binary uses every helper, so
// dead_code warnings are suppressed at the module level.
#![allow(dead_code)]

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

use simdock_core::protocol::Envelope;
use simdock_dispatcher::config::ServerConfig;
use simdock_dispatcher::router::build_app_router;
use simdock_dispatcher::state::AppState;

/// A dispatcher wired to a temp staging/results tree. Keep the
/// [`TempDir`] alive for the duration of the test.
pub struct TestApp {
    pub state: AppState,
    pub dir: TempDir,
}

impl TestApp {
    pub fn router(&self) -> Router {
        build_app_router(self.state.clone())
    }

    pub fn staging(&self) -> std::path::PathBuf {
        self.state.config.staging_root.clone()
    }

    pub fn results(&self) -> std::path::PathBuf {
        self.state.config.results_root.clone()
    }
}

/// Build a test dispatcher around a migrated pool.
pub fn test_app(pool: SqlitePool) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: String::new(),
        staging_root: dir.path().join("staging"),
        results_root: dir.path().join("results"),
        request_timeout_secs: 30,
        shutdown_grace_secs: 5,
    };
    TestApp {
        state: AppState::new(pool, config),
        dir,
    }
}

/// Collect a response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        panic!("response body is not JSON: {e}: {:?}", String::from_utf8_lossy(&bytes))
    })
}

/// POST a JSON command envelope to `/command`.
pub async fn send_command(app: Router, envelope: &Envelope) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/command")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(envelope).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a raw JSON body to `/command` (for envelopes with extra
/// top-level fields, e.g. `EndSimulation`).
pub async fn send_raw_json(app: Router, body: serde_json::Value) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/command")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

const TEST_BOUNDARY: &str = "simdock-test-boundary";

/// POST a multipart command: the envelope as the `data` field plus an
/// optional `file` part.
pub async fn send_multipart(
    app: Router,
    data_json: &str,
    file: Option<(&str, &[u8])>,
) -> axum::response::Response {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{TEST_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"data\"\r\n\r\n");
    body.extend_from_slice(data_json.as_bytes());
    body.extend_from_slice(b"\r\n");

    if let Some((filename, bytes)) = file {
        body.extend_from_slice(format!("--{TEST_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{TEST_BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/command")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={TEST_BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Split a multipart body into its named parts.
pub fn multipart_parts(content_type: &str, body: &[u8]) -> HashMap<String, Vec<u8>> {
    let boundary = content_type
        .split("boundary=")
        .nth(1)
        .expect("multipart content type")
        .trim();
    let delim = format!("--{boundary}");

    let mut parts = HashMap::new();
    for segment in split_on(body, delim.as_bytes()) {
        let Some(header_end) = find(segment, b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&segment[..header_end]);
        let Some(name) = headers
            .split("name=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
        else {
            continue;
        };
        let mut content = &segment[header_end + 4..];
        if content.ends_with(b"\r\n") {
            content = &content[..content.len() - 2];
        }
        parts.insert(name.to_string(), content.to_vec());
    }
    parts
}

fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut segments = Vec::new();
    let mut rest = haystack;
    while let Some(pos) = find(rest, needle) {
        segments.push(&rest[..pos]);
        rest = &rest[pos + needle.len()..];
    }
    segments.push(rest);
    segments
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Submit a config via `NewSimulation` and return the new SID.
pub async fn submit_config(app: &TestApp, name: &str, priority: i32, bytes: &[u8]) -> i64 {
    let data = serde_json::json!({
        "Command": "NewSimulation",
        "Username": "tester",
        "Data": {
            "Name": name,
            "Priority": priority,
            "Description": format!("test {name}"),
            "URL": "http://localhost:8080",
            "OriginalFilename": format!("{name}.json5"),
        },
    });
    let response = send_multipart(
        app.router(),
        &data.to_string(),
        Some((&format!("{name}.json5"), bytes)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["Status"], "success", "submit failed: {json}");
    json["ID"].as_i64().unwrap()
}
