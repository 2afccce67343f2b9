//! `Book` and `Rebook`: lease a job to a worker.
//!
//! The reply is multipart: a `json` part with the lease details and a
//! `file` part with the job's config bytes. The item is marked `Booked`
//! only after the full response body has been handed to the transport:
//! a connection that dies mid-response must leave the job leasable.
//! The booking mutex guard travels inside the response body
//! stream, so the whole select → send → commit sequence is serialised
//! against concurrent bookings.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use simdock_core::protocol::{
    BookRequest, BookedReply, CreatedReply, QueueItem, RebookRequest, MSG_NONE_QUEUED,
    STATUS_SUCCESS,
};
use simdock_core::state::SimState;
use simdock_core::CoreError;

use simdock_db::repositories::QueueRepo;

use crate::commands::CommandPayload;
use crate::error::{AppError, AppResult};
use crate::staging;
use crate::state::AppState;

pub async fn handle(state: &AppState, payload: &CommandPayload) -> AppResult<Response> {
    // Held through the config read and, via the response stream, until
    // the lease commits or the connection dies.
    let guard = state.booking.clone().lock_owned().await;

    let (item, machine_id) = match payload.envelope.command.as_str() {
        "Book" => {
            let req: BookRequest = payload.envelope.decode_data()?;
            tracing::info!(
                machine = %req.machine_id,
                cpus = req.cpus,
                memory = %req.memory,
                arch = %req.cpu_architecture,
                "handling Book",
            );
            match QueueRepo::highest_priority_queued(&state.pool).await? {
                Some(item) => (item, req.machine_id),
                None => {
                    return Ok(
                        Json(CreatedReply::success(MSG_NONE_QUEUED, 0)).into_response()
                    );
                }
            }
        }
        _ => {
            let req: RebookRequest = payload.envelope.decode_data()?;
            tracing::info!(sid = req.sid, machine = %req.machine_id, "handling Rebook");
            let item = QueueRepo::find_by_id(&state.pool, req.sid)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: "queue item",
                    id: req.sid,
                })?;
            if item.machine_id != req.machine_id {
                tracing::warn!(
                    sid = item.sid,
                    from = %item.machine_id,
                    to = %req.machine_id,
                    "granting rebook to a different machine",
                );
            }
            (item, req.machine_id)
        }
    };

    let config_dir = staging::job_dir(&state.config.staging_root, item.sid);
    let config_path = staging::find_config_file(&config_dir).await?;
    let config_bytes = tokio::fs::read(&config_path).await.map_err(|e| {
        AppError::Filesystem(format!("failed to read {}: {e}", config_path.display()))
    })?;
    let config_filename = config_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let reply = BookedReply {
        status: STATUS_SUCCESS.to_string(),
        message: "simulation booked".to_string(),
        sid: item.sid,
        config_filename: config_filename.clone(),
    };

    let boundary = format!("simdock{}", Uuid::new_v4().simple());
    let body_bytes = build_multipart_body(&boundary, &reply, &config_filename, &config_bytes)?;

    let commit = LeaseCommit {
        pool: state.pool.clone(),
        item,
        machine_id,
        _guard: guard,
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from_stream(lease_stream(
            Bytes::from(body_bytes),
            commit,
        )))
        .map_err(|e| AppError::BadRequest(format!("failed to build response: {e}")))
}

/// Everything needed to mark the lease `Booked` after the send.
struct LeaseCommit {
    pool: simdock_db::DbPool,
    item: QueueItem,
    machine_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl LeaseCommit {
    async fn commit(mut self) {
        self.item.state = SimState::Booked.code();
        self.item.machine_id = self.machine_id.clone();
        match QueueRepo::update(&self.pool, &self.item).await {
            Ok(()) => tracing::info!(
                sid = self.item.sid,
                machine = %self.machine_id,
                "simulation booked",
            ),
            Err(e) => tracing::error!(
                sid = self.item.sid,
                error = %e,
                "failed to mark item booked after send; lease stays open",
            ),
        }
    }
}

enum LeaseStage {
    Send(Bytes, LeaseCommit),
    Commit(LeaseCommit),
}

/// Yield the response payload, then commit the lease when the transport
/// polls for more (i.e. the payload was accepted). Dropping the stream
/// before that point (client gone) skips the commit entirely.
fn lease_stream(
    payload: Bytes,
    commit: LeaseCommit,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> {
    futures::stream::unfold(Some(LeaseStage::Send(payload, commit)), |stage| async move {
        match stage {
            Some(LeaseStage::Send(payload, commit)) => {
                Some((Ok(payload), Some(LeaseStage::Commit(commit))))
            }
            Some(LeaseStage::Commit(commit)) => {
                commit.commit().await;
                None
            }
            None => None,
        }
    })
}

fn build_multipart_body(
    boundary: &str,
    reply: &BookedReply,
    config_filename: &str,
    config_bytes: &[u8],
) -> AppResult<Vec<u8>> {
    let json = serde_json::to_string(reply)
        .map_err(|e| AppError::BadRequest(format!("failed to encode booking reply: {e}")))?;

    let mut body = Vec::with_capacity(config_bytes.len() + json.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"json\"\r\nContent-Type: application/json\r\n\r\n",
    );
    body.extend_from_slice(json.as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{config_filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(config_bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Ok(body)
}
