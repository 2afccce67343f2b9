//! `EndSimulation`: ingest a result tarball.
//!
//! The bundle lands in `<results_root>/YYYY/M/D/<SID>/`, is extracted in
//! place, then the tarball and the job's staging directory are removed
//! and the item moves to `ResultsSaved`. Filesystem work runs first so a
//! crash in between is safe to redo; the store update is last. The whole
//! filesystem critical section holds the dispatcher's fs lock so two
//! extractions never interleave.

use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use simdock_core::protocol::{EndSimulationEnvelope, StatusReply};
use simdock_core::state::{validate_transition, SimState};
use simdock_core::CoreError;

use simdock_db::repositories::QueueRepo;

use crate::commands::{safe_filename, CommandPayload};
use crate::error::{AppError, AppResult};
use crate::results;
use crate::staging;
use crate::state::AppState;

pub async fn handle(state: &AppState, payload: &CommandPayload) -> AppResult<Response> {
    let req: EndSimulationEnvelope = serde_json::from_str(&payload.raw)
        .map_err(|e| AppError::BadRequest(format!("invalid end simulation request: {e}")))?;
    safe_filename(&req.filename)?;

    let file = payload
        .file
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("missing file part".into()))?;
    if file.bytes.is_empty() {
        return Err(AppError::BadRequest("no file content. 0-length file".into()));
    }

    tracing::info!(sid = req.sid, filename = %req.filename, "handling EndSimulation");

    let mut item = QueueRepo::find_by_id(&state.pool, req.sid)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "queue item",
            id: req.sid,
        })?;
    validate_transition(item.state, SimState::ResultsSaved.code())
        .map_err(CoreError::Validation)?;

    let dir = results::partition_dir(&state.config.results_root, Utc::now(), req.sid);

    {
        let _fs = state.fs_lock.lock().await;

        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::Filesystem(format!("failed to create {}: {e}", dir.display()))
        })?;

        let tarball = dir.join(&req.filename);
        tokio::fs::write(&tarball, &file.bytes).await.map_err(|e| {
            AppError::Filesystem(format!("failed to write {}: {e}", tarball.display()))
        })?;

        // On failure the item stays `Completed` and another
        // `EndSimulation` attempt is allowed.
        results::extract_tarball(&dir, &req.filename).await?;

        tokio::fs::remove_file(&tarball).await.map_err(|e| {
            AppError::Filesystem(format!("failed to remove {}: {e}", tarball.display()))
        })?;

        staging::remove_job_dir(&state.config.staging_root, req.sid).await?;
    }

    item.state = SimState::ResultsSaved.code();
    QueueRepo::update(&state.pool, &item).await?;

    tracing::info!(sid = req.sid, dir = %dir.display(), "results saved");

    Ok(Json(StatusReply::success(format!(
        "Results stored in: {}",
        dir.display()
    )))
    .into_response())
}
