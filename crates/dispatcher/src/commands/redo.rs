//! `Redo`: re-enqueue a job whose results were already archived.
//!
//! The job's config is copied back from its results directory into the
//! staging area, the lease and timestamps are cleared, the state returns
//! to `Queued`, and the results directory is removed.

use axum::response::{IntoResponse, Response};
use axum::Json;

use simdock_core::protocol::{CreatedReply, RebookRequest};
use simdock_core::state::{validate_transition, SimState};
use simdock_core::CoreError;

use simdock_db::repositories::QueueRepo;

use crate::commands::CommandPayload;
use crate::error::{AppError, AppResult};
use crate::results;
use crate::staging;
use crate::state::AppState;

pub async fn handle(state: &AppState, payload: &CommandPayload) -> AppResult<Response> {
    let req: RebookRequest = payload.envelope.decode_data()?;
    tracing::info!(sid = req.sid, machine = %req.machine_id, "handling Redo");

    let mut item = QueueRepo::find_by_id(&state.pool, req.sid)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "queue item",
            id: req.sid,
        })?;
    if !req.machine_id.is_empty() && item.machine_id != req.machine_id {
        tracing::warn!(
            sid = item.sid,
            from = %item.machine_id,
            to = %req.machine_id,
            "redo requested by a machine that does not hold the lease",
        );
    }
    validate_transition(item.state, SimState::Queued.code()).map_err(CoreError::Validation)?;

    let _fs = state.fs_lock.lock().await;

    let results_dir = results::find_results_dir(&state.config.results_root, req.sid)
        .await?
        .ok_or_else(|| {
            AppError::Filesystem(format!("results directory for SID {} not found", req.sid))
        })?;

    // Copy the config back into the staging area first, so a crash
    // after this point leaves a bookable job.
    let config_src = staging::find_config_file(&results_dir).await?;
    let staging_dir = staging::job_dir(&state.config.staging_root, req.sid);
    tokio::fs::create_dir_all(&staging_dir).await.map_err(|e| {
        AppError::Filesystem(format!("failed to create {}: {e}", staging_dir.display()))
    })?;
    let config_name = config_src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let config_dest = staging_dir.join(&config_name);
    tokio::fs::copy(&config_src, &config_dest).await.map_err(|e| {
        AppError::Filesystem(format!(
            "failed to copy {} to {}: {e}",
            config_src.display(),
            config_dest.display()
        ))
    })?;

    item.machine_id.clear();
    item.dt_estimate = None;
    item.dt_completed = None;
    item.state = SimState::Queued.code();
    QueueRepo::update(&state.pool, &item).await?;

    tokio::fs::remove_dir_all(&results_dir).await.map_err(|e| {
        AppError::Filesystem(format!("failed to remove {}: {e}", results_dir.display()))
    })?;

    tracing::info!(sid = req.sid, "simulation re-queued");

    Ok(Json(CreatedReply::success("Re-queued", req.sid)).into_response())
}
