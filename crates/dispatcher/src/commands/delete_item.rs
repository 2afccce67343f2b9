//! `DeleteItem`: remove a job and its staged config.
//!
//! Deleting is idempotent end to end: the staging directory may already
//! be gone and the row may already be gone; both cases still succeed.

use axum::response::{IntoResponse, Response};
use axum::Json;

use simdock_core::protocol::{CreatedReply, SidRequest};
use simdock_db::repositories::QueueRepo;

use crate::commands::CommandPayload;
use crate::error::AppResult;
use crate::staging;
use crate::state::AppState;

pub async fn handle(state: &AppState, payload: &CommandPayload) -> AppResult<Response> {
    let req: SidRequest = payload.envelope.decode_data()?;

    {
        let _fs = state.fs_lock.lock().await;
        staging::remove_job_dir(&state.config.staging_root, req.sid).await?;
    }

    QueueRepo::delete(&state.pool, req.sid).await?;

    tracing::info!(sid = req.sid, "queue item deleted");

    Ok(Json(CreatedReply::success("deleted", req.sid)).into_response())
}
