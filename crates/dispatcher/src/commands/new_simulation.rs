//! `NewSimulation`: create a queue entry from a multipart submission.
//!
//! Atomic from the caller's perspective: the uploaded config lands in a
//! private temp file, the row is inserted, and the temp file is renamed
//! into `<staging>/<SID>/`. If any filesystem step after the insert
//! fails, the row and the temp file are rolled back.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use simdock_core::protocol::{CreateQueueEntryRequest, CreatedReply};
use simdock_core::state::SimState;

use simdock_db::models::NewQueueItem;
use simdock_db::repositories::QueueRepo;

use crate::commands::{safe_filename, CommandPayload};
use crate::error::{AppError, AppResult};
use crate::staging;
use crate::state::AppState;

pub async fn handle(state: &AppState, payload: &CommandPayload) -> AppResult<Response> {
    let req: CreateQueueEntryRequest = payload.envelope.decode_data()?;
    safe_filename(&req.original_filename)?;

    let file = payload
        .file
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("missing file part".into()))?;
    if file.bytes.is_empty() {
        return Err(AppError::BadRequest("no file content. 0-length file".into()));
    }

    let staging_root = &state.config.staging_root;
    let _fs = state.fs_lock.lock().await;

    let temp = staging::write_temp(staging_root, &file.bytes).await?;

    let new_item = NewQueueItem {
        file: req.original_filename.clone(),
        username: payload.envelope.username.clone(),
        name: req.name.clone(),
        priority: req.priority,
        description: req.description.clone(),
        url: req.url.clone(),
        state: SimState::Queued.code(),
        dt_estimate: None,
    };

    let sid = match QueueRepo::insert(&state.pool, &new_item).await {
        Ok(sid) => sid,
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
    };

    if let Err(e) = staging::promote(&temp, staging_root, sid, &req.original_filename).await {
        // Roll back so the queue never references a config that is not
        // actually staged.
        let _ = QueueRepo::delete(&state.pool, sid).await;
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }

    tracing::info!(sid, file = %req.original_filename, name = %req.name, "queue item created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedReply::success("Created queue item", sid)),
    )
        .into_response())
}
