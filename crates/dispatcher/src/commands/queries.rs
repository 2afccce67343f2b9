//! Read-only queue projections: `GetActiveQueue`, `GetCompletedQueue`,
//! `GetMachineQueue`, `GetSID`.

use axum::response::{IntoResponse, Response};
use axum::Json;

use simdock_core::protocol::{MachineQueueRequest, QueueListReply, SidRequest};
use simdock_core::CoreError;

use simdock_db::repositories::QueueRepo;

use crate::commands::CommandPayload;
use crate::error::AppResult;
use crate::state::AppState;

pub async fn active_queue(state: &AppState) -> AppResult<Response> {
    let items = QueueRepo::active_queue(&state.pool).await?;
    Ok(Json(QueueListReply::success(items)).into_response())
}

pub async fn completed_queue(state: &AppState) -> AppResult<Response> {
    let items = QueueRepo::completed_queue(&state.pool).await?;
    Ok(Json(QueueListReply::success(items)).into_response())
}

pub async fn machine_queue(state: &AppState, payload: &CommandPayload) -> AppResult<Response> {
    let req: MachineQueueRequest = payload.envelope.decode_data()?;
    let items = QueueRepo::incomplete_by_machine(&state.pool, &req.machine_id).await?;
    Ok(Json(QueueListReply::success(items)).into_response())
}

pub async fn get_sid(state: &AppState, payload: &CommandPayload) -> AppResult<Response> {
    let req: SidRequest = payload.envelope.decode_data()?;
    let item = QueueRepo::find_by_id(&state.pool, req.sid)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "queue item",
            id: req.sid,
        })?;
    Ok(Json(QueueListReply::success(vec![item])).into_response())
}
