//! `UpdateItem`: partial patch on a queue entry.
//!
//! The wire keeps the historical in-band sentinels (`-1`, `"…"`); they
//! are decoded into a [`QueuePatch`] before anything is touched. A
//! supplied `DtEstimate` moves the item to `Executing`; a supplied
//! `DtCompleted` moves it to `Completed`. An empty date string clears
//! the column without a state change. A bad date fails the whole update.

use axum::response::{IntoResponse, Response};
use axum::Json;

use simdock_core::protocol::{CreatedReply, DateField, UpdateItemRequest};
use simdock_core::state::{validate_transition, SimState};
use simdock_core::CoreError;

use simdock_db::repositories::QueueRepo;

use crate::commands::CommandPayload;
use crate::error::AppResult;
use crate::state::AppState;

pub async fn handle(state: &AppState, payload: &CommandPayload) -> AppResult<Response> {
    let req: UpdateItemRequest = payload.envelope.decode_data()?;
    let sid = req.sid;
    let patch = req.into_patch()?;

    let mut item = QueueRepo::find_by_id(&state.pool, sid)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "queue item",
            id: sid,
        })?;

    if let Some(priority) = patch.priority {
        item.priority = priority;
    }
    if let Some(description) = patch.description {
        item.description = description;
    }
    if let Some(machine_id) = patch.machine_id {
        item.machine_id = machine_id;
    }
    if let Some(url) = patch.url {
        item.url = url;
    }

    match patch.dt_estimate {
        Some(DateField::Clear) => item.dt_estimate = None,
        Some(DateField::Set(dt)) => {
            validate_transition(item.state, SimState::Executing.code())
                .map_err(CoreError::Validation)?;
            item.dt_estimate = Some(dt);
            item.state = SimState::Executing.code();
        }
        None => {}
    }

    match patch.dt_completed {
        Some(DateField::Clear) => item.dt_completed = None,
        Some(DateField::Set(dt)) => {
            validate_transition(item.state, SimState::Completed.code())
                .map_err(CoreError::Validation)?;
            item.dt_completed = Some(dt);
            item.state = SimState::Completed.code();
        }
        None => {}
    }

    QueueRepo::update(&state.pool, &item).await?;

    tracing::info!(sid, state = item.state, "queue item updated");

    Ok(Json(CreatedReply::success("Updated", sid)).into_response())
}
