//! `Shutdown`: reply, give the response a second to flush, then trip
//! the graceful-shutdown token.

use std::time::Duration;

use axum::response::{IntoResponse, Response};
use axum::Json;

use simdock_core::protocol::StatusReply;

use crate::error::AppResult;
use crate::state::AppState;

pub async fn handle(state: &AppState) -> AppResult<Response> {
    tracing::info!("Shutdown command received");

    let token = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    Ok(Json(StatusReply::success("Shutting down")).into_response())
}
