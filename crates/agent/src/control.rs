//! The agent's HTTP control surface.
//!
//! Small operator-facing endpoints: status, pause/resume booking, and
//! shutdown. All GET, all JSON.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use simdock_core::protocol::{AgentStatus, StatusReply};

use crate::supervisor::Supervisor;

pub fn router(supervisor: Supervisor) -> Router {
    Router::new()
        .route("/Status", get(status))
        .route("/PauseBooking", get(pause_booking))
        .route("/ResumeBooking", get(resume_booking))
        .route("/Shutdown", get(shutdown))
        .route("/CheckUpdates", get(check_updates))
        .with_state(supervisor)
}

async fn status(State(supervisor): State<Supervisor>) -> Json<AgentStatus> {
    Json(AgentStatus {
        program_started: supervisor.started_at,
        simulations_in_progress: supervisor.active_count().await,
        paused: supervisor.is_paused(),
        max_simulations: supervisor.cfg.max_simulations,
    })
}

async fn pause_booking(State(supervisor): State<Supervisor>) -> Json<StatusReply> {
    supervisor.set_paused(true);
    let message = format!("Booking paused at {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
    tracing::info!("{message}");
    Json(StatusReply::success(message))
}

async fn resume_booking(State(supervisor): State<Supervisor>) -> Json<StatusReply> {
    supervisor.set_paused(false);
    let message = format!("Booking resumed at {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
    tracing::info!("{message}");
    Json(StatusReply::success(message))
}

async fn shutdown(State(supervisor): State<Supervisor>) -> Json<StatusReply> {
    tracing::info!("Shutdown command received");
    supervisor.shutdown.cancel();
    Json(StatusReply::success("Shutting down"))
}

async fn check_updates() -> Json<StatusReply> {
    Json(StatusReply::success("no updates available"))
}
