//! The command dispatcher for `POST /command`.
//!
//! Every request carries an [`Envelope`], either as a JSON body or as
//! the `data` field of a multipart form when a file accompanies it
//! (`NewSimulation`, `EndSimulation`). Dispatch is a static match over
//! the envelope's `Command` string; unknown commands return a structured
//! error.

pub mod book;
pub mod delete_item;
pub mod end_simulation;
pub mod new_simulation;
pub mod queries;
pub mod redo;
pub mod shutdown;
pub mod update_item;

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};

use simdock_core::protocol::Envelope;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Upper bound for plain JSON command bodies. File uploads go through
/// the multipart path and are governed by the router's body limit.
const MAX_JSON_BODY_BYTES: usize = 10 << 20;

/// The `file` part of a multipart command.
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

/// A decoded command request.
pub struct CommandPayload {
    pub envelope: Envelope,
    /// The raw envelope JSON (the whole body, or the multipart `data`
    /// field). `EndSimulation` re-reads it: that command carries `SID`
    /// and `Filename` at the envelope's top level.
    pub raw: String,
    pub file: Option<UploadedFile>,
}

/// Axum handler for `POST /command`.
pub async fn command_dispatcher(State(state): State<AppState>, req: Request) -> Response {
    let payload = match decode_payload(req).await {
        Ok(payload) => payload,
        Err(e) => return e.into_response(),
    };

    tracing::info!(
        command = %payload.envelope.command,
        username = %payload.envelope.username,
        "received command",
    );

    let result = match payload.envelope.command.as_str() {
        "NewSimulation" => new_simulation::handle(&state, &payload).await,
        "Book" | "Rebook" => book::handle(&state, &payload).await,
        "UpdateItem" => update_item::handle(&state, &payload).await,
        "EndSimulation" => end_simulation::handle(&state, &payload).await,
        "Redo" => redo::handle(&state, &payload).await,
        "DeleteItem" => delete_item::handle(&state, &payload).await,
        "GetActiveQueue" => queries::active_queue(&state).await,
        "GetCompletedQueue" => queries::completed_queue(&state).await,
        "GetMachineQueue" => queries::machine_queue(&state, &payload).await,
        "GetSID" => queries::get_sid(&state, &payload).await,
        "Shutdown" => shutdown::handle(&state).await,
        other => Err(AppError::BadRequest(format!("unknown command: {other}"))),
    };

    result.unwrap_or_else(|e| e.into_response())
}

/// Pull the envelope (and file part, if any) out of the request.
async fn decode_payload(req: Request) -> AppResult<CommandPayload> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| AppError::BadRequest("missing Content-Type header".into()))?;

    if content_type.starts_with("multipart/form-data") {
        decode_multipart(req).await
    } else {
        decode_json(req).await
    }
}

async fn decode_json(req: Request) -> AppResult<CommandPayload> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_BYTES)
        .await
        .map_err(|e| AppError::BadRequest(format!("failed to read request body: {e}")))?;

    let raw = String::from_utf8(bytes.to_vec())
        .map_err(|_| AppError::BadRequest("request body is not valid UTF-8".into()))?;

    let envelope: Envelope = serde_json::from_str(&raw)
        .map_err(|e| AppError::BadRequest(format!("invalid request payload: {e}")))?;

    Ok(CommandPayload {
        envelope,
        raw,
        file: None,
    })
}

async fn decode_multipart(req: Request) -> AppResult<CommandPayload> {
    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| AppError::BadRequest(format!("failed to parse multipart form: {e}")))?;

    let mut raw: Option<String> = None;
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("failed to read multipart field: {e}")))?
    {
        match field.name() {
            Some("data") => {
                let text = field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("failed to read data field: {e}"))
                })?;
                raw = Some(text);
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("file").to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::BadRequest(format!("failed to read file part: {e}"))
                })?;
                file = Some(UploadedFile { filename, bytes });
            }
            // Extra convenience fields some clients send; the envelope
            // is authoritative.
            _ => {}
        }
    }

    let raw =
        raw.ok_or_else(|| AppError::BadRequest("missing data field in multipart request".into()))?;

    let envelope: Envelope = serde_json::from_str(&raw).map_err(|e| {
        AppError::BadRequest(format!("invalid data payload in multipart request: {e}"))
    })?;

    Ok(CommandPayload {
        envelope,
        raw,
        file,
    })
}

/// Reject filenames that could escape their job directory.
pub(crate) fn safe_filename(name: &str) -> AppResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(AppError::BadRequest(format!("invalid filename: {name:?}")));
    }
    Ok(())
}
