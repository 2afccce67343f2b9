//! Row model and insert DTO for the `Queue` table.

use sqlx::FromRow;

use simdock_core::protocol::QueueItem;
use simdock_core::state::{SimState, StateCode};
use simdock_core::{Sid, Timestamp};

/// A row from the `Queue` table as read by sqlx. Converted to the wire
/// [`QueueItem`] at the repository boundary.
#[derive(Debug, Clone, FromRow)]
pub struct QueueRow {
    #[sqlx(rename = "SID")]
    pub sid: Sid,
    #[sqlx(rename = "File")]
    pub file: String,
    #[sqlx(rename = "Username")]
    pub username: String,
    #[sqlx(rename = "Name")]
    pub name: String,
    #[sqlx(rename = "Priority")]
    pub priority: i32,
    #[sqlx(rename = "Description")]
    pub description: String,
    #[sqlx(rename = "MachineID")]
    pub machine_id: String,
    #[sqlx(rename = "URL")]
    pub url: String,
    #[sqlx(rename = "State")]
    pub state: StateCode,
    #[sqlx(rename = "DtEstimate")]
    pub dt_estimate: Option<Timestamp>,
    #[sqlx(rename = "DtCompleted")]
    pub dt_completed: Option<Timestamp>,
    #[sqlx(rename = "Created")]
    pub created: Timestamp,
    #[sqlx(rename = "Modified")]
    pub modified: Timestamp,
}

impl From<QueueRow> for QueueItem {
    fn from(row: QueueRow) -> Self {
        QueueItem {
            sid: row.sid,
            file: row.file,
            username: row.username,
            name: row.name,
            priority: row.priority,
            description: row.description,
            machine_id: row.machine_id,
            url: row.url,
            state: row.state,
            dt_estimate: row.dt_estimate,
            dt_completed: row.dt_completed,
            created: row.created,
            modified: row.modified,
        }
    }
}

/// DTO for inserting a new queue entry. `SID`, `Created` and `Modified`
/// are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub file: String,
    pub username: String,
    pub name: String,
    pub priority: i32,
    pub description: String,
    pub url: String,
    pub state: StateCode,
    pub dt_estimate: Option<Timestamp>,
}

impl Default for NewQueueItem {
    fn default() -> Self {
        Self {
            file: String::new(),
            username: String::new(),
            name: String::new(),
            priority: 5,
            description: String::new(),
            url: String::new(),
            state: SimState::Queued.code(),
            dt_estimate: None,
        }
    }
}
