//! Wire protocol for the dispatcher's single `/command` endpoint.
//!
//! Every command travels as an [`Envelope`], either as a plain JSON body
//! or as the `data` field of a multipart form when a file rides along.
//! Field names are PascalCase on the wire (`SID`, `MachineID`, ...) and
//! must stay that way; they are the protocol.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::state::StateCode;
use crate::types::{Sid, Timestamp};
use crate::wiredate;

/// `Status` value for successful replies.
pub const STATUS_SUCCESS: &str = "success";

/// `Status` value for application-level failures. The HTTP status stays
/// 200; this field is authoritative.
pub const STATUS_ERROR: &str = "error";

/// Reply message sent when `Book` finds nothing to lease. This is a
/// normal outcome, not an error; the agent matches on it verbatim.
pub const MSG_NONE_QUEUED: &str = "no queued items need booking";

/// Sentinel marking "field not supplied" in [`UpdateItemRequest`] string
/// fields: the horizontal-ellipsis character.
pub const ABSENT: &str = "\u{2026}";

/// Sentinel marking "priority not supplied" in [`UpdateItemRequest`].
pub const ABSENT_PRIORITY: i32 = -1;

fn absent_string() -> String {
    ABSENT.to_string()
}

fn absent_priority() -> i32 {
    ABSENT_PRIORITY
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The command envelope accepted by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Command")]
    pub command: String,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Data", default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Build an envelope with no payload.
    pub fn new(command: &str, username: &str) -> Self {
        Self {
            command: command.to_string(),
            username: username.to_string(),
            data: serde_json::Value::Null,
        }
    }

    /// Build an envelope carrying a serialized payload.
    pub fn with_data<T: Serialize>(
        command: &str,
        username: &str,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            command: command.to_string(),
            username: username.to_string(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Decode the `Data` payload into a request type.
    pub fn decode_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T, CoreError> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| CoreError::Validation(format!("invalid {} request data: {e}", self.command)))
    }
}

// ---------------------------------------------------------------------------
// Queue item (wire form)
// ---------------------------------------------------------------------------

/// A queue entry as it appears in query replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    #[serde(rename = "SID")]
    pub sid: Sid,
    #[serde(rename = "File")]
    pub file: String,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Priority")]
    pub priority: i32,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "MachineID")]
    pub machine_id: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "State")]
    pub state: StateCode,
    #[serde(rename = "DtEstimate")]
    pub dt_estimate: Option<Timestamp>,
    #[serde(rename = "DtCompleted")]
    pub dt_completed: Option<Timestamp>,
    #[serde(rename = "Created")]
    pub created: Timestamp,
    #[serde(rename = "Modified")]
    pub modified: Timestamp,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Default priority for new submissions; smaller is more urgent.
pub const DEFAULT_PRIORITY: i32 = 5;

/// `Data` payload for `NewSimulation` (multipart; the config file rides
/// in the `file` part).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateQueueEntryRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Priority")]
    pub priority: i32,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "OriginalFilename")]
    pub original_filename: String,
}

impl Default for CreateQueueEntryRequest {
    fn default() -> Self {
        Self {
            name: String::new(),
            priority: DEFAULT_PRIORITY,
            description: String::new(),
            url: String::new(),
            original_filename: String::new(),
        }
    }
}

/// `Data` payload for `Book`. The resource fields are advertisements,
/// logged by the dispatcher but not used for placement.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BookRequest {
    #[serde(rename = "MachineID")]
    pub machine_id: String,
    #[serde(rename = "CPUs")]
    pub cpus: i32,
    #[serde(rename = "Memory")]
    pub memory: String,
    #[serde(rename = "CPUArchitecture")]
    pub cpu_architecture: String,
    #[serde(rename = "Availability")]
    pub availability: String,
}

/// `Data` payload for `Rebook` and `Redo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebookRequest {
    #[serde(rename = "SID")]
    pub sid: Sid,
    #[serde(rename = "MachineID", default)]
    pub machine_id: String,
}

/// `Data` payload for `GetMachineQueue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineQueueRequest {
    #[serde(rename = "MachineID")]
    pub machine_id: String,
}

/// `Data` payload for `DeleteItem` and `GetSID`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidRequest {
    #[serde(rename = "SID")]
    pub sid: Sid,
}

/// The full `EndSimulation` envelope. Unlike every other command, `SID`
/// and `Filename` ride at the top level of the envelope, next to
/// `Command` and `Username`; the tarball itself is the `file` part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndSimulationEnvelope {
    #[serde(rename = "Command")]
    pub command: String,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "SID")]
    pub sid: Sid,
    #[serde(rename = "Filename")]
    pub filename: String,
}

/// `Data` payload for `UpdateItem`, with in-band "absent" sentinels kept
/// for wire compatibility: `-1` for `Priority`, `"…"` for strings.
/// Decode it into a [`QueuePatch`] before acting on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    #[serde(rename = "SID")]
    pub sid: Sid,
    #[serde(rename = "Priority", default = "absent_priority")]
    pub priority: i32,
    #[serde(rename = "Description", default = "absent_string")]
    pub description: String,
    #[serde(rename = "MachineID", default = "absent_string")]
    pub machine_id: String,
    #[serde(rename = "URL", default = "absent_string")]
    pub url: String,
    #[serde(rename = "DtEstimate", default = "absent_string")]
    pub dt_estimate: String,
    #[serde(rename = "DtCompleted", default = "absent_string")]
    pub dt_completed: String,
}

impl UpdateItemRequest {
    /// An update request with every field marked absent.
    pub fn empty(sid: Sid) -> Self {
        Self {
            sid,
            priority: ABSENT_PRIORITY,
            description: absent_string(),
            machine_id: absent_string(),
            url: absent_string(),
            dt_estimate: absent_string(),
            dt_completed: absent_string(),
        }
    }

    /// Translate the sentinel encoding into a first-class patch.
    ///
    /// A bad date string fails the whole request.
    pub fn into_patch(self) -> Result<QueuePatch, CoreError> {
        Ok(QueuePatch {
            priority: (self.priority >= 0).then_some(self.priority),
            description: present(self.description),
            machine_id: present(self.machine_id),
            url: present(self.url),
            dt_estimate: parse_date_field(&self.dt_estimate)?,
            dt_completed: parse_date_field(&self.dt_completed)?,
        })
    }
}

fn present(value: String) -> Option<String> {
    (value != ABSENT).then_some(value)
}

fn parse_date_field(value: &str) -> Result<Option<DateField>, CoreError> {
    if value == ABSENT {
        return Ok(None);
    }
    if value.trim().is_empty() {
        return Ok(Some(DateField::Clear));
    }
    Ok(Some(DateField::Set(wiredate::parse(value)?)))
}

/// A nullable-timestamp patch value: set a new time, or null the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Clear,
    Set(Timestamp),
}

/// In-memory form of an `UpdateItem` request: absence is an `Option`,
/// not a magic value.
#[derive(Debug, Clone, Default)]
pub struct QueuePatch {
    pub priority: Option<i32>,
    pub description: Option<String>,
    pub machine_id: Option<String>,
    pub url: Option<String>,
    pub dt_estimate: Option<DateField>,
    pub dt_completed: Option<DateField>,
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Simple `{Status, Message}` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl StatusReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// `{Status, Message, ID}` reply for operations that touch one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedReply {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "ID")]
    pub id: Sid,
}

impl CreatedReply {
    pub fn success(message: impl Into<String>, id: Sid) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: message.into(),
            id,
        }
    }
}

/// `{Status, Data: [...]}` reply for queue queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueListReply {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Data", default)]
    pub data: Vec<QueueItem>,
}

impl QueueListReply {
    pub fn success(data: Vec<QueueItem>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            data,
        }
    }
}

/// JSON part of the multipart `Book`/`Rebook` response; the config file
/// bytes follow in the `file` part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedReply {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "SID")]
    pub sid: Sid,
    #[serde(rename = "ConfigFilename")]
    pub config_filename: String,
}

/// Reply of the worker agent's `/Status` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    #[serde(rename = "ProgramStarted")]
    pub program_started: Timestamp,
    #[serde(rename = "SimulationsInProgress")]
    pub simulations_in_progress: usize,
    #[serde(rename = "Paused")]
    pub paused: bool,
    #[serde(rename = "MaxSimulations")]
    pub max_simulations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_names() {
        let env = Envelope::with_data("DeleteItem", "op", &SidRequest { sid: 7 }).unwrap();
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["Command"], "DeleteItem");
        assert_eq!(v["Username"], "op");
        assert_eq!(v["Data"]["SID"], 7);
    }

    #[test]
    fn queue_item_wire_names() {
        let item = QueueItem {
            sid: 3,
            file: "run.json5".into(),
            username: "op".into(),
            name: "run".into(),
            priority: 5,
            description: String::new(),
            machine_id: "m-1".into(),
            url: String::new(),
            state: 1,
            dt_estimate: None,
            dt_completed: None,
            created: chrono::Utc::now(),
            modified: chrono::Utc::now(),
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["SID"], 3);
        assert_eq!(v["MachineID"], "m-1");
        assert!(v["DtEstimate"].is_null());
    }

    #[test]
    fn update_request_defaults_to_sentinels() {
        let req: UpdateItemRequest = serde_json::from_str(r#"{"SID": 12}"#).unwrap();
        assert_eq!(req.priority, ABSENT_PRIORITY);
        assert_eq!(req.description, ABSENT);
        let patch = req.into_patch().unwrap();
        assert!(patch.priority.is_none());
        assert!(patch.description.is_none());
        assert!(patch.dt_estimate.is_none());
    }

    #[test]
    fn update_request_partial_patch() {
        let req: UpdateItemRequest =
            serde_json::from_str(r#"{"SID": 12, "Priority": 10, "Description": "Updated"}"#)
                .unwrap();
        let patch = req.into_patch().unwrap();
        assert_eq!(patch.priority, Some(10));
        assert_eq!(patch.description.as_deref(), Some("Updated"));
        assert!(patch.url.is_none());
        assert!(patch.machine_id.is_none());
    }

    #[test]
    fn empty_date_string_clears() {
        let req: UpdateItemRequest =
            serde_json::from_str(r#"{"SID": 12, "DtEstimate": ""}"#).unwrap();
        let patch = req.into_patch().unwrap();
        assert_eq!(patch.dt_estimate, Some(DateField::Clear));
    }

    #[test]
    fn date_string_sets_timestamp() {
        let req: UpdateItemRequest =
            serde_json::from_str(r#"{"SID": 12, "DtCompleted": "2026-03-04T10:00:00Z"}"#).unwrap();
        let patch = req.into_patch().unwrap();
        match patch.dt_completed {
            Some(DateField::Set(_)) => {}
            other => panic!("expected Set, got {other:?}"),
        }
    }

    #[test]
    fn bad_date_fails_whole_update() {
        let req: UpdateItemRequest =
            serde_json::from_str(r#"{"SID": 12, "DtEstimate": "not-a-date"}"#).unwrap();
        assert!(req.into_patch().is_err());
    }

    #[test]
    fn status_reply_helpers() {
        assert!(StatusReply::success("ok").is_success());
        assert!(!StatusReply::error("boom").is_success());
    }
}
