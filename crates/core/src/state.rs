//! Queue lifecycle states and the legal-transition table.
//!
//! State codes are wire-visible and persisted as integers, so the
//! discriminants here are part of the protocol and must never change.

/// State code as stored in the `Queue` table and sent on the wire.
pub type StateCode = i32;

/// Lifecycle state of a queue item.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    /// Waiting for a worker to book it.
    Queued = 0,
    /// Leased to a worker; the simulator has not reported in yet.
    Booked = 1,
    /// The simulator posted a completion estimate.
    Executing = 2,
    /// The simulator posted a completion time; results not yet archived.
    Completed = 3,
    /// Result bundle extracted into the results tree. Terminal on the
    /// happy path.
    ResultsSaved = 4,
    /// Something went fatally wrong.
    Error = 5,
}

impl SimState {
    /// Return the persisted/wire state code.
    pub fn code(self) -> StateCode {
        self as StateCode
    }

    /// Decode a state code. Returns `None` for codes outside the table.
    pub fn from_code(code: StateCode) -> Option<SimState> {
        match code {
            0 => Some(SimState::Queued),
            1 => Some(SimState::Booked),
            2 => Some(SimState::Executing),
            3 => Some(SimState::Completed),
            4 => Some(SimState::ResultsSaved),
            5 => Some(SimState::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for SimState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SimState::Queued => "Queued",
            SimState::Booked => "Booked",
            SimState::Executing => "Executing",
            SimState::Completed => "Completed",
            SimState::ResultsSaved => "ResultsSaved",
            SimState::Error => "Error",
        };
        write!(f, "{name}")
    }
}

/// Human-readable name for a state code, for log and error messages.
pub fn state_name(code: StateCode) -> &'static str {
    match SimState::from_code(code) {
        Some(SimState::Queued) => "Queued",
        Some(SimState::Booked) => "Booked",
        Some(SimState::Executing) => "Executing",
        Some(SimState::Completed) => "Completed",
        Some(SimState::ResultsSaved) => "ResultsSaved",
        Some(SimState::Error) => "Error",
        None => "Unknown",
    }
}

/// Returns the set of state codes reachable from `from`.
///
/// Rebook moves a lease back to `Booked` from any in-flight state,
/// `Redo` re-enqueues an item whose results were already saved, and
/// worker crash recovery may ship results for an item that never
/// reported executing, so the table is wider than the happy path alone.
pub fn valid_transitions(from: StateCode) -> &'static [StateCode] {
    match from {
        // Queued -> Booked, Error
        0 => &[1, 5],
        // Booked -> Executing, Booked (rebook), Queued (redo),
        //           ResultsSaved (recover-by-files), Error
        1 => &[2, 1, 0, 4, 5],
        // Executing -> Completed, Booked (rebook),
        //              ResultsSaved (recover-by-files), Error
        2 => &[3, 1, 4, 5],
        // Completed -> ResultsSaved, Booked (recovery rebook), Queued (redo), Error
        3 => &[4, 1, 0, 5],
        // ResultsSaved -> Queued (redo), Error
        4 => &[0, 5],
        // Error is terminal
        5 => &[],
        _ => &[],
    }
}

/// Check whether a transition from `from` to `to` is legal.
/// Staying in the same state is always allowed.
pub fn can_transition(from: StateCode, to: StateCode) -> bool {
    from == to || valid_transitions(from).contains(&to)
}

/// Validate a transition, producing a descriptive error message for
/// illegal ones.
pub fn validate_transition(from: StateCode, to: StateCode) -> Result<(), String> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(format!(
            "Invalid transition: {} ({from}) -> {} ({to})",
            state_name(from),
            state_name(to),
        ))
    }
}
