//! Shared domain types for the simdock batch queue.
//!
//! This crate has zero internal dependencies so it can be used by the
//! dispatcher, the worker agent, and the CLI alike. It holds the queue
//! state machine, the `/command` wire protocol, and the flexible date
//! parsing used by `UpdateItem`.

pub mod error;
pub mod protocol;
pub mod state;
pub mod types;
pub mod wiredate;

pub use error::CoreError;
pub use types::{Sid, Timestamp};
