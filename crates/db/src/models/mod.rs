pub mod queue;

pub use queue::{NewQueueItem, QueueRow};
