/// Queue primary keys are 64-bit auto-increment integers.
pub type Sid = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
