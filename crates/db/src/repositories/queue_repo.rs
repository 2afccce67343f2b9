//! Repository for the `Queue` table.
//!
//! Every mutating statement refreshes `Modified`; `Created` is set once
//! at insert. Timestamps are bound from `Utc::now()` rather than SQL
//! defaults so values round-trip through the chrono codecs unchanged.

use chrono::Utc;
use sqlx::SqlitePool;

use simdock_core::protocol::QueueItem;
use simdock_core::state::SimState;
use simdock_core::Sid;

use crate::models::{NewQueueItem, QueueRow};

/// Column list for `Queue` queries.
const COLUMNS: &str = "\
    SID, File, Username, Name, Priority, Description, MachineID, URL, \
    State, DtEstimate, DtCompleted, Created, Modified";

/// Provides the queue store operations. The dispatcher's command loop is
/// the only caller, so no statement here needs row locking.
pub struct QueueRepo;

impl QueueRepo {
    /// Insert a new item and return its assigned `SID`.
    pub async fn insert(pool: &SqlitePool, item: &NewQueueItem) -> Result<Sid, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO Queue \
                 (File, Username, Name, Priority, Description, URL, State, DtEstimate, \
                  Created, Modified) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.file)
        .bind(&item.username)
        .bind(&item.name)
        .bind(item.priority)
        .bind(&item.description)
        .bind(&item.url)
        .bind(item.state)
        .bind(item.dt_estimate)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Find an item by its `SID`.
    pub async fn find_by_id(pool: &SqlitePool, sid: Sid) -> Result<Option<QueueItem>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM Queue WHERE SID = ?");
        let row = sqlx::query_as::<_, QueueRow>(&query)
            .bind(sid)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(QueueItem::from))
    }

    /// Rewrite the mutable columns of the row keyed by `item.sid` and
    /// refresh `Modified`. A missing row is a no-op; callers load first.
    pub async fn update(pool: &SqlitePool, item: &QueueItem) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE Queue \
             SET File = ?, Name = ?, Priority = ?, Description = ?, MachineID = ?, \
                 URL = ?, State = ?, DtEstimate = ?, DtCompleted = ?, Modified = ? \
             WHERE SID = ?",
        )
        .bind(&item.file)
        .bind(&item.name)
        .bind(item.priority)
        .bind(&item.description)
        .bind(&item.machine_id)
        .bind(&item.url)
        .bind(item.state)
        .bind(item.dt_estimate)
        .bind(item.dt_completed)
        .bind(Utc::now())
        .bind(item.sid)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete an item. Idempotent: deleting an absent row succeeds.
    pub async fn delete(pool: &SqlitePool, sid: Sid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM Queue WHERE SID = ?")
            .bind(sid)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// The next item a `Book` should lease: smallest `Priority`, then
    /// smallest `SID`, among `Queued` rows. `None` means the queue is
    /// empty, which is a normal outcome rather than an error.
    pub async fn highest_priority_queued(
        pool: &SqlitePool,
    ) -> Result<Option<QueueItem>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM Queue \
             WHERE State = ? \
             ORDER BY Priority ASC, SID ASC \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, QueueRow>(&query)
            .bind(SimState::Queued.code())
            .fetch_optional(pool)
            .await?;
        Ok(row.map(QueueItem::from))
    }

    /// All items in `{Queued, Booked, Executing}`, in display order:
    /// executing items with an estimate first (by estimate), then
    /// executing items without one (by age), then the rest by priority
    /// and age. The trailing `SID` key makes ties deterministic.
    pub async fn active_queue(pool: &SqlitePool) -> Result<Vec<QueueItem>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM Queue \
             WHERE State IN (0, 1, 2) \
             ORDER BY \
                 CASE \
                     WHEN State = 2 AND DtEstimate IS NOT NULL THEN 1 \
                     WHEN State = 2 AND DtEstimate IS NULL THEN 2 \
                     ELSE 3 \
                 END, \
                 CASE \
                     WHEN State = 2 AND DtEstimate IS NOT NULL THEN DtEstimate \
                     WHEN State = 2 AND DtEstimate IS NULL THEN Created \
                     ELSE Priority \
                 END, \
                 Created, SID"
        );
        let rows = sqlx::query_as::<_, QueueRow>(&query).fetch_all(pool).await?;
        Ok(rows.into_iter().map(QueueItem::from).collect())
    }

    /// Items in `{Completed, ResultsSaved}`.
    pub async fn completed_queue(pool: &SqlitePool) -> Result<Vec<QueueItem>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM Queue \
             WHERE State IN (3, 4) \
             ORDER BY SID ASC"
        );
        let rows = sqlx::query_as::<_, QueueRow>(&query).fetch_all(pool).await?;
        Ok(rows.into_iter().map(QueueItem::from).collect())
    }

    /// Items a given machine still owes work on: leased to it and in
    /// `{Booked, Executing, Completed}`. The worker recovery engine
    /// reconciles against this set at startup.
    pub async fn incomplete_by_machine(
        pool: &SqlitePool,
        machine_id: &str,
    ) -> Result<Vec<QueueItem>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM Queue \
             WHERE MachineID = ? AND State IN (1, 2, 3) \
             ORDER BY SID ASC"
        );
        let rows = sqlx::query_as::<_, QueueRow>(&query)
            .bind(machine_id)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(QueueItem::from).collect())
    }
}
