//! Storage layer for reconstructed group assignment history.
//!
//! Provides persistence for per-ticket results using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Writers take `&mut self`, so a single `Database` is a single writer; the
//! sync command additionally holds a lock file so two processes never write
//! the same database at once.
//!
//! # Schema
//!
//! - `processed_tickets`: one row per ticket the sync driver has visited,
//!   with status `SUCCESS` or `ERROR`
//! - `group_durations`: one summary row per (ticket, group)
//! - `assignment_periods`: one row per ownership interval
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in the ticketing platform's own local
//! format (`2025-01-15 10:30:00`). Lexicographic ordering matches
//! chronological ordering, so range filters compare strings directly.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use ts_core::{
    AssignmentInterval, GroupId, GroupIdentity, GroupTicketResult, ResultsByTicket, TicketId,
    TicketStatus, ValidationError, format_log_timestamp, parse_log_timestamp,
};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A ticket ID does not fit SQLite's signed integer.
    #[error("ticket ID out of range: {0}")]
    TicketIdOutOfRange(u64),
    /// A stored row holds a value the domain types reject.
    #[error("invalid stored value for ticket {ticket_id}: {source}")]
    InvalidRow {
        ticket_id: i64,
        #[source]
        source: ValidationError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A row of the processed-ticket ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedTicket {
    pub ticket_id: TicketId,
    pub status: TicketStatus,
    pub error: Option<String>,
    pub processed_at: String,
}

/// Number of processed tickets per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub success: usize,
    pub error: usize,
}

/// Restricts stored results to tickets with a period starting in a range.
///
/// Both bounds are inclusive; `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodFilter {
    pub since: Option<NaiveDateTime>,
    pub until: Option<NaiveDateTime>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS processed_tickets (
                ticket_id INTEGER PRIMARY KEY,
                status TEXT NOT NULL,
                error TEXT,
                processed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_processed_tickets_status ON processed_tickets(status);

            CREATE TABLE IF NOT EXISTS group_durations (
                ticket_id INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                group_name TEXT NOT NULL,
                total_seconds INTEGER NOT NULL,
                interval_count INTEGER NOT NULL,
                PRIMARY KEY (ticket_id, group_id)
            );

            CREATE INDEX IF NOT EXISTS idx_group_durations_group ON group_durations(group_id);

            -- start_time/end_time: 'YYYY-MM-DD HH:MM:SS' local time
            -- still_open: 1 when end_time is the analysis time, not an unassignment
            CREATE TABLE IF NOT EXISTS assignment_periods (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                group_name TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL,
                still_open INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (ticket_id, group_id)
                    REFERENCES group_durations(ticket_id, group_id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_assignment_periods_ticket ON assignment_periods(ticket_id);
            CREATE INDEX IF NOT EXISTS idx_assignment_periods_start ON assignment_periods(start_time);
            ",
        )?;
        Ok(())
    }

    /// Replaces a ticket's stored results and marks it `SUCCESS`.
    ///
    /// Runs in one transaction: readers see either the previous results or
    /// the new ones. Recording the same results twice leaves the same rows.
    pub fn record_ticket_result(
        &mut self,
        ticket_id: TicketId,
        groups: &BTreeMap<GroupId, GroupTicketResult>,
        processed_at: NaiveDateTime,
    ) -> Result<(), DbError> {
        let ticket = ticket_param(ticket_id)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM assignment_periods WHERE ticket_id = ?",
            [ticket],
        )?;
        tx.execute("DELETE FROM group_durations WHERE ticket_id = ?", [ticket])?;
        {
            let mut summary_stmt = tx.prepare(
                "
                INSERT INTO group_durations
                (ticket_id, group_id, group_name, total_seconds, interval_count)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;
            let mut period_stmt = tx.prepare(
                "
                INSERT INTO assignment_periods
                (ticket_id, group_id, group_name, start_time, end_time, duration_seconds, still_open)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for (group_id, result) in groups {
                let interval_count = i64::try_from(result.interval_count).unwrap_or(i64::MAX);
                summary_stmt.execute(params![
                    ticket,
                    group_id.get(),
                    result.group.name,
                    result.total_secs(),
                    interval_count,
                ])?;
                for interval in &result.intervals {
                    period_stmt.execute(params![
                        ticket,
                        group_id.get(),
                        result.group.name,
                        format_log_timestamp(interval.start),
                        format_log_timestamp(interval.end),
                        interval.duration_secs(),
                        interval.still_open,
                    ])?;
                }
            }
        }
        upsert_status(&tx, ticket, TicketStatus::Success, None, processed_at)?;
        tx.commit()?;
        tracing::debug!(%ticket_id, groups = groups.len(), "stored ticket result");
        Ok(())
    }

    /// Marks a ticket `ERROR`, keeping any results from an earlier run.
    pub fn record_ticket_error(
        &mut self,
        ticket_id: TicketId,
        message: &str,
        processed_at: NaiveDateTime,
    ) -> Result<(), DbError> {
        let ticket = ticket_param(ticket_id)?;
        upsert_status(
            &self.conn,
            ticket,
            TicketStatus::Error,
            Some(message),
            processed_at,
        )
    }

    /// Returns the ledger row for a ticket, if it was ever processed.
    pub fn ticket_status(&self, ticket_id: TicketId) -> Result<Option<ProcessedTicket>, DbError> {
        let ticket = ticket_param(ticket_id)?;
        let row = self
            .conn
            .query_row(
                "
                SELECT ticket_id, status, error, processed_at
                FROM processed_tickets
                WHERE ticket_id = ?
                ",
                [ticket],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(processed_ticket_from_row).transpose()
    }

    /// Lists ledger rows with the given status, ordered by ticket ID.
    pub fn list_tickets_with_status(
        &self,
        status: TicketStatus,
    ) -> Result<Vec<ProcessedTicket>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT ticket_id, status, error, processed_at
            FROM processed_tickets
            WHERE status = ?
            ORDER BY ticket_id ASC
            ",
        )?;
        let rows = stmt.query_map([status.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut tickets = Vec::new();
        for row in rows {
            tickets.push(processed_ticket_from_row(row?)?);
        }
        Ok(tickets)
    }

    /// Counts processed tickets per status.
    pub fn status_counts(&self) -> Result<StatusCounts, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM processed_tickets GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            let count = usize::try_from(count).unwrap_or(0);
            match status.parse::<TicketStatus>() {
                Ok(TicketStatus::Success) => counts.success = count,
                Ok(TicketStatus::Error) => counts.error = count,
                Err(err) => tracing::warn!(%err, "skipping unknown ticket status"),
            }
        }
        Ok(counts)
    }

    /// True if any stored period of the ticket is still open.
    pub fn has_open_periods(&self, ticket_id: TicketId) -> Result<bool, DbError> {
        let ticket = ticket_param(ticket_id)?;
        let open: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM assignment_periods WHERE ticket_id = ? AND still_open = 1)",
            [ticket],
            |row| row.get(0),
        )?;
        Ok(open)
    }

    /// Rebuilds stored per-ticket results.
    ///
    /// With a filter, only tickets having at least one period whose start
    /// falls in the range are returned; all of those tickets' groups are
    /// included, not only the matching periods.
    pub fn load_ticket_results(&self, filter: &PeriodFilter) -> Result<ResultsByTicket, DbError> {
        let since = filter.since.map(format_log_timestamp);
        let until = filter.until.map(format_log_timestamp);
        let mut stmt = self.conn.prepare(
            "
            SELECT ticket_id, group_id, group_name, start_time, end_time, still_open
            FROM assignment_periods
            WHERE ticket_id IN (
                SELECT DISTINCT ticket_id
                FROM assignment_periods
                WHERE (?1 IS NULL OR start_time >= ?1)
                  AND (?2 IS NULL OR start_time <= ?2)
            )
            ORDER BY ticket_id ASC, group_id ASC, start_time ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(params![since, until], |row| {
            Ok(PeriodRow {
                ticket_id: row.get(0)?,
                group_id: row.get(1)?,
                group_name: row.get(2)?,
                start_time: row.get(3)?,
                end_time: row.get(4)?,
                still_open: row.get(5)?,
            })
        })?;

        let mut grouped: BTreeMap<TicketId, BTreeMap<GroupId, (GroupIdentity, Vec<AssignmentInterval>)>> =
            BTreeMap::new();
        for row in rows {
            let row = row?;
            let ticket_id = stored_ticket_id(row.ticket_id)?;
            let invalid = |source| DbError::InvalidRow {
                ticket_id: row.ticket_id,
                source,
            };
            let start = parse_log_timestamp(&row.start_time).map_err(invalid)?;
            let end = parse_log_timestamp(&row.end_time).map_err(invalid)?;
            let group_id = GroupId::new(row.group_id);
            grouped
                .entry(ticket_id)
                .or_default()
                .entry(group_id)
                .or_insert_with(|| (GroupIdentity::new(group_id, row.group_name.clone()), Vec::new()))
                .1
                .push(AssignmentInterval::new(start, end, row.still_open));
        }

        Ok(grouped
            .into_iter()
            .map(|(ticket_id, groups)| {
                let groups = groups
                    .into_iter()
                    .map(|(group_id, (group, intervals))| {
                        (group_id, GroupTicketResult::from_intervals(group, intervals))
                    })
                    .collect();
                (ticket_id, groups)
            })
            .collect())
    }
}

#[derive(Debug)]
struct PeriodRow {
    ticket_id: i64,
    group_id: i64,
    group_name: String,
    start_time: String,
    end_time: String,
    still_open: bool,
}

fn ticket_param(ticket_id: TicketId) -> Result<i64, DbError> {
    i64::try_from(ticket_id.get()).map_err(|_| DbError::TicketIdOutOfRange(ticket_id.get()))
}

fn stored_ticket_id(raw: i64) -> Result<TicketId, DbError> {
    u64::try_from(raw)
        .map(TicketId::new)
        .map_err(|_| DbError::InvalidRow {
            ticket_id: raw,
            source: ValidationError::InvalidId {
                field: "ticket ID",
                value: raw.to_string(),
            },
        })
}

fn processed_ticket_from_row(
    (ticket_id, status, error, processed_at): (i64, String, Option<String>, String),
) -> Result<ProcessedTicket, DbError> {
    let status = status
        .parse()
        .map_err(|source| DbError::InvalidRow { ticket_id, source })?;
    Ok(ProcessedTicket {
        ticket_id: stored_ticket_id(ticket_id)?,
        status,
        error,
        processed_at,
    })
}

fn upsert_status(
    conn: &Connection,
    ticket: i64,
    status: TicketStatus,
    error: Option<&str>,
    processed_at: NaiveDateTime,
) -> Result<(), DbError> {
    conn.execute(
        "
        INSERT INTO processed_tickets (ticket_id, status, error, processed_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(ticket_id) DO UPDATE SET
            status = excluded.status,
            error = excluded.error,
            processed_at = excluded.processed_at
        ",
        params![
            ticket,
            status.as_str(),
            error,
            format_log_timestamp(processed_at)
        ],
    )?;
    Ok(())
}
