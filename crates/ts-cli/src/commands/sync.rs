//! Sync command: fetch ticket logs from GLPI and store reconstructed history.

use std::fs::{self, File};
use std::io::Write;
use std::ops::RangeInclusive;

use anyhow::{Context, Result, bail};
use clap::Args;
use fs2::FileExt;
use ts_core::{
    AnomalyCounts, Clock, LogSource, SystemClock, TicketId, TicketStatus, reconstruct_detailed,
};
use ts_db::Database;
use ts_glpi::{Client, SessionLogSource};

use crate::Config;

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// First ticket ID to process.
    pub start: u64,

    /// Last ticket ID to process (inclusive).
    pub end: u64,

    /// Re-fetch tickets that were already stored successfully.
    #[arg(long)]
    pub force: bool,

    /// Re-fetch stored tickets that still have an open assignment.
    #[arg(long)]
    pub refresh_open: bool,
}

/// Which stored tickets get fetched again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub force: bool,
    pub refresh_open: bool,
}

/// Outcome of a sync run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub anomalies: AnomalyCounts,
}

/// Largest ticket ID the database can store.
const MAX_TICKET_ID: u64 = i64::MAX.unsigned_abs();

/// Validates a requested ticket range before any connection is made.
pub fn ticket_range(start: u64, end: u64) -> Result<RangeInclusive<u64>> {
    if start > end {
        bail!("invalid ticket range: start {start} is after end {end}");
    }
    if end > MAX_TICKET_ID {
        bail!("invalid ticket range: end {end} exceeds the largest storable ID {MAX_TICKET_ID}");
    }
    Ok(start..=end)
}

pub fn run<W: Write>(writer: &mut W, args: &SyncArgs, config: &Config) -> Result<SyncReport> {
    let tickets = ticket_range(args.start, args.end)?;

    if let Some(parent) = config.database_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let lock_path = config.lock_path();
    let lock_file = File::create(&lock_path)
        .with_context(|| format!("failed to create {}", lock_path.display()))?;
    lock_file
        .try_lock_exclusive()
        .context("another sync is already writing to this database")?;

    let mut db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let client = Client::new(config.glpi.clone()).context("failed to create GLPI client")?;
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;

    let session = runtime
        .block_on(client.init_session())
        .context("failed to open GLPI session")?;
    let source = SessionLogSource::new(&client, &session);
    let options = SyncOptions {
        force: args.force,
        refresh_open: args.refresh_open,
    };
    let outcome = runtime.block_on(sync_tickets(
        &mut db,
        &source,
        &SystemClock,
        tickets,
        options,
    ));
    if let Err(err) = runtime.block_on(client.kill_session(&session)) {
        tracing::warn!(%err, "failed to close GLPI session");
    }
    let report = outcome?;

    write_summary(writer, &report)?;
    Ok(report)
}

/// Processes each ticket of the range in ascending order.
///
/// A failed fetch is recorded as `ERROR` and the run continues; storage
/// errors abort the run.
pub async fn sync_tickets<S: LogSource, C: Clock>(
    db: &mut Database,
    source: &S,
    clock: &C,
    tickets: RangeInclusive<u64>,
    options: SyncOptions,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    for raw_id in tickets {
        let ticket_id = TicketId::new(raw_id);
        if should_skip(db, ticket_id, options)? {
            tracing::debug!(%ticket_id, "already processed, skipping");
            report.skipped += 1;
            continue;
        }

        match source.fetch_ticket_log(ticket_id).await {
            Ok(events) => {
                let now = clock.now();
                let reconstruction = reconstruct_detailed(ticket_id, &events, now);
                if reconstruction.anomalies.total() > 0 {
                    tracing::warn!(
                        %ticket_id,
                        malformed = reconstruction.anomalies.malformed_tokens,
                        duplicate_assigns = reconstruction.anomalies.duplicate_assigns,
                        unmatched_unassigns = reconstruction.anomalies.unmatched_unassigns,
                        "log anomalies ignored"
                    );
                }
                db.record_ticket_result(ticket_id, &reconstruction.groups, now)
                    .with_context(|| format!("failed to store ticket {ticket_id}"))?;
                tracing::info!(
                    %ticket_id,
                    groups = reconstruction.groups.len(),
                    open = reconstruction.has_open_interval(),
                    "ticket processed"
                );
                report.anomalies.absorb(reconstruction.anomalies);
                report.processed += 1;
            }
            Err(err) => {
                tracing::warn!(%ticket_id, %err, "failed to fetch ticket log");
                db.record_ticket_error(ticket_id, &err.to_string(), clock.now())
                    .with_context(|| format!("failed to record error for ticket {ticket_id}"))?;
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

fn should_skip(db: &Database, ticket_id: TicketId, options: SyncOptions) -> Result<bool> {
    if options.force {
        return Ok(false);
    }
    let Some(row) = db.ticket_status(ticket_id)? else {
        return Ok(false);
    };
    if row.status != TicketStatus::Success {
        return Ok(false);
    }
    if options.refresh_open && db.has_open_periods(ticket_id)? {
        return Ok(false);
    }
    Ok(true)
}

fn write_summary<W: Write>(writer: &mut W, report: &SyncReport) -> Result<()> {
    writeln!(
        writer,
        "Processed {} ticket(s), skipped {}, failed {}.",
        report.processed, report.skipped, report.failed
    )?;
    if report.anomalies.total() > 0 {
        writeln!(
            writer,
            "Ignored log anomalies: {} malformed, {} duplicate assigns, {} unmatched unassigns.",
            report.anomalies.malformed_tokens,
            report.anomalies.duplicate_assigns,
            report.anomalies.unmatched_unassigns
        )?;
    }
    Ok(())
}
