//! Status command for showing what the database holds.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use ts_core::TicketStatus;
use ts_db::Database;

/// Failed tickets listed before the rest are summarized.
const MAX_LISTED_ERRORS: usize = 10;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let counts = db.status_counts()?;

    writeln!(writer, "Assignment history status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(writer, "Processed tickets: {}", counts.success + counts.error)?;
    writeln!(writer, "  SUCCESS: {}", counts.success)?;
    writeln!(writer, "  ERROR:   {}", counts.error)?;

    if counts.error == 0 {
        return Ok(());
    }

    let failed = db.list_tickets_with_status(TicketStatus::Error)?;
    writeln!(writer, "Failed tickets:")?;
    for ticket in failed.iter().take(MAX_LISTED_ERRORS) {
        let message = ticket.error.as_deref().unwrap_or("unknown error");
        writeln!(
            writer,
            "- {} ({}): {message}",
            ticket.ticket_id, ticket.processed_at
        )?;
    }
    let remaining = failed.len().saturating_sub(MAX_LISTED_ERRORS);
    if remaining > 0 {
        writeln!(writer, "  ... and {remaining} more")?;
    }

    Ok(())
}
