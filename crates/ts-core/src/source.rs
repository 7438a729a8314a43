//! Where ticket logs come from.

use std::future::Future;

use crate::event::LogEvent;
use crate::types::TicketId;

/// Fetches the full audit log of a ticket.
///
/// An empty log is a valid answer; errors are reserved for failed fetches
/// (missing ticket, transport failure) and stop the ticket from being
/// reconstructed at all.
pub trait LogSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch_ticket_log(
        &self,
        ticket_id: TicketId,
    ) -> impl Future<Output = Result<Vec<LogEvent>, Self::Error>> + Send;
}
