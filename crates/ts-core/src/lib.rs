//! Core domain logic for group assignment time reconstruction.
//!
//! This crate contains the fundamental types and logic for:
//! - Classification: recognising group link/unlink entries in a ticket log
//! - Reconstruction: replaying a log into per-group ownership intervals
//! - Aggregation: rolling per-ticket results up into per-group totals

mod aggregate;
mod classify;
pub mod clock;
pub mod event;
mod reconstruct;
pub mod source;
mod stats;
pub mod types;

pub use aggregate::{AggregateResult, GroupAggregator, ResultsByTicket, aggregate, aggregate_par};
pub use classify::{
    EventKind, GroupIdentity, UNKNOWN_GROUP_NAME, classify, is_group_action, parse_group_token,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use event::{ActionCode, LogEvent, format_log_timestamp, parse_log_timestamp};
pub use reconstruct::{
    AnomalyCounts, AssignmentInterval, GroupTicketResult, Reconstruction, reconstruct,
    reconstruct_detailed,
};
pub use source::LogSource;
pub use stats::{DurationStats, GroupSummary, summarize, summarize_by_group};
pub use types::{GroupId, TicketId, TicketStatus, ValidationError};
