//! Interval reconstruction.
//!
//! Replays a ticket's audit log into per-group ownership intervals.
//!
//! # Algorithm Summary
//!
//! 1. Stable-sort entries by timestamp (same-second entries keep source order)
//! 2. Fold each classified entry into a per-group state machine
//!    (`Closed` / `Open { start }`), closing an interval on unassign
//! 3. Close every group still open at `now`, flagged as still open
//!
//! Redundant assigns, unassigns without a prior assign and unparseable group
//! tokens are ignored and counted as anomalies. Reconstruction never fails.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};

use crate::classify::{EventKind, GroupIdentity, classify, is_group_action};
use crate::event::LogEvent;
use crate::types::{GroupId, TicketId};

/// A contiguous span during which one group held a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration: Duration,
    /// `end` is the analysis time, not an observed unassignment.
    pub still_open: bool,
}

impl AssignmentInterval {
    /// Rebuilds an interval from stored bounds.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, still_open: bool) -> Self {
        Self {
            start,
            end,
            duration: end - start,
            still_open,
        }
    }

    /// An interval closed by an observed unassignment.
    fn closed(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            duration: end - start,
            still_open: false,
        }
    }

    /// An interval still running at `now`.
    ///
    /// A clock behind the assignment yields a zero-length interval rather
    /// than a negative one.
    fn open(start: NaiveDateTime, now: NaiveDateTime) -> Self {
        let end = now.max(start);
        Self {
            start,
            end,
            duration: end - start,
            still_open: true,
        }
    }

    /// Whole seconds covered by the interval.
    pub fn duration_secs(&self) -> i64 {
        self.duration.num_seconds()
    }
}

/// All intervals of one group on one ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTicketResult {
    pub group: GroupIdentity,
    pub total_duration: Duration,
    /// Chronological, non-overlapping.
    pub intervals: Vec<AssignmentInterval>,
    pub interval_count: usize,
}

impl GroupTicketResult {
    /// Builds a result, deriving the total and count from `intervals`.
    pub fn from_intervals(group: GroupIdentity, intervals: Vec<AssignmentInterval>) -> Self {
        let total_duration = intervals
            .iter()
            .fold(Duration::zero(), |total, interval| total + interval.duration);
        Self {
            group,
            total_duration,
            interval_count: intervals.len(),
            intervals,
        }
    }

    /// True if the group is still assigned at analysis time.
    pub fn is_open(&self) -> bool {
        self.intervals.last().is_some_and(|interval| interval.still_open)
    }

    pub fn total_secs(&self) -> i64 {
        self.total_duration.num_seconds()
    }
}

/// Data-quality counters for one ticket's replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalyCounts {
    /// Group link entries whose value had no parseable `(id)`.
    pub malformed_tokens: usize,
    /// Assigns for a group that was already open.
    pub duplicate_assigns: usize,
    /// Unassigns for a group that was not open.
    pub unmatched_unassigns: usize,
}

impl AnomalyCounts {
    pub const fn total(&self) -> usize {
        self.malformed_tokens + self.duplicate_assigns + self.unmatched_unassigns
    }

    /// Adds another ticket's counters to this one.
    pub fn absorb(&mut self, other: Self) {
        self.malformed_tokens += other.malformed_tokens;
        self.duplicate_assigns += other.duplicate_assigns;
        self.unmatched_unassigns += other.unmatched_unassigns;
    }
}

/// Full output of a ticket replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub ticket_id: TicketId,
    /// Groups with at least one interval, keyed and ordered by ID.
    pub groups: BTreeMap<GroupId, GroupTicketResult>,
    pub anomalies: AnomalyCounts,
}

impl Reconstruction {
    /// True if any group is still assigned at analysis time.
    pub fn has_open_interval(&self) -> bool {
        self.groups.values().any(GroupTicketResult::is_open)
    }
}

/// Ownership state of one group during replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupState {
    Closed,
    Open { start: NaiveDateTime },
}

#[derive(Debug)]
struct GroupLedger {
    /// First identity seen for this group.
    group: GroupIdentity,
    state: GroupState,
    intervals: Vec<AssignmentInterval>,
}

impl GroupLedger {
    fn new(group: GroupIdentity) -> Self {
        Self {
            group,
            state: GroupState::Closed,
            intervals: Vec::new(),
        }
    }
}

/// Accumulator threaded through the event fold.
#[derive(Debug, Default)]
struct Replay {
    ledgers: BTreeMap<GroupId, GroupLedger>,
    anomalies: AnomalyCounts,
}

impl Replay {
    fn apply(mut self, ticket_id: TicketId, event: &LogEvent) -> Self {
        let at = event.timestamp;
        match classify(event) {
            EventKind::Assign(group) => {
                let group_id = group.id;
                let ledger = self
                    .ledgers
                    .entry(group_id)
                    .or_insert_with(|| GroupLedger::new(group));
                match ledger.state {
                    GroupState::Closed => ledger.state = GroupState::Open { start: at },
                    GroupState::Open { start } => {
                        tracing::debug!(%ticket_id, %group_id, %start, %at, "ignoring duplicate assign");
                        self.anomalies.duplicate_assigns += 1;
                    }
                }
            }
            EventKind::Unassign(group) => {
                let group_id = group.id;
                let ledger = self
                    .ledgers
                    .entry(group_id)
                    .or_insert_with(|| GroupLedger::new(group));
                match ledger.state {
                    GroupState::Open { start } => {
                        ledger.intervals.push(AssignmentInterval::closed(start, at));
                        ledger.state = GroupState::Closed;
                    }
                    GroupState::Closed => {
                        tracing::debug!(%ticket_id, %group_id, %at, "ignoring unassign without assign");
                        self.anomalies.unmatched_unassigns += 1;
                    }
                }
            }
            EventKind::Irrelevant => {
                if is_group_action(event) {
                    tracing::debug!(
                        %ticket_id,
                        %at,
                        new_value = %event.new_value,
                        old_value = %event.old_value,
                        "ignoring group entry without a parseable group"
                    );
                    self.anomalies.malformed_tokens += 1;
                }
            }
        }
        self
    }

    fn finish(self, ticket_id: TicketId, now: NaiveDateTime) -> Reconstruction {
        let groups = self
            .ledgers
            .into_iter()
            .filter_map(|(group_id, mut ledger)| {
                if let GroupState::Open { start } = ledger.state {
                    ledger.intervals.push(AssignmentInterval::open(start, now));
                }
                if ledger.intervals.is_empty() {
                    return None;
                }
                Some((
                    group_id,
                    GroupTicketResult::from_intervals(ledger.group, ledger.intervals),
                ))
            })
            .collect();

        Reconstruction {
            ticket_id,
            groups,
            anomalies: self.anomalies,
        }
    }
}

/// Replays a ticket's log and reports anomalies alongside the intervals.
///
/// `now` closes intervals that are still open; callers capture it once per
/// ticket so every open group shares the same end.
pub fn reconstruct_detailed(
    ticket_id: TicketId,
    events: &[LogEvent],
    now: NaiveDateTime,
) -> Reconstruction {
    let mut ordered: Vec<&LogEvent> = events.iter().collect();
    ordered.sort_by_key(|event| event.timestamp);

    let reconstruction = ordered
        .into_iter()
        .fold(Replay::default(), |replay, event| replay.apply(ticket_id, event))
        .finish(ticket_id, now);

    if reconstruction.anomalies.total() > 0 {
        tracing::debug!(
            %ticket_id,
            anomalies = ?reconstruction.anomalies,
            "log contained ignored entries"
        );
    }
    reconstruction
}

/// Replays a ticket's log into per-group ownership intervals.
pub fn reconstruct(
    ticket_id: TicketId,
    events: &[LogEvent],
    now: NaiveDateTime,
) -> BTreeMap<GroupId, GroupTicketResult> {
    reconstruct_detailed(ticket_id, events, now).groups
}
