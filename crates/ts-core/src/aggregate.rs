//! Multi-ticket rollups of per-group results.

use std::collections::BTreeMap;

use chrono::Duration;
use rayon::prelude::*;

use crate::classify::GroupIdentity;
use crate::reconstruct::GroupTicketResult;
use crate::types::{GroupId, TicketId};

/// Per-ticket reconstruction results keyed by ticket.
pub type ResultsByTicket = BTreeMap<TicketId, BTreeMap<GroupId, GroupTicketResult>>;

/// Totals for one group across many tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateResult {
    /// Identity captured on the lowest ticket ID the group appears in.
    pub group: GroupIdentity,
    pub total_duration: Duration,
    /// Number of tickets the group held at least once.
    pub ticket_count: usize,
    /// Sum of interval counts.
    pub assignment_count: usize,
}

#[derive(Debug, Clone)]
struct Tally {
    group: GroupIdentity,
    first_ticket: TicketId,
    total_duration: Duration,
    ticket_count: usize,
    assignment_count: usize,
}

impl Tally {
    fn merge(&mut self, other: Self) {
        if other.first_ticket < self.first_ticket {
            self.group = other.group;
            self.first_ticket = other.first_ticket;
        }
        self.total_duration += other.total_duration;
        self.ticket_count += other.ticket_count;
        self.assignment_count += other.assignment_count;
    }
}

/// Accumulates group totals ticket by ticket.
///
/// [`GroupAggregator::merge`] is commutative and associative, so partial
/// aggregators built on different threads combine to the same result as a
/// sequential fold.
#[derive(Debug, Clone, Default)]
pub struct GroupAggregator {
    tallies: BTreeMap<GroupId, Tally>,
}

impl GroupAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one ticket's results. Each ticket must be added at most once.
    pub fn add_ticket(
        &mut self,
        ticket_id: TicketId,
        groups: &BTreeMap<GroupId, GroupTicketResult>,
    ) {
        for (group_id, result) in groups {
            let tally = Tally {
                group: result.group.clone(),
                first_ticket: ticket_id,
                total_duration: result.total_duration,
                ticket_count: 1,
                assignment_count: result.interval_count,
            };
            match self.tallies.get_mut(group_id) {
                Some(existing) => existing.merge(tally),
                None => {
                    self.tallies.insert(*group_id, tally);
                }
            }
        }
    }

    #[must_use]
    pub fn with_ticket(
        mut self,
        ticket_id: TicketId,
        groups: &BTreeMap<GroupId, GroupTicketResult>,
    ) -> Self {
        self.add_ticket(ticket_id, groups);
        self
    }

    /// Combines two partial aggregations over disjoint ticket sets.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for (group_id, tally) in other.tallies {
            match self.tallies.get_mut(&group_id) {
                Some(existing) => existing.merge(tally),
                None => {
                    self.tallies.insert(group_id, tally);
                }
            }
        }
        self
    }

    /// Returns the totals ordered by ascending group ID.
    pub fn finish(self) -> BTreeMap<GroupId, AggregateResult> {
        self.tallies
            .into_iter()
            .map(|(group_id, tally)| {
                (
                    group_id,
                    AggregateResult {
                        group: tally.group,
                        total_duration: tally.total_duration,
                        ticket_count: tally.ticket_count,
                        assignment_count: tally.assignment_count,
                    },
                )
            })
            .collect()
    }
}

/// Folds per-ticket results into per-group totals.
pub fn aggregate(per_ticket: &ResultsByTicket) -> BTreeMap<GroupId, AggregateResult> {
    per_ticket
        .iter()
        .fold(GroupAggregator::new(), |acc, (ticket_id, groups)| {
            acc.with_ticket(*ticket_id, groups)
        })
        .finish()
}

/// Parallel variant of [`aggregate`] for large ticket ranges.
pub fn aggregate_par(per_ticket: &ResultsByTicket) -> BTreeMap<GroupId, AggregateResult> {
    per_ticket
        .par_iter()
        .fold(GroupAggregator::new, |acc, (ticket_id, groups)| {
            acc.with_ticket(*ticket_id, groups)
        })
        .reduce(GroupAggregator::new, GroupAggregator::merge)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ActionCode, LogEvent, parse_log_timestamp};
    use crate::reconstruct::reconstruct;

    fn entry(at: &str, action: ActionCode, value: &str) -> LogEvent {
        let (new_value, old_value) = match action {
            ActionCode::Unassign => (String::new(), value.to_string()),
            _ => (value.to_string(), String::new()),
        };
        LogEvent {
            timestamp: parse_log_timestamp(at).unwrap(),
            linked_entity_type: "Group".to_string(),
            action,
            new_value,
            old_value,
        }
    }

    fn ticket(id: u64, events: &[LogEvent]) -> (TicketId, BTreeMap<GroupId, GroupTicketResult>) {
        let now = parse_log_timestamp("2025-02-01 00:00:00").unwrap();
        let ticket_id = TicketId::new(id);
        (ticket_id, reconstruct(ticket_id, events, now))
    }

    fn sample() -> ResultsByTicket {
        [
            ticket(
                10,
                &[
                    entry("2025-01-01 09:00:00", ActionCode::Assign, "Support (1)"),
                    entry("2025-01-01 10:00:00", ActionCode::Unassign, "Support (1)"),
                    entry("2025-01-01 11:00:00", ActionCode::Assign, "Support (1)"),
                    entry("2025-01-01 12:00:00", ActionCode::Unassign, "Support (1)"),
                ],
            ),
            ticket(
                3,
                &[
                    entry("2025-01-05 09:00:00", ActionCode::Assign, "Helpdesk (1)"),
                    entry("2025-01-05 11:00:00", ActionCode::Unassign, "Helpdesk (1)"),
                    entry("2025-01-05 09:00:00", ActionCode::Assign, "Network (2)"),
                    entry("2025-01-05 09:30:00", ActionCode::Unassign, "Network (2)"),
                ],
            ),
            ticket(7, &[]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn aggregates_totals_and_counts() {
        let totals = aggregate(&sample());

        let support = &totals[&GroupId::new(1)];
        assert_eq!(support.total_duration, Duration::hours(4));
        assert_eq!(support.ticket_count, 2);
        assert_eq!(support.assignment_count, 3);

        let network = &totals[&GroupId::new(2)];
        assert_eq!(network.total_duration, Duration::minutes(30));
        assert_eq!(network.ticket_count, 1);
        assert_eq!(network.assignment_count, 1);
    }

    #[test]
    fn identity_comes_from_lowest_ticket() {
        let totals = aggregate(&sample());
        assert_eq!(totals[&GroupId::new(1)].group.name, "Helpdesk");
    }

    #[test]
    fn output_is_ordered_by_group_id() {
        let ids: Vec<i64> = aggregate(&sample()).keys().map(|id| id.get()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn empty_input_yields_empty_totals() {
        assert!(aggregate(&ResultsByTicket::new()).is_empty());
    }

    #[test]
    fn merge_is_order_independent() {
        let per_ticket = sample();
        let mut forward = GroupAggregator::new();
        for (ticket_id, groups) in &per_ticket {
            forward.add_ticket(*ticket_id, groups);
        }
        let backward = per_ticket
            .iter()
            .rev()
            .map(|(ticket_id, groups)| GroupAggregator::new().with_ticket(*ticket_id, groups))
            .fold(GroupAggregator::new(), GroupAggregator::merge);

        assert_eq!(forward.finish(), backward.finish());
    }

    #[test]
    fn parallel_matches_sequential() {
        let per_ticket = sample();
        assert_eq!(aggregate(&per_ticket), aggregate_par(&per_ticket));
    }
}
