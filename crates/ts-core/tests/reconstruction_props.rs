//! Property tests for interval reconstruction and aggregation.
//!
//! Covers: interval ordering, open-interval placement, totals, idempotence,
//! and order-independence of aggregation.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use proptest::prelude::*;
use ts_core::{
    ActionCode, GroupAggregator, LogEvent, ResultsByTicket, TicketId, aggregate, aggregate_par,
    parse_log_timestamp, reconstruct, reconstruct_detailed,
};

fn base() -> NaiveDateTime {
    parse_log_timestamp("2025-01-01 00:00:00").expect("valid base timestamp")
}

/// (seconds offset, group id 1..=4, kind) where kind 0 = assign,
/// 1 = unassign, 2 = malformed assign, 3 = unrelated entry.
fn arb_entry() -> impl Strategy<Value = LogEvent> {
    (0_i64..20_000, 1_i64..=4, 0_u8..4).prop_map(|(offset, group, kind)| {
        let timestamp = base() + Duration::seconds(offset);
        let token = format!("Group {group} ({group})");
        match kind {
            0 => LogEvent {
                timestamp,
                linked_entity_type: "Group".to_string(),
                action: ActionCode::Assign,
                new_value: token,
                old_value: String::new(),
            },
            1 => LogEvent {
                timestamp,
                linked_entity_type: "Group".to_string(),
                action: ActionCode::Unassign,
                new_value: String::new(),
                old_value: token,
            },
            2 => LogEvent {
                timestamp,
                linked_entity_type: "Group".to_string(),
                action: ActionCode::Assign,
                new_value: "no identifier".to_string(),
                old_value: String::new(),
            },
            _ => LogEvent {
                timestamp,
                linked_entity_type: "User".to_string(),
                action: ActionCode::Other(4),
                new_value: token,
                old_value: String::new(),
            },
        }
    })
}

fn arb_log() -> impl Strategy<Value = Vec<LogEvent>> {
    prop::collection::vec(arb_entry(), 0..40)
}

fn now() -> NaiveDateTime {
    base() + Duration::seconds(30_000)
}

proptest! {
    #[test]
    fn intervals_are_ordered_and_non_overlapping(events in arb_log()) {
        let result = reconstruct(TicketId::new(1), &events, now());
        for group in result.values() {
            prop_assert!(!group.intervals.is_empty());
            for interval in &group.intervals {
                prop_assert!(interval.start <= interval.end);
                prop_assert_eq!(interval.duration, interval.end - interval.start);
            }
            for pair in group.intervals.windows(2) {
                prop_assert!(pair[0].end <= pair[1].start);
            }
        }
    }

    #[test]
    fn only_the_last_interval_may_be_open(events in arb_log()) {
        let result = reconstruct(TicketId::new(1), &events, now());
        for group in result.values() {
            let (last, rest) = group.intervals.split_last().expect("non-empty");
            prop_assert!(rest.iter().all(|interval| !interval.still_open));
            if last.still_open {
                prop_assert_eq!(last.end, now());
            }
        }
    }

    #[test]
    fn totals_match_interval_sums(events in arb_log()) {
        let result = reconstruct(TicketId::new(1), &events, now());
        for group in result.values() {
            let sum = group
                .intervals
                .iter()
                .fold(Duration::zero(), |acc, interval| acc + interval.duration);
            prop_assert_eq!(group.total_duration, sum);
            prop_assert_eq!(group.interval_count, group.intervals.len());
        }
    }

    #[test]
    fn reconstruction_is_idempotent(events in arb_log()) {
        let first = reconstruct_detailed(TicketId::new(9), &events, now());
        let second = reconstruct_detailed(TicketId::new(9), &events, now());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn aggregation_is_order_independent(logs in prop::collection::vec(arb_log(), 0..6)) {
        let per_ticket: ResultsByTicket = logs
            .iter()
            .enumerate()
            .map(|(idx, events)| {
                let ticket_id = TicketId::new(idx as u64 + 1);
                (ticket_id, reconstruct(ticket_id, events, now()))
            })
            .collect();

        let reversed = per_ticket
            .iter()
            .rev()
            .fold(GroupAggregator::new(), |acc, (ticket_id, groups)| {
                acc.with_ticket(*ticket_id, groups)
            })
            .finish();

        let sequential = aggregate(&per_ticket);
        prop_assert_eq!(&sequential, &reversed);
        prop_assert_eq!(&sequential, &aggregate_par(&per_ticket));

        let expected_tickets: BTreeMap<_, usize> = per_ticket
            .values()
            .flat_map(BTreeMap::keys)
            .fold(BTreeMap::new(), |mut counts, group_id| {
                *counts.entry(*group_id).or_default() += 1;
                counts
            });
        for (group_id, totals) in &sequential {
            prop_assert_eq!(totals.ticket_count, expected_tickets[group_id]);
        }
    }
}

#[test]
fn scenario_closed_pair() {
    let events = vec![
        LogEvent {
            timestamp: parse_log_timestamp("2025-01-01 09:00:00").unwrap(),
            linked_entity_type: "Group".to_string(),
            action: ActionCode::Assign,
            new_value: "Support (1)".to_string(),
            old_value: String::new(),
        },
        LogEvent {
            timestamp: parse_log_timestamp("2025-01-01 17:00:00").unwrap(),
            linked_entity_type: "Group".to_string(),
            action: ActionCode::Unassign,
            new_value: String::new(),
            old_value: "Support (1)".to_string(),
        },
    ];
    let result = reconstruct(TicketId::new(1), &events, now());
    assert_eq!(result.len(), 1);
    let support = result.values().next().unwrap();
    assert_eq!(support.group.name, "Support");
    assert_eq!(support.total_duration, Duration::hours(8));
    assert!(!support.intervals[0].still_open);
}
