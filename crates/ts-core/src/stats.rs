//! Summary statistics over per-ticket group durations.

use std::collections::BTreeMap;

use chrono::Duration;

use crate::aggregate::ResultsByTicket;
use crate::classify::GroupIdentity;
use crate::types::GroupId;

/// Mean and median of a set of durations, truncated to whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationStats {
    pub count: usize,
    pub mean: Duration,
    pub median: Duration,
}

/// Summarizes durations. Returns `None` for an empty slice.
///
/// The median of an even-sized set is the mean of the two middle values.
pub fn summarize(durations: &[Duration]) -> Option<DurationStats> {
    if durations.is_empty() {
        return None;
    }
    let mut seconds: Vec<i64> = durations.iter().map(Duration::num_seconds).collect();
    seconds.sort_unstable();

    let count = seconds.len();
    let divisor = i64::try_from(count).ok()?;
    let mean = seconds.iter().sum::<i64>() / divisor;
    let mid = count / 2;
    let median = if count % 2 == 0 {
        (seconds[mid - 1] + seconds[mid]) / 2
    } else {
        seconds[mid]
    };

    Some(DurationStats {
        count,
        mean: Duration::seconds(mean),
        median: Duration::seconds(median),
    })
}

/// Duration statistics for one group, one sample per ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub group: GroupIdentity,
    pub stats: DurationStats,
}

/// Summarizes each group's per-ticket total durations.
pub fn summarize_by_group(per_ticket: &ResultsByTicket) -> BTreeMap<GroupId, GroupSummary> {
    let mut samples: BTreeMap<GroupId, (GroupIdentity, Vec<Duration>)> = BTreeMap::new();
    for groups in per_ticket.values() {
        for (group_id, result) in groups {
            samples
                .entry(*group_id)
                .or_insert_with(|| (result.group.clone(), Vec::new()))
                .1
                .push(result.total_duration);
        }
    }

    samples
        .into_iter()
        .filter_map(|(group_id, (group, durations))| {
            summarize(&durations).map(|stats| (group_id, GroupSummary { group, stats }))
        })
        .collect()
}
