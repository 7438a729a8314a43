//! Report command: per-group duration statistics over stored results.
//!
//! Each section covers the tickets having at least one assignment that
//! starts inside its range, and lists per group the average and median of
//! per-ticket totals alongside aggregate totals.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use clap::Args;
use serde::Serialize;
use ts_core::{
    DurationStats, GroupId, GroupIdentity, ResultsByTicket, aggregate_par, format_log_timestamp,
    summarize_by_group,
};
use ts_db::{Database, PeriodFilter};

use crate::commands::util::{RangeEdge, format_duration, group_label, month_bounds, parse_datetime};

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Only tickets with an assignment starting at or after this time.
    #[arg(long, conflicts_with = "monthly")]
    pub since: Option<String>,

    /// Only tickets with an assignment starting at or before this time.
    #[arg(long, conflicts_with = "monthly")]
    pub until: Option<String>,

    /// One section per month of YEAR, then the whole year.
    #[arg(long, value_name = "YEAR")]
    pub monthly: Option<i32>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Statistics for one group within a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub group: GroupIdentity,
    /// Mean and median of the group's per-ticket totals.
    pub stats: DurationStats,
    pub total_duration: Duration,
    pub assignment_count: usize,
}

/// One range of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub filter: PeriodFilter,
    pub ticket_count: usize,
    pub rows: Vec<ReportRow>,
}

impl ReportSection {
    fn title(&self) -> String {
        match (self.filter.since, self.filter.until) {
            (Some(since), Some(until)) => format!(
                "Tickets with assignments between {} and {}",
                format_log_timestamp(since),
                format_log_timestamp(until)
            ),
            (Some(since), None) => format!(
                "Tickets with assignments since {}",
                format_log_timestamp(since)
            ),
            (None, Some(until)) => format!(
                "Tickets with assignments until {}",
                format_log_timestamp(until)
            ),
            (None, None) => "All stored tickets".to_string(),
        }
    }
}

/// Builds a section from stored per-ticket results. Rows are in group ID order.
pub fn build_section(filter: PeriodFilter, results: &ResultsByTicket) -> ReportSection {
    let summaries = summarize_by_group(results);
    let rows: Vec<ReportRow> = aggregate_par(results)
        .into_iter()
        .filter_map(|(group_id, totals)| {
            let summary = summaries.get(&group_id)?;
            Some(ReportRow {
                group: totals.group,
                stats: summary.stats,
                total_duration: totals.total_duration,
                assignment_count: totals.assignment_count,
            })
        })
        .collect();

    ReportSection {
        filter,
        ticket_count: results.len(),
        rows,
    }
}

fn load_section(db: &Database, filter: PeriodFilter) -> Result<ReportSection> {
    let results = db
        .load_ticket_results(&filter)
        .context("failed to load stored results")?;
    Ok(build_section(filter, &results))
}

/// Loads every section the arguments ask for.
pub fn generate_sections(
    db: &Database,
    args: &ReportArgs,
    now: NaiveDateTime,
) -> Result<Vec<ReportSection>> {
    if let Some(year) = args.monthly {
        let mut sections = Vec::with_capacity(13);
        for month in 1..=12 {
            let (since, until) = month_bounds(year, month)
                .with_context(|| format!("invalid year for monthly report: {year}"))?;
            sections.push(load_section(
                db,
                PeriodFilter {
                    since: Some(since),
                    until: Some(until),
                },
            )?);
        }
        let (year_start, _) = month_bounds(year, 1)
            .with_context(|| format!("invalid year for monthly report: {year}"))?;
        sections.push(load_section(
            db,
            PeriodFilter {
                since: Some(year_start),
                until: None,
            },
        )?);
        return Ok(sections);
    }

    let since = args
        .since
        .as_deref()
        .map(|value| parse_datetime(value, RangeEdge::Start, now))
        .transpose()?;
    let until = args
        .until
        .as_deref()
        .map(|value| parse_datetime(value, RangeEdge::End, now))
        .transpose()?;
    Ok(vec![load_section(db, PeriodFilter { since, until })?])
}

/// Formats the human-readable report.
pub fn format_report(sections: &[ReportSection]) -> Result<String, std::fmt::Error> {
    let mut output = String::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            writeln!(output)?;
        }
        writeln!(output, "{}", section.title())?;
        writeln!(output, "Tickets: {}", section.ticket_count)?;

        if section.rows.is_empty() {
            writeln!(output, "No stored assignments in this range.")?;
            continue;
        }

        let header = format!(
            "{:<30} | {:<15} | {:<15} | {:<5} | {:<15} | {}",
            "Group Name", "Average Time", "Median Time", "Count", "Total Time", "Assignments"
        );
        writeln!(output, "{header}")?;
        writeln!(output, "{}", "-".repeat(header.len()))?;
        for row in &section.rows {
            writeln!(
                output,
                "{:<30} | {:<15} | {:<15} | {:<5} | {:<15} | {}",
                group_label(&row.group),
                format_duration(row.stats.mean),
                format_duration(row.stats.median),
                row.stats.count,
                format_duration(row.total_duration),
                row.assignment_count
            )?;
        }
    }
    Ok(output)
}

#[derive(Debug, Serialize)]
struct JsonReport {
    sections: Vec<JsonSection>,
}

#[derive(Debug, Serialize)]
struct JsonSection {
    since: Option<String>,
    until: Option<String>,
    ticket_count: usize,
    groups: Vec<JsonGroup>,
}

#[derive(Debug, Serialize)]
struct JsonGroup {
    group_id: GroupId,
    group_name: String,
    average_seconds: i64,
    median_seconds: i64,
    ticket_count: usize,
    total_seconds: i64,
    assignment_count: usize,
}

/// Formats the report as JSON.
pub fn format_report_json(sections: &[ReportSection]) -> Result<String> {
    let report = JsonReport {
        sections: sections
            .iter()
            .map(|section| JsonSection {
                since: section.filter.since.map(format_log_timestamp),
                until: section.filter.until.map(format_log_timestamp),
                ticket_count: section.ticket_count,
                groups: section
                    .rows
                    .iter()
                    .map(|row| JsonGroup {
                        group_id: row.group.id,
                        group_name: row.group.name.clone(),
                        average_seconds: row.stats.mean.num_seconds(),
                        median_seconds: row.stats.median.num_seconds(),
                        ticket_count: row.stats.count,
                        total_seconds: row.total_duration.num_seconds(),
                        assignment_count: row.assignment_count,
                    })
                    .collect(),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Runs the report command.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    args: &ReportArgs,
    now: NaiveDateTime,
) -> Result<()> {
    let sections = generate_sections(db, args, now)?;
    if args.json {
        writeln!(writer, "{}", format_report_json(&sections)?)?;
    } else {
        write!(writer, "{}", format_report(&sections)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use ts_core::{ActionCode, LogEvent, TicketId, parse_log_timestamp, reconstruct};

    fn ts(value: &str) -> NaiveDateTime {
        parse_log_timestamp(value).unwrap()
    }

    fn pair(group: &str, from: &str, to: &str) -> [LogEvent; 2] {
        [
            LogEvent {
                timestamp: ts(from),
                linked_entity_type: "Group".to_string(),
                action: ActionCode::Assign,
                new_value: group.to_string(),
                old_value: String::new(),
            },
            LogEvent {
                timestamp: ts(to),
                linked_entity_type: "Group".to_string(),
                action: ActionCode::Unassign,
                new_value: String::new(),
                old_value: group.to_string(),
            },
        ]
    }

    fn store(db: &mut Database, ticket: u64, events: &[LogEvent]) {
        let ticket_id = TicketId::new(ticket);
        let now = ts("2025-12-31 00:00:00");
        db.record_ticket_result(ticket_id, &reconstruct(ticket_id, events, now), now)
            .unwrap();
    }

    fn sample_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        let mut first = Vec::new();
        first.extend(pair("Support (1)", "2025-01-10 09:00:00", "2025-01-10 11:00:00"));
        first.extend(pair("Network (2)", "2025-01-10 11:00:00", "2025-01-10 11:45:00"));
        first.extend(pair("Support (1)", "2025-01-11 09:00:00", "2025-01-11 10:00:00"));
        store(&mut db, 1, &first);
        store(
            &mut db,
            2,
            &pair("Support (1)", "2025-02-03 08:00:00", "2025-02-03 09:00:00"),
        );
        store(
            &mut db,
            3,
            &pair("Support (1)", "2025-02-04 08:00:00", "2025-02-04 14:00:00"),
        );
        db
    }

    fn args() -> ReportArgs {
        ReportArgs {
            since: None,
            until: None,
            monthly: None,
            json: false,
        }
    }

    #[test]
    fn report_over_all_tickets() {
        let db = sample_db();
        let sections = generate_sections(&db, &args(), ts("2025-12-31 00:00:00")).unwrap();
        let output = format_report(&sections).unwrap();
        assert_snapshot!(output, @r"
        All stored tickets
        Tickets: 3
        Group Name                     | Average Time    | Median Time     | Count | Total Time      | Assignments
        ----------------------------------------------------------------------------------------------------------
        Support (1)                    | 3h 20m          | 3h 0m           | 3     | 10h 0m          | 4
        Network (2)                    | 0h 45m          | 0h 45m          | 1     | 0h 45m          | 1
        ");
    }

    #[test]
    fn report_since_date_keeps_matching_tickets() {
        let db = sample_db();
        let report_args = ReportArgs {
            since: Some("2025-02-04".to_string()),
            ..args()
        };
        let sections = generate_sections(&db, &report_args, ts("2025-12-31 00:00:00")).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].ticket_count, 1);
        assert_eq!(
            sections[0].filter.since,
            Some(ts("2025-02-04 00:00:00"))
        );
        assert_eq!(sections[0].rows[0].total_duration, Duration::hours(6));
    }

    #[test]
    fn monthly_report_has_a_section_per_month_plus_year() {
        let db = sample_db();
        let report_args = ReportArgs {
            monthly: Some(2025),
            ..args()
        };
        let sections = generate_sections(&db, &report_args, ts("2025-12-31 00:00:00")).unwrap();
        assert_eq!(sections.len(), 13);
        assert_eq!(sections[0].ticket_count, 1);
        assert_eq!(sections[1].ticket_count, 2);
        assert!(sections[2].rows.is_empty());
        assert_eq!(sections[12].ticket_count, 3);

        let output = format_report(&sections[2..3]).unwrap();
        assert_snapshot!(output, @r"
        Tickets with assignments between 2025-03-01 00:00:00 and 2025-03-31 23:59:59
        Tickets: 0
        No stored assignments in this range.
        ");
    }

    #[test]
    fn json_report_uses_seconds() {
        let db = sample_db();
        let sections = generate_sections(&db, &args(), ts("2025-12-31 00:00:00")).unwrap();
        let json = format_report_json(&sections).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let support = &value["sections"][0]["groups"][0];
        assert_eq!(support["group_name"], "Support");
        assert_eq!(support["average_seconds"], 12_000);
        assert_eq!(support["median_seconds"], 10_800);
        assert_eq!(support["ticket_count"], 3);
        assert_eq!(support["total_seconds"], 36_000);
        assert_eq!(support["assignment_count"], 4);
        assert!(value["sections"][0]["since"].is_null());
    }

    #[test]
    fn rows_follow_group_id_order() {
        let mut db = Database::open_in_memory().unwrap();
        let mut events = Vec::new();
        events.extend(pair("Zulu (1)", "2025-01-10 09:00:00", "2025-01-10 10:00:00"));
        events.extend(pair("Alpha (2)", "2025-01-10 10:00:00", "2025-01-10 11:00:00"));
        store(&mut db, 1, &events);

        let sections = generate_sections(&db, &args(), ts("2025-12-31 00:00:00")).unwrap();
        let ids: Vec<i64> = sections[0].rows.iter().map(|row| row.group.id.get()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn invalid_since_is_rejected() {
        let db = sample_db();
        let report_args = ReportArgs {
            since: Some("last tuesday".to_string()),
            ..args()
        };
        assert!(generate_sections(&db, &report_args, ts("2025-12-31 00:00:00")).is_err());
    }
}
