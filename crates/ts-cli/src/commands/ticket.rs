//! Ticket command: live assignment history of a single ticket.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use ts_core::{
    Clock, GroupId, GroupTicketResult, Reconstruction, SystemClock, TicketId,
    format_log_timestamp, reconstruct_detailed,
};
use ts_glpi::{Client, GroupLinkType, TicketGroupLink};

use crate::Config;
use crate::commands::util::{format_duration, group_label};

#[derive(Debug, Args)]
pub struct TicketArgs {
    /// Ticket ID to inspect.
    pub id: u64,

    /// Only show this group, and whether it is currently linked.
    #[arg(long)]
    pub group: Option<i64>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Whether a group is linked to the ticket right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub group_id: GroupId,
    pub link_types: Vec<GroupLinkType>,
}

impl LinkStatus {
    fn from_links(group_id: GroupId, links: &[TicketGroupLink]) -> Self {
        Self {
            group_id,
            link_types: links
                .iter()
                .filter(|link| link.group_id == group_id)
                .map(|link| link.link_type)
                .collect(),
        }
    }
}

pub fn run<W: Write>(writer: &mut W, args: &TicketArgs, config: &Config) -> Result<()> {
    let ticket_id = TicketId::new(args.id);
    let group_filter = args.group.map(GroupId::new);
    let client = Client::new(config.glpi.clone()).context("failed to create GLPI client")?;
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;

    let session = runtime
        .block_on(client.init_session())
        .context("failed to open GLPI session")?;
    let fetched = runtime.block_on(async {
        let events = client.fetch_ticket_log(&session, ticket_id).await?;
        let links = match group_filter {
            Some(_) => Some(client.fetch_ticket_groups(&session, ticket_id).await?),
            None => None,
        };
        Ok::<_, ts_glpi::GlpiError>((events, links))
    });
    if let Err(err) = runtime.block_on(client.kill_session(&session)) {
        tracing::warn!(%err, "failed to close GLPI session");
    }
    let (events, links) = fetched.with_context(|| format!("failed to fetch ticket {ticket_id}"))?;

    let reconstruction = reconstruct_detailed(ticket_id, &events, SystemClock.now());
    let link_status = group_filter
        .zip(links.as_deref())
        .map(|(group_id, links)| LinkStatus::from_links(group_id, links));

    if args.json {
        let output = format_ticket_json(&reconstruction, group_filter, link_status.as_ref())?;
        writeln!(writer, "{output}")?;
    } else {
        let output = format_ticket(&reconstruction, group_filter, link_status.as_ref())?;
        write!(writer, "{output}")?;
    }
    Ok(())
}

fn selected_groups(
    reconstruction: &Reconstruction,
    group_filter: Option<GroupId>,
) -> Vec<&GroupTicketResult> {
    reconstruction
        .groups
        .iter()
        .filter(|(group_id, _)| group_filter.is_none_or(|wanted| **group_id == wanted))
        .map(|(_, result)| result)
        .collect()
}

/// Formats the human-readable assignment history.
pub fn format_ticket(
    reconstruction: &Reconstruction,
    group_filter: Option<GroupId>,
    link_status: Option<&LinkStatus>,
) -> Result<String, std::fmt::Error> {
    let mut output = String::new();
    writeln!(output, "ASSIGNMENT HISTORY: ticket {}", reconstruction.ticket_id)?;

    let groups = selected_groups(reconstruction, group_filter);
    if groups.is_empty() {
        writeln!(output)?;
        match group_filter {
            Some(group_id) => writeln!(output, "No assignments found for group {group_id}.")?,
            None => writeln!(output, "No group assignments found.")?,
        }
    }

    for result in groups {
        writeln!(output)?;
        writeln!(output, "{}", group_label(&result.group))?;
        for interval in &result.intervals {
            let end = if interval.still_open {
                "still assigned".to_string()
            } else {
                format_log_timestamp(interval.end)
            };
            writeln!(
                output,
                "  {} -> {:<19}  {}",
                format_log_timestamp(interval.start),
                end,
                format_duration(interval.duration)
            )?;
        }
        writeln!(output, "  Total: {}", format_duration(result.total_duration))?;
    }

    if let Some(status) = link_status {
        writeln!(output)?;
        if status.link_types.is_empty() {
            writeln!(output, "Group {} is NOT currently linked.", status.group_id)?;
        } else {
            let types = status
                .link_types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                output,
                "Group {} is CURRENTLY linked as {types}.",
                status.group_id
            )?;
        }
    }

    let anomalies = reconstruction.anomalies;
    if anomalies.total() > 0 {
        writeln!(output)?;
        writeln!(
            output,
            "Ignored {} log entr{}.",
            anomalies.total(),
            if anomalies.total() == 1 { "y" } else { "ies" }
        )?;
    }

    Ok(output)
}

#[derive(Debug, Serialize)]
struct JsonTicket<'a> {
    ticket_id: TicketId,
    groups: Vec<JsonGroup<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_status: Option<&'a LinkStatus>,
    ignored_entries: usize,
}

#[derive(Debug, Serialize)]
struct JsonGroup<'a> {
    group_id: GroupId,
    group_name: &'a str,
    total_seconds: i64,
    intervals: Vec<JsonInterval>,
}

#[derive(Debug, Serialize)]
struct JsonInterval {
    start: String,
    end: String,
    duration_seconds: i64,
    still_open: bool,
}

/// Formats the assignment history as JSON.
pub fn format_ticket_json(
    reconstruction: &Reconstruction,
    group_filter: Option<GroupId>,
    link_status: Option<&LinkStatus>,
) -> Result<String> {
    let groups = selected_groups(reconstruction, group_filter)
        .into_iter()
        .map(|result| JsonGroup {
            group_id: result.group.id,
            group_name: &result.group.name,
            total_seconds: result.total_secs(),
            intervals: result
                .intervals
                .iter()
                .map(|interval| JsonInterval {
                    start: format_log_timestamp(interval.start),
                    end: format_log_timestamp(interval.end),
                    duration_seconds: interval.duration_secs(),
                    still_open: interval.still_open,
                })
                .collect(),
        })
        .collect();

    let report = JsonTicket {
        ticket_id: reconstruction.ticket_id,
        groups,
        link_status,
        ignored_entries: reconstruction.anomalies.total(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDateTime;
    use insta::assert_snapshot;
    use ts_core::{ActionCode, LogEvent, parse_log_timestamp};

    fn ts(value: &str) -> NaiveDateTime {
        parse_log_timestamp(value).unwrap()
    }

    fn group_event(at: &str, action: ActionCode, token: &str) -> LogEvent {
        let (new_value, old_value) = if action == ActionCode::Unassign {
            (String::new(), token.to_string())
        } else {
            (token.to_string(), String::new())
        };
        LogEvent {
            timestamp: ts(at),
            linked_entity_type: "Group".to_string(),
            action,
            new_value,
            old_value,
        }
    }

    fn sample() -> Reconstruction {
        let events = vec![
            group_event("2025-01-01 09:00:00", ActionCode::Assign, "Support (1)"),
            group_event("2025-01-01 17:00:00", ActionCode::Unassign, "Support (1)"),
            group_event("2025-01-02 08:00:00", ActionCode::Assign, "Support (1)"),
            group_event("2025-01-01 12:00:00", ActionCode::Assign, "Network (2)"),
            group_event("2025-01-01 12:30:00", ActionCode::Unassign, "Network (2)"),
            group_event("2025-01-01 13:00:00", ActionCode::Unassign, "Network (2)"),
        ];
        reconstruct_detailed(TicketId::new(3), &events, ts("2025-01-02 09:30:00"))
    }

    #[test]
    fn format_ticket_lists_every_group() {
        let output = format_ticket(&sample(), None, None).unwrap();
        assert_snapshot!(output, @r"
        ASSIGNMENT HISTORY: ticket 3

        Support (1)
          2025-01-01 09:00:00 -> 2025-01-01 17:00:00  8h 0m
          2025-01-02 08:00:00 -> still assigned       1h 30m
          Total: 9h 30m

        Network (2)
          2025-01-01 12:00:00 -> 2025-01-01 12:30:00  0h 30m
          Total: 0h 30m

        Ignored 1 log entry.
        ");
    }

    #[test]
    fn format_ticket_filters_group_and_shows_link() {
        let links = [
            TicketGroupLink {
                group_id: GroupId::new(2),
                link_type: GroupLinkType::Observer,
            },
            TicketGroupLink {
                group_id: GroupId::new(1),
                link_type: GroupLinkType::Assigned,
            },
        ];
        let status = LinkStatus::from_links(GroupId::new(2), &links);
        let output = format_ticket(&sample(), Some(GroupId::new(2)), Some(&status)).unwrap();
        assert_snapshot!(output, @r"
        ASSIGNMENT HISTORY: ticket 3

        Network (2)
          2025-01-01 12:00:00 -> 2025-01-01 12:30:00  0h 30m
          Total: 0h 30m

        Group 2 is CURRENTLY linked as observer.

        Ignored 1 log entry.
        ");
    }

    #[test]
    fn format_ticket_reports_unlinked_group_without_history() {
        let status = LinkStatus::from_links(GroupId::new(9), &[]);
        let output = format_ticket(&sample(), Some(GroupId::new(9)), Some(&status)).unwrap();
        assert!(output.contains("No assignments found for group 9."));
        assert!(output.contains("Group 9 is NOT currently linked."));
    }

    #[test]
    fn format_ticket_json_includes_intervals() {
        let json = format_ticket_json(&sample(), Some(GroupId::new(1)), None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ticket_id"], 3);
        assert_eq!(value["groups"].as_array().unwrap().len(), 1);
        assert_eq!(value["groups"][0]["group_name"], "Support");
        assert_eq!(value["groups"][0]["total_seconds"], 9 * 3600 + 1800);
        assert_eq!(value["groups"][0]["intervals"][1]["still_open"], true);
        assert_eq!(value["groups"][0]["intervals"][1]["end"], "2025-01-02 09:30:00");
        assert!(value.get("link_status").is_none());
    }
}
