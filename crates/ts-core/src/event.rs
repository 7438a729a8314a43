//! Raw audit-log entries as fetched from the ticketing platform.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// Timestamp pattern used by GLPI's `date_mod` field (local time, no zone).
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `itemtype_link` value marking entries about ticket/group links.
pub const GROUP_LINK_TYPE: &str = "Group";

/// GLPI `linked_action` code for "group linked to item".
pub const ASSIGN_ACTION_CODE: i64 = 15;

/// GLPI `linked_action` code for "group unlinked from item".
pub const UNASSIGN_ACTION_CODE: i64 = 16;

/// The audited action of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ActionCode {
    Assign,
    Unassign,
    /// Any action not relevant to group responsibility.
    Other(i64),
}

impl ActionCode {
    /// Returns the numeric GLPI code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Assign => ASSIGN_ACTION_CODE,
            Self::Unassign => UNASSIGN_ACTION_CODE,
            Self::Other(code) => code,
        }
    }
}

impl From<i64> for ActionCode {
    fn from(code: i64) -> Self {
        match code {
            ASSIGN_ACTION_CODE => Self::Assign,
            UNASSIGN_ACTION_CODE => Self::Unassign,
            other => Self::Other(other),
        }
    }
}

impl From<ActionCode> for i64 {
    fn from(action: ActionCode) -> Self {
        action.code()
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One audit entry of a ticket's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// When the change happened, second precision.
    pub timestamp: NaiveDateTime,
    /// Relation type the entry is about (e.g. "Group").
    pub linked_entity_type: String,
    /// What happened to the relation.
    pub action: ActionCode,
    /// Populated on link actions, e.g. `"Support (1)"`.
    #[serde(default)]
    pub new_value: String,
    /// Populated on unlink actions.
    #[serde(default)]
    pub old_value: String,
}

/// Parses a `YYYY-MM-DD HH:MM:SS` log timestamp.
pub fn parse_log_timestamp(value: &str) -> Result<NaiveDateTime, ValidationError> {
    NaiveDateTime::parse_from_str(value.trim(), LOG_TIMESTAMP_FORMAT).map_err(|_| {
        ValidationError::InvalidTimestamp {
            value: value.to_string(),
        }
    })
}

/// Formats a timestamp in the log's own pattern.
pub fn format_log_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(LOG_TIMESTAMP_FORMAT).to_string()
}
