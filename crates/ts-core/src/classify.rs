//! Classification of audit entries into group assignment events.
//!
//! GLPI records a group link as `"<display name> (<group id>)"` in the
//! entry's `new_value` (link) or `old_value` (unlink). Display names may
//! contain parentheses themselves, so the ID is always taken from the last
//! parenthesized segment.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::event::{ActionCode, GROUP_LINK_TYPE, LogEvent};
use crate::types::GroupId;

/// Display label used when a captured group name is empty.
pub const UNKNOWN_GROUP_NAME: &str = "Unknown";

/// A support group as captured from a log entry.
///
/// Equality and hashing only consider `id`; two identities with different
/// captured names are the same group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupIdentity {
    pub id: GroupId,
    pub name: String,
}

impl GroupIdentity {
    pub fn new(id: GroupId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Name to show for this group, falling back to [`UNKNOWN_GROUP_NAME`].
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            UNKNOWN_GROUP_NAME
        } else {
            &self.name
        }
    }
}

impl PartialEq for GroupIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for GroupIdentity {}

impl Hash for GroupIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// What a log entry means for group responsibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Assign(GroupIdentity),
    Unassign(GroupIdentity),
    Irrelevant,
}

/// Parses a `"<name> (<id>)"` token.
///
/// Returns `None` when there is no `(`...`)` pair in that order or the
/// enclosed text is not an integer.
pub fn parse_group_token(token: &str) -> Option<GroupIdentity> {
    let open = token.rfind('(')?;
    let close = token.rfind(')')?;
    if open >= close {
        return None;
    }
    let id = token[open + 1..close].trim().parse::<i64>().ok()?;
    let name = token[..open].trim();
    Some(GroupIdentity::new(GroupId::new(id), name))
}

/// Returns true if the entry is a group link/unlink action, whether or not
/// its value parses.
pub fn is_group_action(entry: &LogEvent) -> bool {
    entry.linked_entity_type == GROUP_LINK_TYPE
        && matches!(entry.action, ActionCode::Assign | ActionCode::Unassign)
}

/// Classifies a single log entry.
pub fn classify(entry: &LogEvent) -> EventKind {
    if entry.linked_entity_type != GROUP_LINK_TYPE {
        return EventKind::Irrelevant;
    }
    match entry.action {
        ActionCode::Assign => {
            parse_group_token(&entry.new_value).map_or(EventKind::Irrelevant, EventKind::Assign)
        }
        ActionCode::Unassign => {
            parse_group_token(&entry.old_value).map_or(EventKind::Irrelevant, EventKind::Unassign)
        }
        ActionCode::Other(_) => EventKind::Irrelevant,
    }
}
