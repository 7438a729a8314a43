//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was not a valid identifier.
    #[error("invalid {field}: {value:?}")]
    InvalidId { field: &'static str, value: String },

    /// A log timestamp did not match `YYYY-MM-DD HH:MM:SS`.
    #[error("invalid log timestamp: {value:?}")]
    InvalidTimestamp { value: String },

    /// Invalid processed-ticket status value.
    #[error("invalid ticket status: {value}")]
    InvalidTicketStatus { value: String },
}

/// Outcome recorded for a ticket by the sync driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    /// Logs were fetched and the reconstruction was stored.
    Success,
    /// Fetching the ticket's logs failed.
    Error,
}

impl TicketStatus {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(Self::Success),
            "ERROR" => Ok(Self::Error),
            _ => Err(ValidationError::InvalidTicketStatus {
                value: s.to_string(),
            }),
        }
    }
}

/// Generates an integer ID newtype with common trait implementations.
macro_rules! define_numeric_id {
    (
        $(#[$meta:meta])*
        $name:ident, $inner:ty, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Wraps a raw identifier.
            pub const fn new(id: $inner) -> Self {
                Self(id)
            }

            /// Returns the raw identifier.
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<$inner>()
                    .map(Self)
                    .map_err(|_| ValidationError::InvalidId {
                        field: $field_name,
                        value: s.to_string(),
                    })
            }
        }
    };
}

define_numeric_id!(
    /// A GLPI group identifier.
    ///
    /// Group IDs are the stable key for a support group; display names may
    /// change between log entries but the ID does not.
    GroupId, i64, "group ID"
);

define_numeric_id!(
    /// A GLPI ticket identifier.
    TicketId, u64, "ticket ID"
);
