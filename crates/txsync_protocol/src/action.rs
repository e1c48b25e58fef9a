//! Transaction actions.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The mutation a transaction row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// First save of an entity.
    Insert,
    /// Later save of an entity.
    Update,
    /// Removal of an entity.
    Delete,
}

impl Action {
    /// One-letter wire code.
    pub const fn to_code(self) -> &'static str {
        match self {
            Action::Insert => "I",
            Action::Update => "U",
            Action::Delete => "D",
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: &str) -> ProtocolResult<Self> {
        match code {
            "I" => Ok(Action::Insert),
            "U" => Ok(Action::Update),
            "D" => Ok(Action::Delete),
            other => Err(ProtocolError::InvalidAction {
                code: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_code())
    }
}
