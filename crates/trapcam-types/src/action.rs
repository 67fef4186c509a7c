use std::{fmt, num::NonZeroU32};

use serde::{Deserialize, Serialize};

/// Instruction decoded from one control poll. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    None,
    Photo,
    Stream { duration_secs: NonZeroU32 },
}

impl Action {
    pub fn stream(duration_secs: u32) -> Self {
        NonZeroU32::new(duration_secs)
            .map(|duration_secs| Action::Stream { duration_secs })
            .unwrap_or(Action::None)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Action::None)
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::None
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::None => f.write_str("none"),
            Action::Photo => f.write_str("photo"),
            Action::Stream { duration_secs } => write!(f, "stream({duration_secs}s)"),
        }
    }
}
