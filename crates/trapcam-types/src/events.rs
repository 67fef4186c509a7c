use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{action::Action, http::EndpointKind};

/// Outcome kinds surfaced to operators through the event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEventKind {
    ActionReceived {
        action: Action,
    },
    PollFailed {
        reason: String,
    },
    CaptureFailed {
        reason: String,
    },
    EncodeFailed {
        reason: String,
    },
    UploadSucceeded {
        endpoint: EndpointKind,
        bytes: usize,
        status: u16,
    },
    UploadFailed {
        endpoint: EndpointKind,
        status: Option<u16>,
        reason: String,
    },
    StreamFinished {
        frames_attempted: u32,
        frames_delivered: u32,
    },
    LinkLost,
    LinkRestored,
}

/// Immutable event envelope for logging and the status side channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    #[serde(flatten)]
    pub kind: AgentEventKind,
}

impl AgentEvent {
    pub fn new(device_id: impl Into<String>, kind: AgentEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            device_id: device_id.into(),
            kind,
        }
    }
}
