//! Control poll: ask the backend what to do next.

use serde_json::Value;
use tracing::{debug, info, warn};
use trapcam_network::Transport;
use trapcam_types::{action::Action, config::NetworkConfig};

/// Longest stream whose deadline stays less than 2^31 ms ahead, the range in
/// which the wrapping deadline comparison holds (about 24.8 days).
pub const MAX_STREAM_SECS: u32 = i32::MAX as u32 / 1_000;

/// Result of one control poll. Failures are reported, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub action: Action,
    /// Body bytes of a 200 response; rejected responses count nothing.
    pub bytes_received: usize,
    pub failure: Option<String>,
}

impl PollOutcome {
    fn failed(reason: String, bytes_received: usize) -> Self {
        Self {
            action: Action::None,
            bytes_received,
            failure: Some(reason),
        }
    }
}

pub struct ControlPoller {
    url: String,
    auth_token: Option<String>,
}

impl ControlPoller {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            url: config.control_url(),
            auth_token: config.auth_token().map(str::to_string),
        }
    }

    /// Issue one GET and decode it. Every failure degrades to `Action::None`.
    pub async fn poll<T: Transport + ?Sized>(&self, transport: &T) -> PollOutcome {
        debug!("Polling {}", self.url);
        let response = match transport.get(&self.url, self.auth_token.as_deref()).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Control poll failed: {err}");
                return PollOutcome::failed(err.to_string(), 0);
            }
        };

        if response.status != 200 {
            warn!("Control poll answered HTTP {}", response.status);
            return PollOutcome::failed(format!("HTTP {}", response.status), 0);
        }
        let bytes_received = response.body.len();

        match parse_control_body(&response.body) {
            Ok(action) => {
                if !action.is_none() {
                    info!("Action received: {action}");
                }
                PollOutcome {
                    action,
                    bytes_received,
                    failure: None,
                }
            }
            Err(reason) => {
                warn!("Unusable control response: {reason}");
                PollOutcome::failed(reason, bytes_received)
            }
        }
    }
}

/// Decode a control response. Anything but a well-formed 200 is `Action::None`.
pub fn decode_action(status: u16, body: &[u8]) -> Action {
    if status != 200 {
        return Action::None;
    }
    parse_control_body(body).unwrap_or(Action::None)
}

fn parse_control_body(body: &[u8]) -> Result<Action, String> {
    let document: Value =
        serde_json::from_slice(body).map_err(|err| format!("malformed JSON: {err}"))?;
    let Value::Object(fields) = document else {
        return Err("control response is not a JSON object".into());
    };

    let action = fields.get("action").and_then(Value::as_str).unwrap_or("none");
    let duration = fields
        .get("streamDurationSeconds")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    Ok(match action {
        "photo" => Action::Photo,
        "stream" if duration > 0 => {
            let secs = duration.min(MAX_STREAM_SECS as i64) as u32;
            if secs as i64 != duration {
                warn!("Stream duration {duration}s capped at {MAX_STREAM_SECS}s");
            }
            Action::stream(secs)
        }
        "stream" => {
            debug!("Ignoring stream request with duration {duration}");
            Action::None
        }
        _ => Action::None,
    })
}
