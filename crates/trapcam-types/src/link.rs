use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityState {
    Disconnected,
    Connected,
}

impl ConnectivityState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectivityState::Connected)
    }
}
