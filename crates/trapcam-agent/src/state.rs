use tracing::debug;
use trapcam_ops::{EventFeed, StatusBoard, UsageLedger};
use trapcam_types::{
    events::{AgentEvent, AgentEventKind},
    link::ConnectivityState,
    telemetry::{AgentCounters, UsageCategory},
};

use crate::timers::Timers;

/// Everything the agent loop mutates, owned by the loop and lent to each component.
pub struct AgentState {
    pub timers: Timers,
    pub connectivity: ConnectivityState,
    pub usage: UsageLedger,
    pub poll_count: u64,
    status: StatusBoard,
    feed: EventFeed,
    device_id: String,
}

impl AgentState {
    pub fn new(device_id: String, timers: Timers, usage: UsageLedger, feed: EventFeed) -> Self {
        Self {
            timers,
            connectivity: ConnectivityState::Disconnected,
            usage,
            poll_count: 0,
            status: StatusBoard::new(),
            feed,
            device_id,
        }
    }

    pub fn emit(&mut self, kind: AgentEventKind) {
        let event = AgentEvent::new(self.device_id.as_str(), kind);
        debug!(kind = ?event.kind, "agent event");
        self.status.apply(&event);
        self.feed.publish(event);
    }

    pub fn record_poll(&mut self) -> u64 {
        self.poll_count += 1;
        self.status.record_poll();
        self.poll_count
    }

    pub fn record_usage(&mut self, category: UsageCategory, bytes: usize) {
        self.usage.add(category, bytes);
    }

    pub fn counters(&self) -> AgentCounters {
        self.status.snapshot()
    }
}
