use futures::{stream::BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use trapcam_types::{
    events::{AgentEvent, AgentEventKind},
    http::EndpointKind,
    telemetry::AgentCounters,
};

/// In-process broadcast of agent events for any interested subscriber.
#[derive(Clone)]
pub struct EventFeed {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishing never fails; events without subscribers are dropped.
    pub fn publish(&self, event: AgentEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> BoxStream<'static, AgentEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

/// Counters folded from the events the agent emits.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    counters: AgentCounters,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_poll(&mut self) {
        self.counters.polls += 1;
    }

    pub fn apply(&mut self, event: &AgentEvent) {
        let counters = &mut self.counters;
        match &event.kind {
            AgentEventKind::ActionReceived { .. } => {}
            AgentEventKind::PollFailed { .. } => counters.poll_failures += 1,
            AgentEventKind::CaptureFailed { .. } => counters.capture_failures += 1,
            AgentEventKind::EncodeFailed { .. } => counters.encode_failures += 1,
            AgentEventKind::UploadSucceeded { endpoint, .. } => match endpoint {
                EndpointKind::Photo => counters.photos_uploaded += 1,
                EndpointKind::LiveFrame => counters.frames_uploaded += 1,
            },
            AgentEventKind::UploadFailed { .. } => counters.upload_failures += 1,
            AgentEventKind::StreamFinished { .. } => counters.streams_completed += 1,
            AgentEventKind::LinkLost => counters.link_losses += 1,
            AgentEventKind::LinkRestored => {}
        }
    }

    pub fn snapshot(&self) -> AgentCounters {
        self.counters.clone()
    }
}
