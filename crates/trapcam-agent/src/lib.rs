//! Agent loop coordinating connectivity, control polling, and action execution.

pub mod executor;
pub mod poller;
pub mod state;
pub mod timers;

pub use executor::{ActionExecutor, ActionReport, ExecutorState};
pub use poller::{decode_action, ControlPoller, PollOutcome};
pub use state::AgentState;
pub use timers::{Clock, MonotonicClock};

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};
use trapcam_camera::ImageSource;
use trapcam_network::{Link, Transport};
use trapcam_ops::{EnergySampler, EventFeed, UsageLedger};
use trapcam_types::{
    action::Action,
    config::TrapcamConfig,
    events::AgentEventKind,
    http::UploadRequest,
    link::ConnectivityState,
    telemetry::{AgentCounters, UsageCategory},
    Result, TrapcamError,
};

use crate::timers::Timers;

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Offline; a reconnection attempt was made (or is not due yet).
    Offline { attempted_reconnect: bool },
    /// Online but the poll timer has not elapsed.
    Waiting,
    /// A poll ran and its action (possibly `None`) was executed.
    Polled(Action),
}

pub struct Agent<S, T, L>
where
    S: ImageSource,
    T: Transport,
    L: Link,
{
    config: TrapcamConfig,
    source: S,
    transport: T,
    link: L,
    clock: Box<dyn Clock>,
    poller: ControlPoller,
    executor: ActionExecutor,
    energy: EnergySampler,
    state: AgentState,
}

impl<S, T, L> Agent<S, T, L>
where
    S: ImageSource,
    T: Transport,
    L: Link,
{
    pub fn new(
        config: TrapcamConfig,
        source: S,
        transport: T,
        link: L,
        clock: Box<dyn Clock>,
        feed: EventFeed,
    ) -> Self {
        let timers = Timers::new(
            clock.now_ms(),
            config.timing.poll_interval_ms,
            config.timing.frame_delay_ms,
            config.link.reconnect_check_interval_ms.min(u32::MAX as u64) as u32,
        );
        let usage = UsageLedger::new(config.ops.usage_enabled, config.ops.usage_flush_every_polls);
        let mut state = AgentState::new(config.network.device_id.clone(), timers, usage, feed);
        state.connectivity = link.status();
        Self {
            poller: ControlPoller::new(&config.network),
            executor: ActionExecutor::new(&config),
            energy: EnergySampler::new(&config.ops),
            config,
            source,
            transport,
            link,
            clock,
            state,
        }
    }

    /// Bring up the image source. Its failure is the only fatal condition.
    pub async fn boot(&mut self) -> Result<()> {
        self.source.init().await.map_err(|err| {
            TrapcamError::Agent(format!("image source failed to initialise: {err}"))
        })?;
        if let Err(err) = self.source.apply_preset(self.config.camera.capture).await {
            warn!("Could not apply capture preset at boot: {err}");
        }
        self.log_summary();
        Ok(())
    }

    fn log_summary(&self) {
        let config = &self.config;
        info!("Device id: {}", config.network.device_id);
        info!("Backend: {}", config.network.base_url);
        info!(
            "Capture preset: {} q{}; stream preset: {} q{}",
            config.camera.capture.resolution(),
            config.camera.capture.quality,
            config.camera.stream.resolution(),
            config.camera.stream.quality
        );
        info!(
            "Poll every {} ms, frame delay {} ms, HTTP timeout {} ms, auth {}",
            config.timing.poll_interval_ms,
            config.timing.frame_delay_ms,
            config.network.http_timeout_ms,
            if config.network.auth_token().is_some() {
                "enabled"
            } else {
                "disabled"
            }
        );
    }

    /// Run one loop iteration without the trailing yield.
    pub async fn tick(&mut self) -> Tick {
        let live = self.link.status();
        if live != self.state.connectivity {
            match live {
                ConnectivityState::Connected => self.state.emit(AgentEventKind::LinkRestored),
                ConnectivityState::Disconnected => {
                    warn!("Backend link lost");
                    self.state.emit(AgentEventKind::LinkLost)
                }
            }
            self.state.connectivity = live;
        }

        if !live.is_connected() {
            return Tick::Offline {
                attempted_reconnect: self.try_reconnect().await,
            };
        }

        let now = self.clock.now_ms();
        if !self.state.timers.poll.is_due(now) {
            return Tick::Waiting;
        }
        self.state.timers.poll.fire(now);

        let outcome = self.poller.poll(&self.transport).await;
        let poll_count = self.state.record_poll();
        self.state
            .record_usage(UsageCategory::System, outcome.bytes_received);
        if let Some(reason) = outcome.failure {
            self.state.emit(AgentEventKind::PollFailed { reason });
        }

        let action = outcome.action;
        if !action.is_none() {
            self.state.emit(AgentEventKind::ActionReceived { action });
            self.executor
                .execute(
                    action,
                    &mut self.source,
                    &self.transport,
                    self.clock.as_ref(),
                    &mut self.state,
                )
                .await;
        }

        if self.energy.due(poll_count) {
            self.send_energy_sample().await;
        }
        if self.state.usage.flush_due(poll_count) {
            self.flush_usage().await;
        }
        Tick::Polled(action)
    }

    async fn try_reconnect(&mut self) -> bool {
        let now = self.clock.now_ms();
        if !self.state.timers.reconnect_check.is_due(now) {
            return false;
        }
        self.state.timers.reconnect_check.fire(now);

        info!("Backend unreachable, reconnecting");
        match self.link.reconnect().await {
            Ok(()) => {
                info!("Backend link restored");
                self.state.connectivity = ConnectivityState::Connected;
                self.state.emit(AgentEventKind::LinkRestored);
            }
            Err(err) => warn!("Reconnect attempt failed: {err}"),
        }
        // Re-arm from the end of the attempt so a long blocking try is not retried at once.
        let finished = self.clock.now_ms();
        self.state.timers.reconnect_check.fire(finished);
        true
    }

    fn json_request(&self, target: String, body: Vec<u8>) -> UploadRequest {
        UploadRequest {
            target,
            body,
            content_type: "application/json".into(),
            auth_token: self.config.network.auth_token().map(str::to_string),
        }
    }

    async fn send_energy_sample(&mut self) {
        let Some(sample) = self.energy.sample().await else {
            return;
        };
        let body = match serde_json::to_vec(&sample) {
            Ok(body) => body,
            Err(err) => {
                warn!("Could not serialise energy sample: {err}");
                return;
            }
        };
        debug!(
            "Sending energy sample: {:.2} W, CPU {:.1} C",
            sample.watts, sample.cpu_temp
        );
        let sent = body.len();
        let request = self.json_request(self.config.network.energy_url(), body);
        match self.transport.post(request).await {
            Ok(response) if response.is_success() => self
                .state
                .record_usage(UsageCategory::System, sent + response.body.len()),
            Ok(response) => warn!("Energy sample answered HTTP {}", response.status),
            Err(err) => warn!("Energy sample failed: {err}"),
        }
    }

    async fn flush_usage(&mut self) {
        let url = self.config.network.data_usage_url();
        for report in self.state.usage.pending() {
            let body = match serde_json::to_vec(&report) {
                Ok(body) => body,
                Err(err) => {
                    warn!("Could not serialise usage report: {err}");
                    continue;
                }
            };
            debug!("Reporting {} bytes of {} traffic", report.bytes, report.category);
            let request = self.json_request(url.clone(), body);
            match self.transport.post(request).await {
                Ok(response) if response.is_success() => self.state.usage.acknowledge(&report),
                Ok(response) => warn!("Usage report answered HTTP {}", response.status),
                Err(err) => warn!("Usage report failed: {err}"),
            }
        }
    }

    /// Run forever: the process has no caller to return to.
    pub async fn run(&mut self) {
        let yield_for = Duration::from_millis(self.config.timing.loop_yield_ms);
        info!("Agent running");
        loop {
            self.tick().await;
            sleep(yield_for).await;
        }
    }

    pub fn status(&self) -> AgentCounters {
        self.state.counters()
    }

    pub fn executor_state(&self) -> ExecutorState {
        self.executor.state()
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.state.connectivity
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use trapcam_types::{
        config::{
            CameraBackend, CameraConfig, LinkConfig, NetworkConfig, OpsConfig, TimingConfig,
            TrapcamConfig,
        },
        image::CapturePreset,
    };

    pub fn test_config() -> TrapcamConfig {
        TrapcamConfig {
            network: NetworkConfig {
                base_url: "http://10.0.0.2:3001".into(),
                device_id: "cam-01".into(),
                api_token: Some("secret".into()),
                http_timeout_ms: 5_000,
                max_upload_bytes: None,
            },
            link: LinkConfig::default(),
            camera: CameraConfig {
                backend: CameraBackend::Synthetic,
                device: "/dev/video0".into(),
                snapshot_path: "/tmp/trapcam-test.jpg".into(),
                capture: CapturePreset::capture(),
                stream: CapturePreset::stream(),
            },
            timing: TimingConfig::default(),
            ops: OpsConfig {
                energy_sample_every_polls: 0,
                ..OpsConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_config;
    use futures::StreamExt;
    use std::sync::atomic::Ordering;
    use tokio::time::{advance, Instant};
    use trapcam_camera::MockImageSource;
    use trapcam_network::{LinkState, MockReply, RecordedMethod, RecordingTransport, ScriptedLink};

    type TestAgent = Agent<MockImageSource, RecordingTransport, ScriptedLink>;

    fn online_agent(source: MockImageSource, transport: RecordingTransport) -> TestAgent {
        Agent::new(
            test_config(),
            source,
            transport,
            ScriptedLink::new(LinkState::new(true)),
            Box::new(MonotonicClock::new()),
            EventFeed::new(64),
        )
    }

    async fn advance_ms(ms: u64) {
        advance(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn photo_scenario_end_to_end() {
        let source = MockImageSource::new(vec![0xff, 0xd8, 0xff, 0xd9]);
        let camera = source.log_handle();
        let transport = RecordingTransport::new();
        transport.queue_get(MockReply::json(200, r#"{"action":"photo"}"#));
        transport.queue_post(MockReply::status(500));
        let mut agent = online_agent(source, transport.clone());
        agent.boot().await.unwrap();

        assert_eq!(agent.tick().await, Tick::Waiting);
        advance_ms(1_000).await;
        assert_eq!(agent.tick().await, Tick::Polled(Action::Photo));

        let config = test_config();
        let posts = transport.requests_to(&config.network.photo_url());
        assert_eq!(posts.len(), 1);
        let camera = camera.lock().unwrap();
        assert_eq!(camera.captures, 1);
        assert_eq!(camera.releases, 1);
        assert_eq!(agent.executor_state(), ExecutorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_scenario_restores_capture_preset() {
        let source = MockImageSource::new(vec![1; 64]);
        let camera = source.log_handle();
        let transport = RecordingTransport::new();
        transport.queue_get(MockReply::json(
            200,
            r#"{"action":"stream","streamDurationSeconds":5}"#,
        ));
        let mut agent = online_agent(source, transport.clone());
        agent.boot().await.unwrap();

        advance_ms(1_000).await;
        let started = Instant::now();
        assert_eq!(agent.tick().await, Tick::Polled(Action::stream(5)));
        assert!(started.elapsed() >= Duration::from_millis(5_000));

        let config = test_config();
        let frames = transport.requests_to(&config.network.live_frame_url()).len();
        assert!(frames.abs_diff(50) <= 1, "frames {frames}");
        let camera = camera.lock().unwrap();
        assert_eq!(camera.presets.last(), Some(&config.camera.capture));
        assert_eq!(
            camera.presets,
            vec![config.camera.capture, config.camera.stream, config.camera.capture]
        );
        assert_eq!(agent.status().frames_uploaded as usize, frames);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_timeout_waits_a_full_interval() {
        let source = MockImageSource::new(vec![1]);
        let camera = source.log_handle();
        let transport = RecordingTransport::new();
        transport.queue_get(MockReply::timeout());
        let mut agent = online_agent(source, transport.clone());

        advance_ms(1_000).await;
        assert_eq!(agent.tick().await, Tick::Polled(Action::None));
        assert_eq!(agent.tick().await, Tick::Waiting);
        advance_ms(999).await;
        assert_eq!(agent.tick().await, Tick::Waiting);
        assert_eq!(transport.requests().len(), 1);

        advance_ms(1).await;
        assert_eq!(agent.tick().await, Tick::Polled(Action::None));
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(camera.lock().unwrap().captures, 0);
        let status = agent.status();
        assert_eq!(status.polls, 2);
        assert_eq!(status.poll_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_polling_while_disconnected() {
        let link_state = LinkState::new(false);
        let link = ScriptedLink::new(link_state.clone()).with_outcomes([false, false, true]);
        let attempts = link.attempts_handle();
        let transport = RecordingTransport::new();
        let mut agent = Agent::new(
            test_config(),
            MockImageSource::new(vec![1]),
            transport.clone(),
            link,
            Box::new(MonotonicClock::new()),
            EventFeed::new(16),
        );

        advance_ms(5_000).await;
        assert_eq!(
            agent.tick().await,
            Tick::Offline {
                attempted_reconnect: true
            }
        );
        assert_eq!(
            agent.tick().await,
            Tick::Offline {
                attempted_reconnect: false
            }
        );
        advance_ms(1_000).await;
        agent.tick().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(transport.requests().is_empty());

        advance_ms(1_000).await;
        assert_eq!(
            agent.tick().await,
            Tick::Offline {
                attempted_reconnect: true
            }
        );
        assert_eq!(agent.connectivity(), ConnectivityState::Connected);
        assert!(transport.requests().is_empty());

        assert_eq!(agent.tick().await, Tick::Polled(Action::None));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_is_reported_once() {
        let link_state = LinkState::new(true);
        let feed = EventFeed::new(16);
        let mut events = feed.subscribe();
        let mut agent = Agent::new(
            test_config(),
            MockImageSource::new(vec![1]),
            RecordingTransport::new(),
            ScriptedLink::new(link_state.clone()).with_outcomes([false]),
            Box::new(MonotonicClock::new()),
            feed,
        );

        agent.tick().await;
        link_state.mark_down();
        agent.tick().await;
        agent.tick().await;
        assert_eq!(agent.status().link_losses, 1);

        let first = events.next().await.unwrap();
        assert_eq!(first.kind, AgentEventKind::LinkLost);
    }

    #[tokio::test(start_paused = true)]
    async fn starting_online_reports_no_restore() {
        let feed = EventFeed::new(16);
        let events = feed.subscribe();
        let mut agent = Agent::new(
            test_config(),
            MockImageSource::new(vec![1]),
            RecordingTransport::new(),
            ScriptedLink::new(LinkState::new(true)),
            Box::new(MonotonicClock::new()),
            feed,
        );
        assert_eq!(agent.connectivity(), ConnectivityState::Connected);

        advance_ms(1_000).await;
        assert_eq!(agent.tick().await, Tick::Polled(Action::None));
        drop(agent);
        let kinds: Vec<AgentEventKind> = events.map(|event| event.kind).collect().await;
        assert!(kinds.is_empty(), "{kinds:?}");
    }

    fn thermal_zone(name: &str, contents: Option<&str>) -> String {
        let path = std::env::temp_dir().join(format!(
            "trapcam-agent-thermal-{}-{name}",
            std::process::id()
        ));
        match contents {
            Some(contents) => std::fs::write(&path, contents).unwrap(),
            None => {
                let _ = std::fs::remove_file(&path);
            }
        }
        path.display().to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn energy_sample_is_posted_every_n_polls() {
        let mut config = test_config();
        config.ops.energy_sample_every_polls = 2;
        config.ops.thermal_zone_path = thermal_zone("posted", Some("48500\n"));
        let transport = RecordingTransport::new();
        let mut agent = Agent::new(
            config.clone(),
            MockImageSource::new(vec![1]),
            transport.clone(),
            ScriptedLink::new(LinkState::new(true)),
            Box::new(MonotonicClock::new()),
            EventFeed::new(16),
        );

        for _ in 0..3 {
            advance_ms(1_000).await;
            agent.tick().await;
        }

        let samples = transport.requests_to(&config.network.energy_url());
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].content_type.as_deref(), Some("application/json"));
        assert_eq!(samples[0].auth_token.as_deref(), Some("secret"));
        let json: serde_json::Value = serde_json::from_slice(&samples[0].body).unwrap();
        assert_eq!(json["cpuTemp"], 48.5);
        assert_eq!(json["voltage"], 5.0);
        assert!((json["watts"].as_f64().unwrap() - 4.0).abs() < 1e-9);
        assert!(
            agent.state.usage.total(UsageCategory::System) >= samples[0].body.len() as u64
        );
    }

    #[tokio::test(start_paused = true)]
    async fn energy_sample_skipped_without_thermal_zone() {
        let mut config = test_config();
        config.ops.energy_sample_every_polls = 1;
        config.ops.thermal_zone_path = thermal_zone("absent", None);
        let transport = RecordingTransport::new();
        let mut agent = Agent::new(
            config.clone(),
            MockImageSource::new(vec![1]),
            transport.clone(),
            ScriptedLink::new(LinkState::new(true)),
            Box::new(MonotonicClock::new()),
            EventFeed::new(16),
        );

        for _ in 0..2 {
            advance_ms(1_000).await;
            assert_eq!(agent.tick().await, Tick::Polled(Action::None));
        }
        assert!(transport.requests_to(&config.network.energy_url()).is_empty());
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_poll_is_not_counted_as_usage() {
        let transport = RecordingTransport::new();
        transport.queue_get(MockReply::json(503, r#"{"error":"maintenance"}"#));
        let mut agent = online_agent(MockImageSource::new(vec![1]), transport.clone());

        advance_ms(1_000).await;
        assert_eq!(agent.tick().await, Tick::Polled(Action::None));
        assert_eq!(agent.state.usage.total(UsageCategory::System), 0);

        advance_ms(1_000).await;
        agent.tick().await;
        assert_eq!(
            agent.state.usage.total(UsageCategory::System),
            r#"{"action":"none"}"#.len() as u64
        );
    }

    #[tokio::test(start_paused = true)]
    async fn usage_is_flushed_every_n_polls() {
        let transport = RecordingTransport::new();
        transport.queue_get(MockReply::json(200, r#"{"action":"photo"}"#));
        let mut agent = online_agent(MockImageSource::new(vec![5; 100]), transport.clone());

        for _ in 0..4 {
            advance_ms(1_000).await;
            agent.tick().await;
        }

        let config = test_config();
        let reports = transport.requests_to(&config.network.data_usage_url());
        assert_eq!(reports.len(), 2);
        let kinds: Vec<serde_json::Value> = reports
            .iter()
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect();
        assert_eq!(kinds[0]["type"], "photo");
        assert!(kinds[0]["bytes"].as_u64().unwrap() > 100);
        assert_eq!(kinds[1]["type"], "system");
        assert!(reports
            .iter()
            .all(|request| request.method == RecordedMethod::Post
                && request.content_type.as_deref() == Some("application/json")));
    }

    #[tokio::test]
    async fn boot_fails_when_camera_does_not_initialise() {
        let mut agent = online_agent(
            MockImageSource::new(vec![1]).failing_init(),
            RecordingTransport::new(),
        );
        let err = agent.boot().await.unwrap_err();
        assert!(matches!(err, TrapcamError::Agent(_)));
    }
}
