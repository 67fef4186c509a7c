//! Runs one decoded action to completion.
//!
//! The executor is either idle or busy, and busy is a blocking sub-loop: the
//! caller cannot poll again until `execute` returns, so two actions never
//! overlap and no image buffer is shared between them.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};
use trapcam_camera::ImageSource;
use trapcam_network::{MultipartEncoder, Transport};
use trapcam_types::{
    action::Action,
    config::TrapcamConfig,
    events::AgentEventKind,
    http::EndpointKind,
    image::CapturePreset,
    telemetry::UsageCategory,
};

use crate::{
    poller::MAX_STREAM_SECS,
    state::AgentState,
    timers::{deadline_reached, elapsed, Clock, Millis},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Busy,
}

/// Summary of one executed action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionReport {
    pub captures_attempted: u32,
    pub uploads_delivered: u32,
}

pub struct ActionExecutor {
    state: ExecutorState,
    encoder: MultipartEncoder,
    photo_url: String,
    live_frame_url: String,
    auth_token: Option<String>,
    capture_preset: CapturePreset,
    stream_preset: CapturePreset,
    frame_delay: Duration,
}

impl ActionExecutor {
    pub fn new(config: &TrapcamConfig) -> Self {
        let network = &config.network;
        Self {
            state: ExecutorState::Idle,
            encoder: MultipartEncoder::new(&network.device_id)
                .with_memory_limit(network.max_upload_bytes),
            photo_url: network.photo_url(),
            live_frame_url: network.live_frame_url(),
            auth_token: network.auth_token().map(str::to_string),
            capture_preset: config.camera.capture,
            stream_preset: config.camera.stream,
            frame_delay: Duration::from_millis(config.timing.frame_delay_ms as u64),
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub async fn execute<S, T>(
        &mut self,
        action: Action,
        source: &mut S,
        transport: &T,
        clock: &dyn Clock,
        agent: &mut AgentState,
    ) -> ActionReport
    where
        S: ImageSource + ?Sized,
        T: Transport + ?Sized,
    {
        let duration_secs = match action {
            Action::None => return ActionReport::default(),
            Action::Photo => None,
            Action::Stream { duration_secs } => Some(duration_secs.get()),
        };

        self.state = ExecutorState::Busy;
        let report = match duration_secs {
            None => self.photo(source, transport, agent).await,
            Some(secs) => self.stream(secs, source, transport, clock, agent).await,
        };
        self.state = ExecutorState::Idle;
        report
    }

    async fn photo<S, T>(
        &self,
        source: &mut S,
        transport: &T,
        agent: &mut AgentState,
    ) -> ActionReport
    where
        S: ImageSource + ?Sized,
        T: Transport + ?Sized,
    {
        let mut report = ActionReport {
            captures_attempted: 1,
            uploads_delivered: 0,
        };
        let buffer = match source.capture().await {
            Ok(buffer) => buffer,
            Err(err) => {
                warn!("Photo capture failed, dropping this action: {err}");
                agent.emit(AgentEventKind::CaptureFailed {
                    reason: err.to_string(),
                });
                return report;
            }
        };

        info!("Photo captured: {} bytes", buffer.len());
        if self
            .upload(buffer.as_bytes(), EndpointKind::Photo, transport, agent)
            .await
        {
            report.uploads_delivered = 1;
        }
        source.release(buffer);
        report
    }

    async fn stream<S, T>(
        &self,
        duration_secs: u32,
        source: &mut S,
        transport: &T,
        clock: &dyn Clock,
        agent: &mut AgentState,
    ) -> ActionReport
    where
        S: ImageSource + ?Sized,
        T: Transport + ?Sized,
    {
        let duration_ms: Millis = duration_secs.min(MAX_STREAM_SECS) * 1_000;
        let started = clock.now_ms();
        let deadline = started.wrapping_add(duration_ms);
        info!("Streaming for {duration_secs} s");

        if let Err(err) = source.apply_preset(self.stream_preset).await {
            warn!("Could not apply stream preset, streaming with current settings: {err}");
        }

        let mut report = ActionReport::default();
        loop {
            let now = clock.now_ms();
            if deadline_reached(now, deadline) {
                break;
            }
            if report.captures_attempted > 0 {
                debug!(
                    "Frame spacing {} ms",
                    elapsed(now, agent.timers.stream_frame.last_fired())
                );
            }
            agent.timers.stream_frame.fire(now);
            report.captures_attempted += 1;

            match source.capture().await {
                Ok(frame) => {
                    if self
                        .upload(frame.as_bytes(), EndpointKind::LiveFrame, transport, agent)
                        .await
                    {
                        report.uploads_delivered += 1;
                    }
                    source.release(frame);
                }
                Err(err) => {
                    warn!("Frame capture failed, skipping: {err}");
                    agent.emit(AgentEventKind::CaptureFailed {
                        reason: err.to_string(),
                    });
                }
            }

            sleep(self.frame_delay).await;
        }

        if let Err(err) = source.apply_preset(self.capture_preset).await {
            warn!("Could not restore capture preset: {err}");
        }
        info!(
            "Streaming finished: {} of {} frames delivered in {} ms",
            report.uploads_delivered,
            report.captures_attempted,
            elapsed(clock.now_ms(), started)
        );
        agent.emit(AgentEventKind::StreamFinished {
            frames_attempted: report.captures_attempted,
            frames_delivered: report.uploads_delivered,
        });
        report
    }

    /// Encode and POST one image. Returns whether the backend answered 2xx.
    async fn upload<T>(
        &self,
        image: &[u8],
        endpoint: EndpointKind,
        transport: &T,
        agent: &mut AgentState,
    ) -> bool
    where
        T: Transport + ?Sized,
    {
        let (url, category) = match endpoint {
            EndpointKind::Photo => (&self.photo_url, UsageCategory::Photo),
            EndpointKind::LiveFrame => (&self.live_frame_url, UsageCategory::Stream),
        };

        let body = match self.encoder.encode(image) {
            Ok(body) => body,
            Err(err) => {
                warn!("Upload to {url} abandoned: {err}");
                agent.emit(AgentEventKind::EncodeFailed {
                    reason: err.to_string(),
                });
                return false;
            }
        };

        let sent = body.content_length();
        debug!("Posting {sent} bytes to {url}");
        let request = body.into_upload(url.clone(), self.auth_token.as_deref());
        match transport.post(request).await {
            Ok(response) if response.is_success() => {
                agent.record_usage(category, sent + response.body.len());
                agent.emit(AgentEventKind::UploadSucceeded {
                    endpoint,
                    bytes: sent,
                    status: response.status,
                });
                true
            }
            Ok(response) => {
                warn!("Upload to {url} answered HTTP {}", response.status);
                agent.emit(AgentEventKind::UploadFailed {
                    endpoint,
                    status: Some(response.status),
                    reason: format!("HTTP {}", response.status),
                });
                false
            }
            Err(err) => {
                warn!("Upload to {url} failed: {err}");
                agent.emit(AgentEventKind::UploadFailed {
                    endpoint,
                    status: None,
                    reason: err.to_string(),
                });
                false
            }
        }
    }
}
