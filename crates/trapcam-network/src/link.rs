//! Connectivity capability: live status plus blocking reconnection.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Url;
use tokio::{
    net::TcpStream,
    time::{sleep, timeout, Instant},
};
use tracing::{debug, info, warn};
use trapcam_types::{config::LinkConfig, link::ConnectivityState, Result, TrapcamError};

#[async_trait]
pub trait Link: Send {
    /// Live status as seen by the transport layer.
    fn status(&self) -> ConnectivityState;
    /// Block until connected or the reconnect window elapses.
    async fn reconnect(&mut self) -> Result<()>;
}

/// Connectivity flag shared between a link and the transport using it.
#[derive(Debug, Clone, Default)]
pub struct LinkState {
    up: Arc<AtomicBool>,
}

impl LinkState {
    pub fn new(connected: bool) -> Self {
        Self {
            up: Arc::new(AtomicBool::new(connected)),
        }
    }

    pub fn mark_up(&self) {
        self.up.store(true, Ordering::SeqCst);
    }

    pub fn mark_down(&self) {
        self.up.store(false, Ordering::SeqCst);
    }

    pub fn state(&self) -> ConnectivityState {
        if self.up.load(Ordering::SeqCst) {
            ConnectivityState::Connected
        } else {
            ConnectivityState::Disconnected
        }
    }
}

/// Host link: the backend counts as reachable while TCP connects succeed.
pub struct TcpLink {
    host: String,
    port: u16,
    config: LinkConfig,
    state: LinkState,
}

impl TcpLink {
    pub fn new(base_url: &str, config: LinkConfig, state: LinkState) -> Result<Self> {
        let url = Url::parse(base_url)
            .map_err(|err| link_error(format!("invalid base url '{base_url}': {err}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| link_error(format!("base url '{base_url}' has no host")))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| link_error(format!("base url '{base_url}' has no port")))?;
        Ok(Self {
            host,
            port,
            config,
            state,
        })
    }

    pub fn target(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    async fn probe(&self) -> bool {
        let attempt = TcpStream::connect((self.host.as_str(), self.port));
        match timeout(Duration::from_millis(self.config.probe_timeout_ms), attempt).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(err)) => {
                debug!("Probe to {}:{} failed: {err}", self.host, self.port);
                false
            }
            Err(_) => {
                debug!("Probe to {}:{} timed out", self.host, self.port);
                false
            }
        }
    }
}

#[async_trait]
impl Link for TcpLink {
    fn status(&self) -> ConnectivityState {
        self.state.state()
    }

    async fn reconnect(&mut self) -> Result<()> {
        info!("Connecting to backend at {}:{}", self.host, self.port);
        let started = Instant::now();
        let window = Duration::from_millis(self.config.reconnect_window_ms);
        loop {
            if self.probe().await {
                self.state.mark_up();
                info!("Backend reachable at {}:{}", self.host, self.port);
                return Ok(());
            }
            if started.elapsed() >= window {
                warn!(
                    "Backend still unreachable after {} ms",
                    self.config.reconnect_window_ms
                );
                return Err(link_error("reconnect window elapsed"));
            }
            sleep(Duration::from_millis(self.config.reconnect_backoff_ms)).await;
        }
    }
}

/// Link whose reconnection outcomes are scripted, for tests and benches.
pub struct ScriptedLink {
    state: LinkState,
    outcomes: VecDeque<bool>,
    attempts: Arc<AtomicU32>,
}

impl ScriptedLink {
    pub fn new(state: LinkState) -> Self {
        Self {
            state,
            outcomes: VecDeque::new(),
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Queue reconnect outcomes; once drained every attempt succeeds.
    pub fn with_outcomes(mut self, outcomes: impl IntoIterator<Item = bool>) -> Self {
        self.outcomes.extend(outcomes);
        self
    }

    pub fn attempts_handle(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait]
impl Link for ScriptedLink {
    fn status(&self) -> ConnectivityState {
        self.state.state()
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.outcomes.pop_front().unwrap_or(true) {
            self.state.mark_up();
            Ok(())
        } else {
            Err(link_error("scripted reconnect failure"))
        }
    }
}

pub fn link_error(message: impl Into<String>) -> TrapcamError {
    TrapcamError::Link(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn target_from_base_url() {
        let link = TcpLink::new(
            "http://192.168.1.6:3001",
            LinkConfig::default(),
            LinkState::default(),
        )
        .unwrap();
        assert_eq!(link.target(), ("192.168.1.6", 3001));

        let link =
            TcpLink::new("https://backend.local", LinkConfig::default(), LinkState::default())
                .unwrap();
        assert_eq!(link.target(), ("backend.local", 443));

        assert!(TcpLink::new("not a url", LinkConfig::default(), LinkState::default()).is_err());
    }

    #[tokio::test]
    async fn reconnect_marks_shared_state_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = LinkState::new(false);
        let mut link = TcpLink::new(
            &format!("http://127.0.0.1:{port}"),
            LinkConfig::default(),
            state.clone(),
        )
        .unwrap();

        assert_eq!(link.status(), ConnectivityState::Disconnected);
        link.reconnect().await.expect("listener is reachable");
        assert_eq!(state.state(), ConnectivityState::Connected);
    }

    #[tokio::test]
    async fn reconnect_gives_up_after_window() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = LinkConfig {
            probe_timeout_ms: 50,
            reconnect_window_ms: 120,
            reconnect_backoff_ms: 40,
            reconnect_check_interval_ms: 10,
        };
        let mut link =
            TcpLink::new(&format!("http://127.0.0.1:{port}"), config, LinkState::new(false))
                .unwrap();
        assert!(link.reconnect().await.is_err());
        assert_eq!(link.status(), ConnectivityState::Disconnected);
    }

    #[tokio::test]
    async fn scripted_link_follows_outcomes() {
        let state = LinkState::new(false);
        let mut link = ScriptedLink::new(state.clone()).with_outcomes([false, true]);
        let attempts = link.attempts_handle();
        assert!(link.reconnect().await.is_err());
        assert!(!link.status().is_connected());
        assert!(link.reconnect().await.is_ok());
        assert!(state.state().is_connected());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
