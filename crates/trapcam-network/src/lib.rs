//! Network transport capability, upload encoding, and connectivity.

mod http;
mod link;
mod multipart;

pub use http::ReqwestTransport;
pub use link::{link_error, Link, LinkState, ScriptedLink, TcpLink};
pub use multipart::{MultipartBody, MultipartEncoder};

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;
use trapcam_types::{
    http::{HttpResponse, UploadRequest},
    Result, TrapcamError,
};

/// Request-scoped HTTP exchanges with the backend.
///
/// Any status code is returned as a response; only transport-level failures
/// (timeouts, refused connections) surface as errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, auth_token: Option<&str>) -> Result<HttpResponse>;
    async fn post(&self, request: UploadRequest) -> Result<HttpResponse>;
}

/// Outcome a `RecordingTransport` hands back for one request.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(HttpResponse),
    Fail(String),
}

impl MockReply {
    pub fn json(status: u16, body: &str) -> Self {
        MockReply::Respond(HttpResponse::new(status, body))
    }

    pub fn status(status: u16) -> Self {
        MockReply::Respond(HttpResponse::new(status, Vec::new()))
    }

    pub fn timeout() -> Self {
        MockReply::Fail("request timed out".into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: RecordedMethod,
    pub url: String,
    pub auth_token: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Default)]
struct Script {
    gets: VecDeque<MockReply>,
    posts: VecDeque<MockReply>,
    requests: Vec<RecordedRequest>,
}

/// In-process transport that replays scripted replies and records requests.
#[derive(Clone)]
pub struct RecordingTransport {
    script: Arc<Mutex<Script>>,
    default_get: MockReply,
    default_post: MockReply,
    post_latency: Duration,
    link: Option<LinkState>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            default_get: MockReply::json(200, r#"{"action":"none"}"#),
            default_post: MockReply::status(200),
            post_latency: Duration::ZERO,
            link: None,
        }
    }

    pub fn queue_get(&self, reply: MockReply) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.gets.push_back(reply);
        }
        self
    }

    pub fn queue_post(&self, reply: MockReply) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.posts.push_back(reply);
        }
        self
    }

    pub fn with_default_post(mut self, reply: MockReply) -> Self {
        self.default_post = reply;
        self
    }

    /// Simulated time each POST spends on the wire.
    pub fn with_post_latency(mut self, latency: Duration) -> Self {
        self.post_latency = latency;
        self
    }

    /// Fail every request while the shared link is down.
    pub fn with_link(mut self, link: LinkState) -> Self {
        self.link = Some(link);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.script
            .lock()
            .map(|script| script.requests.clone())
            .unwrap_or_default()
    }

    pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url == url)
            .collect()
    }

    fn record(&self, request: RecordedRequest) -> Result<MockReply> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| transport_error("failed to lock transport script"))?;
        let reply = match request.method {
            RecordedMethod::Get => script.gets.pop_front(),
            RecordedMethod::Post => script.posts.pop_front(),
        };
        let fallback = match request.method {
            RecordedMethod::Get => &self.default_get,
            RecordedMethod::Post => &self.default_post,
        };
        script.requests.push(request);
        Ok(reply.unwrap_or_else(|| fallback.clone()))
    }

    fn link_down(&self) -> bool {
        self.link
            .as_ref()
            .map(|link| !link.state().is_connected())
            .unwrap_or(false)
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(reply: MockReply) -> Result<HttpResponse> {
    match reply {
        MockReply::Respond(response) => Ok(response),
        MockReply::Fail(reason) => Err(transport_error(reason)),
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn get(&self, url: &str, auth_token: Option<&str>) -> Result<HttpResponse> {
        debug!("Mock GET {url}");
        let reply = self.record(RecordedRequest {
            method: RecordedMethod::Get,
            url: url.to_string(),
            auth_token: auth_token.map(str::to_string),
            content_type: None,
            body: Vec::new(),
        })?;
        if self.link_down() {
            return Err(transport_error("network unreachable"));
        }
        resolve(reply)
    }

    async fn post(&self, request: UploadRequest) -> Result<HttpResponse> {
        debug!("Mock POST {} ({} bytes)", request.target, request.body.len());
        let reply = self.record(RecordedRequest {
            method: RecordedMethod::Post,
            url: request.target,
            auth_token: request.auth_token,
            content_type: Some(request.content_type),
            body: request.body,
        })?;
        if !self.post_latency.is_zero() {
            sleep(self.post_latency).await;
        }
        if self.link_down() {
            return Err(transport_error("network unreachable"));
        }
        resolve(reply)
    }
}

/// Generate an error aligned with transport semantics.
pub fn transport_error(message: impl Into<String>) -> TrapcamError {
    TrapcamError::Transport(message.into())
}
