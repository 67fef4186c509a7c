use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{CONTENT_LENGTH, CONTENT_TYPE},
    Client, RequestBuilder,
};
use tracing::debug;
use trapcam_types::{
    http::{HttpResponse, UploadRequest},
    Result,
};

use crate::{transport_error, LinkState, Transport};

const API_KEY_HEADER: &str = "X-Api-Key";

/// HTTP transport backed by `reqwest`.
///
/// Every call builds its own client with pooling disabled, so no connection
/// outlives the request that opened it.
pub struct ReqwestTransport {
    timeout: Duration,
    link: LinkState,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, link: LinkState) -> Self {
        Self { timeout, link }
    }

    fn client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|err| transport_error(format!("failed to build http client: {err}")))
    }

    async fn send(&self, builder: RequestBuilder, url: &str) -> Result<HttpResponse> {
        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return Err(self.classify(err, url)),
        };
        self.link.mark_up();
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| self.classify(err, url))?;
        debug!("{url} answered HTTP {status} ({} bytes)", body.len());
        Ok(HttpResponse::new(status, body.to_vec()))
    }

    fn classify(&self, err: reqwest::Error, url: &str) -> trapcam_types::TrapcamError {
        if err.is_connect() {
            self.link.mark_down();
            transport_error(format!("cannot connect to {url}: {err}"))
        } else if err.is_timeout() {
            transport_error(format!("request to {url} timed out after {:?}", self.timeout))
        } else {
            transport_error(format!("request to {url} failed: {err}"))
        }
    }
}

fn with_api_key(builder: RequestBuilder, auth_token: Option<&str>) -> RequestBuilder {
    match auth_token {
        Some(token) => builder.header(API_KEY_HEADER, token),
        None => builder,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, auth_token: Option<&str>) -> Result<HttpResponse> {
        let builder = with_api_key(self.client()?.get(url), auth_token);
        self.send(builder, url).await
    }

    async fn post(&self, request: UploadRequest) -> Result<HttpResponse> {
        let UploadRequest {
            target,
            body,
            content_type,
            auth_token,
        } = request;
        let builder = self
            .client()?
            .post(&target)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, body.len())
            .body(body);
        let builder = with_api_key(builder, auth_token.as_deref());
        self.send(builder, &target).await
    }
}
