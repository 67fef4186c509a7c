use serde::{Deserialize, Serialize};

/// Backend endpoints that receive image uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointKind {
    Photo,
    LiveFrame,
}

/// One outbound POST. Built fresh per upload and dropped once the exchange ends.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub target: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub auth_token: Option<String>,
}

impl UploadRequest {
    pub fn content_length(&self) -> usize {
        self.body.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
