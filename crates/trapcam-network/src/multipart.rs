//! Single-part `multipart/form-data` bodies carrying one JPEG.

use trapcam_types::{http::UploadRequest, Result, TrapcamError};
use uuid::Uuid;

const FIELD_NAME: &str = "image";
const PART_CONTENT_TYPE: &str = "image/jpeg";

/// Builds upload bodies for one device.
#[derive(Debug, Clone)]
pub struct MultipartEncoder {
    filename: String,
    memory_limit: Option<usize>,
}

impl MultipartEncoder {
    pub fn new(device_id: &str) -> Self {
        Self {
            filename: format!("{device_id}.jpg"),
            memory_limit: None,
        }
    }

    /// Treat bodies larger than `limit` bytes as an allocation failure.
    pub fn with_memory_limit(mut self, limit: Option<usize>) -> Self {
        self.memory_limit = limit;
        self
    }

    pub fn encode(&self, image: &[u8]) -> Result<MultipartBody> {
        let boundary = format!("trapcam-{}", Uuid::new_v4().simple());
        self.encode_with_boundary(boundary, image)
    }

    pub fn encode_with_boundary(&self, boundary: String, image: &[u8]) -> Result<MultipartBody> {
        let head = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{FIELD_NAME}\"; filename=\"{}\"\r\nContent-Type: {PART_CONTENT_TYPE}\r\n\r\n",
            self.filename
        );
        let tail = format!("\r\n--{boundary}--\r\n");

        let total = head
            .len()
            .checked_add(image.len())
            .and_then(|len| len.checked_add(tail.len()))
            .ok_or_else(|| encoding_error("upload body length overflows usize"))?;
        if let Some(limit) = self.memory_limit {
            if total > limit {
                return Err(encoding_error(format!(
                    "cannot allocate {total} bytes for upload body (limit {limit})"
                )));
            }
        }

        let mut body = Vec::new();
        body.try_reserve_exact(total).map_err(|err| {
            encoding_error(format!("cannot allocate {total} bytes for upload body: {err}"))
        })?;
        body.extend_from_slice(head.as_bytes());
        body.extend_from_slice(image);
        body.extend_from_slice(tail.as_bytes());

        Ok(MultipartBody { boundary, body })
    }
}

/// Fully assembled body; its length is the declared `Content-Length`.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn into_upload(self, target: String, auth_token: Option<&str>) -> UploadRequest {
        UploadRequest {
            content_type: self.content_type(),
            target,
            body: self.body,
            auth_token: auth_token.map(str::to_string),
        }
    }
}

fn encoding_error(message: impl Into<String>) -> TrapcamError {
    TrapcamError::Encoding(message.into())
}
