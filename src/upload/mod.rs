//! Snapshot upload pipeline: wire encoding and HTTP delivery.
//!
//! The upload layer is responsible for:
//! - Encoding one compressed frame into a multipart/form-data body
//!   (`multipart`), sized and allocated exactly once
//! - Delivering that body with a single POST and mapping the result onto a
//!   tri-state outcome (`transport`)
//!
//! The upload layer MUST NOT:
//! - Retry a failed delivery (the scheduler attempts at most one per cycle)
//! - Buffer payloads across cycles
//! - Echo response bodies of 500 bytes or more into the log

pub mod multipart;
pub mod transport;

pub use multipart::{encode_form_data, encoded_len, EncodeError, EncodedPayload};
pub use transport::{HttpTransport, UploadOutcome, UploadTransport};

/// Everything one delivery attempt needs besides the image bytes. Assembled
/// fresh by the scheduler for each cycle and discarded with it.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// Target endpoint, e.g. `http://192.168.1.20:5000/upload`.
    pub url: String,
    /// Boundary token for the multipart body. Must not contain CR/LF.
    pub boundary: String,
    /// Synthesized upload filename, e.g. `image_152000.jpg`.
    pub filename: String,
}

impl UploadRequest {
    pub fn new(
        url: impl Into<String>,
        boundary: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            boundary: boundary.into(),
            filename: filename.into(),
        }
    }

    /// Value for the `Content-Type` request header, carrying the boundary.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}
