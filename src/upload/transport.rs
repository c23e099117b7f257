//! HTTP delivery for encoded snapshots.
//!
//! The transport is responsible for:
//! - Performing exactly one POST per call: connect, send headers and the
//!   full body, read one response, tear the connection down
//! - Mapping the result onto `UploadOutcome`
//!
//! The transport MUST NOT:
//! - Retry, redirect, or queue
//! - Keep idle connections alive between cycles
//! - Echo response bodies of 500 bytes or more

use std::fmt;
use std::io::Read;
use std::time::Duration;

use super::{EncodedPayload, UploadRequest};

/// Response bodies at or above this size are dropped from log output.
const BODY_ECHO_LIMIT: usize = 500;

/// Result of one delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The server answered with status 200.
    Success,
    /// A response arrived but its status was not 200.
    ServerRejected(u16),
    /// No status was received: refused, timed out, DNS failure, or a
    /// malformed response.
    TransportFailure(String),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success)
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Success => write!(f, "success"),
            UploadOutcome::ServerRejected(status) => write!(f, "server rejected (status {status})"),
            UploadOutcome::TransportFailure(reason) => write!(f, "transport failure: {reason}"),
        }
    }
}

/// One-shot delivery seam. Implementations attempt a single POST and never
/// retry; cadence and retries-by-omission belong to the scheduler.
pub trait UploadTransport {
    fn send(&mut self, request: &UploadRequest, payload: &EncodedPayload) -> UploadOutcome;
}

/// Real HTTP transport over a ureq agent.
///
/// Redirects are disabled so a 3xx is reported as the received status, and
/// the idle pool is empty so every connection is torn down once the response
/// is consumed, success or not.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, overall_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout(overall_timeout)
            .redirects(0)
            .max_idle_connections(0)
            .build();
        Self { agent }
    }
}

impl UploadTransport for HttpTransport {
    fn send(&mut self, request: &UploadRequest, payload: &EncodedPayload) -> UploadOutcome {
        // send_bytes sets Content-Length to the exact buffer length; the body
        // is never chunked.
        let result = self
            .agent
            .post(&request.url)
            .set("Content-Type", &request.content_type())
            .send_bytes(payload.bytes());

        match result {
            Ok(response) => {
                let status = response.status();
                let note = read_body_note(response);
                if status == 200 {
                    match note {
                        Some(body) => log::debug!("upload accepted: {body}"),
                        None => log::debug!("upload accepted"),
                    }
                    UploadOutcome::Success
                } else {
                    log_rejection(status, note);
                    UploadOutcome::ServerRejected(status)
                }
            }
            Err(ureq::Error::Status(status, response)) => {
                log_rejection(status, read_body_note(response));
                UploadOutcome::ServerRejected(status)
            }
            Err(ureq::Error::Transport(transport)) => {
                let reason = transport.to_string();
                log::warn!("upload transport failure: {reason}");
                UploadOutcome::TransportFailure(reason)
            }
        }
    }
}

fn log_rejection(status: u16, note: Option<String>) {
    match note {
        Some(body) => log::warn!("upload rejected: status {status} body {body:?}"),
        None => log::warn!("upload rejected: status {status}"),
    }
}

/// Short response bodies are worth echoing for diagnostics; anything at or
/// above `BODY_ECHO_LIMIT` (or unreadable as UTF-8) is dropped.
fn read_body_note(response: ureq::Response) -> Option<String> {
    let mut body = String::new();
    let mut reader = response.into_reader().take(BODY_ECHO_LIMIT as u64);
    if reader.read_to_string(&mut body).is_err() {
        return None;
    }
    if body.is_empty() || body.len() >= BODY_ECHO_LIMIT {
        return None;
    }
    Some(body.trim_end().to_string())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
