//! Smart-facility edge nodes.
//!
//! This crate implements the two daemons that run on the facility's edge
//! boxes: `camnoded`, which periodically captures a camera frame and uploads
//! it to the collection server as a multipart form, and `sensornoded`, which
//! samples sensor channels and drives actuators over an MQTT relay.
//!
//! # Architecture
//!
//! The capture pipeline enforces five invariants by construction:
//!
//! 1. **Single Release**: every acquired frame is released exactly once, on
//!    every exit path (success, encode failure, transport failure).
//! 2. **Exact Framing**: the multipart body is sized before it is allocated,
//!    built in one allocation, and sent with an exact Content-Length.
//! 3. **One Shot**: each cycle issues at most one POST; there are no retries
//!    and no queues, the next cycle simply tries again.
//! 4. **Flash Discipline**: the flash engages before acquisition and is off
//!    again before the node returns to idle, every cycle.
//! 5. **Single Thread**: capture, encode and upload run on one cooperative
//!    blocking thread. The only helper thread is the MQTT reader inside the
//!    sensor node's relay.
//!
//! # Module Structure
//!
//! - `frame`: frame handle, camera driver seam, RAII release guard
//! - `capture`: camera source backends (synthetic, spool directory)
//! - `upload`: multipart encoder and HTTP transport
//! - `scheduler`: interval-driven capture cycle state machine
//! - `flash`: capture-light indicator backends
//! - `gpio`: sensor and actuator channels for the sensor node
//! - `relay`: MQTT command/telemetry relay and the command set
//! - `config`: file + environment configuration for both daemons

pub mod capture;
pub mod config;
pub mod flash;
pub mod frame;
pub mod gpio;
pub mod relay;
pub mod scheduler;
pub mod upload;

pub use capture::{CameraSource, CameraStats};
pub use config::{CamNodeConfig, ChannelSpec, SensorNodeConfig};
pub use flash::FlashIndicator;
pub use frame::{CameraDriver, Frame, FrameGuard};
pub use relay::{Command, CommandRelay};
pub use scheduler::{CaptureScheduler, CycleResult, UplinkSettings};
pub use upload::multipart::{encode_form_data, encoded_len, EncodeError, EncodedPayload};
pub use upload::transport::{HttpTransport, UploadOutcome, UploadTransport};
pub use upload::UploadRequest;
