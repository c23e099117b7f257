//! Capture scheduler: cadence and cycle sequencing for the camera node.
//!
//! The scheduler is one step of the node's cooperative polling loop. Each
//! `tick` decides whether a new cycle is due and, if so, runs it to
//! completion before returning: flash on, frame acquisition, multipart
//! encoding, one delivery attempt, cleanup. The whole pipeline is
//! synchronous and blocking on purpose; capture intervals are measured in
//! seconds and the node has a single logical task, so a slow upload delays
//! the loop rather than overlapping it.
//!
//! The scheduler MUST NOT:
//! - Run more than one cycle per tick, however much time has passed
//! - Retry a failed delivery within a cycle
//! - Leave the flash on or the frame unreleased on any exit path

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::flash::FlashIndicator;
use crate::frame::{CameraDriver, FrameGuard};
use crate::upload::{encode_form_data, UploadOutcome, UploadRequest, UploadTransport};

const BOUNDARY_PREFIX: &str = "----FacilityCamFormBoundary";

/// Read-only uplink parameters, resolved from config at startup and never
/// mutated afterwards.
#[derive(Clone, Debug)]
pub struct UplinkSettings {
    /// Snapshot endpoint, e.g. `http://192.168.1.20:5000/upload`.
    pub upload_url: String,
    /// Minimum time between cycle starts.
    pub capture_interval: Duration,
    /// Upload filename prefix; the uptime in milliseconds and `.jpg` are
    /// appended per cycle.
    pub filename_prefix: String,
    /// Settle time after engaging the flash, before acquisition.
    pub flash_warmup: Duration,
}

/// Outcome of one capture cycle. Consumed for logging and loop counters
/// only; it never feeds back into scheduling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleResult {
    Success,
    /// The camera returned no frame.
    CaptureFailed,
    /// The multipart body could not be built (allocation refused).
    EncodeFailed,
    /// Delivery failed; carries the received status when there was one.
    TransportFailed(Option<u16>),
}

impl CycleResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleResult::Success)
    }
}

impl fmt::Display for CycleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleResult::Success => write!(f, "success"),
            CycleResult::CaptureFailed => write!(f, "capture failed"),
            CycleResult::EncodeFailed => write!(f, "encode failed"),
            CycleResult::TransportFailed(Some(status)) => {
                write!(f, "server rejected (status {status})")
            }
            CycleResult::TransportFailed(None) => write!(f, "transport failure"),
        }
    }
}

/// Owns the cross-cycle state: the last cycle start and the uptime anchor
/// for filename synthesis. The main loop owns the scheduler and hands it the
/// current instant plus the collaborators on every tick.
pub struct CaptureScheduler {
    settings: UplinkSettings,
    started_at: Instant,
    last_run: Instant,
}

impl CaptureScheduler {
    /// `started_at` anchors both the first-cycle delay (one full interval
    /// after startup) and the uptime used in filenames.
    pub fn new(settings: UplinkSettings, started_at: Instant) -> Self {
        Self {
            settings,
            started_at,
            last_run: started_at,
        }
    }

    /// One scheduler step. Runs at most one full cycle, only when the
    /// interval has elapsed since the last cycle start.
    pub fn tick(
        &mut self,
        now: Instant,
        camera: &mut dyn CameraDriver,
        transport: &mut dyn UploadTransport,
        flash: &mut dyn FlashIndicator,
    ) -> Option<CycleResult> {
        if now.saturating_duration_since(self.last_run) <= self.settings.capture_interval {
            return None;
        }
        Some(self.run_now(now, camera, transport, flash))
    }

    /// Run one cycle immediately, bypassing the cadence check. `last_run`
    /// advances to `now` before the attempt, so a slow or failing cycle
    /// cannot re-trigger early on the next tick.
    pub fn run_now(
        &mut self,
        now: Instant,
        camera: &mut dyn CameraDriver,
        transport: &mut dyn UploadTransport,
        flash: &mut dyn FlashIndicator,
    ) -> CycleResult {
        self.last_run = now;
        let request = self.next_request(now);
        self.run_cycle(&request, camera, transport, flash)
    }

    /// Run one cycle with fixed inputs. The flash wraps the whole attempt:
    /// engaged before acquisition, disengaged before returning, on every
    /// branch.
    pub fn run_cycle(
        &self,
        request: &UploadRequest,
        camera: &mut dyn CameraDriver,
        transport: &mut dyn UploadTransport,
        flash: &mut dyn FlashIndicator,
    ) -> CycleResult {
        flash.set(true);
        if !self.settings.flash_warmup.is_zero() {
            thread::sleep(self.settings.flash_warmup);
        }
        let result = attempt_cycle(request, camera, transport);
        flash.set(false);

        if result.is_success() {
            log::info!("snapshot {} uploaded", request.filename);
        } else {
            log::warn!("snapshot {} failed: {}", request.filename, result);
        }
        result
    }

    fn next_request(&self, now: Instant) -> UploadRequest {
        let uptime_ms = now.saturating_duration_since(self.started_at).as_millis();
        let token: u32 = rand::thread_rng().gen_range(1_000_000..10_000_000);
        UploadRequest::new(
            self.settings.upload_url.clone(),
            format!("{BOUNDARY_PREFIX}{token}"),
            format!("{}{}.jpg", self.settings.filename_prefix, uptime_ms),
        )
    }
}

/// Acquire, encode, deliver. The frame guard releases the frame back to the
/// driver when this function returns, whichever branch it returns through.
fn attempt_cycle(
    request: &UploadRequest,
    camera: &mut dyn CameraDriver,
    transport: &mut dyn UploadTransport,
) -> CycleResult {
    let Some(frame) = FrameGuard::acquire(camera) else {
        return CycleResult::CaptureFailed;
    };

    let payload = match encode_form_data(&request.boundary, &request.filename, frame.bytes()) {
        Ok(payload) => payload,
        Err(err) => {
            log::warn!("snapshot encode failed: {err}");
            return CycleResult::EncodeFailed;
        }
    };
    log::debug!(
        "snapshot {}: frame #{} encoded to {} bytes",
        request.filename,
        frame.sequence(),
        payload.len()
    );

    match transport.send(request, &payload) {
        UploadOutcome::Success => CycleResult::Success,
        UploadOutcome::ServerRejected(status) => CycleResult::TransportFailed(Some(status)),
        UploadOutcome::TransportFailure(_) => CycleResult::TransportFailed(None),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::upload::EncodedPayload;

    struct FakeCamera {
        frame: Option<Vec<u8>>,
        acquired: u32,
        released: u32,
    }

    impl FakeCamera {
        fn with_frame(data: &[u8]) -> Self {
            Self {
                frame: Some(data.to_vec()),
                acquired: 0,
                released: 0,
            }
        }

        fn empty() -> Self {
            Self {
                frame: None,
                acquired: 0,
                released: 0,
            }
        }
    }

    impl CameraDriver for FakeCamera {
        fn acquire(&mut self) -> Option<Frame> {
            let data = self.frame.clone()?;
            self.acquired += 1;
            Some(Frame::new(data, u64::from(self.acquired)))
        }

        fn release(&mut self, _frame: Frame) {
            self.released += 1;
        }
    }

    struct ScriptedTransport {
        outcome: UploadOutcome,
        sent: Vec<(UploadRequest, Vec<u8>)>,
    }

    impl ScriptedTransport {
        fn returning(outcome: UploadOutcome) -> Self {
            Self {
                outcome,
                sent: Vec::new(),
            }
        }
    }

    impl UploadTransport for ScriptedTransport {
        fn send(&mut self, request: &UploadRequest, payload: &EncodedPayload) -> UploadOutcome {
            self.sent.push((request.clone(), payload.bytes().to_vec()));
            self.outcome.clone()
        }
    }

    struct RecordingFlash {
        events: Vec<bool>,
    }

    impl RecordingFlash {
        fn new() -> Self {
            Self { events: Vec::new() }
        }
    }

    impl FlashIndicator for RecordingFlash {
        fn set(&mut self, on: bool) {
            self.events.push(on);
        }
    }

    fn test_settings(interval: Duration) -> UplinkSettings {
        UplinkSettings {
            upload_url: "http://127.0.0.1:5000/upload".to_string(),
            capture_interval: interval,
            filename_prefix: "image_".to_string(),
            flash_warmup: Duration::ZERO,
        }
    }

    #[test]
    fn first_cycle_waits_one_full_interval() {
        let start = Instant::now();
        let mut scheduler = CaptureScheduler::new(test_settings(Duration::from_secs(5)), start);
        let mut camera = FakeCamera::with_frame(b"jpeg");
        let mut transport = ScriptedTransport::returning(UploadOutcome::Success);
        let mut flash = RecordingFlash::new();

        assert!(scheduler
            .tick(start, &mut camera, &mut transport, &mut flash)
            .is_none());
        assert!(scheduler
            .tick(
                start + Duration::from_secs(5),
                &mut camera,
                &mut transport,
                &mut flash
            )
            .is_none());

        let result = scheduler.tick(
            start + Duration::from_millis(5_001),
            &mut camera,
            &mut transport,
            &mut flash,
        );
        assert_eq!(result, Some(CycleResult::Success));
    }

    #[test]
    fn one_tick_runs_at_most_one_cycle() {
        let start = Instant::now();
        let mut scheduler = CaptureScheduler::new(test_settings(Duration::from_secs(5)), start);
        let mut camera = FakeCamera::with_frame(b"jpeg");
        let mut transport = ScriptedTransport::returning(UploadOutcome::Success);
        let mut flash = RecordingFlash::new();

        // Far past due: still exactly one cycle, and the next tick at the
        // same instant sees the freshly advanced last_run.
        let late = start + Duration::from_secs(60);
        assert!(scheduler
            .tick(late, &mut camera, &mut transport, &mut flash)
            .is_some());
        assert!(scheduler
            .tick(late, &mut camera, &mut transport, &mut flash)
            .is_none());
        assert_eq!(camera.acquired, 1);
        assert_eq!(transport.sent.len(), 1);
    }

    #[test]
    fn request_synthesis_uses_prefix_uptime_and_boundary_token() {
        let start = Instant::now();
        let mut scheduler = CaptureScheduler::new(test_settings(Duration::from_secs(5)), start);
        let mut camera = FakeCamera::with_frame(b"jpeg");
        let mut transport = ScriptedTransport::returning(UploadOutcome::Success);
        let mut flash = RecordingFlash::new();

        let result = scheduler.run_now(
            start + Duration::from_millis(6_000),
            &mut camera,
            &mut transport,
            &mut flash,
        );
        assert!(result.is_success());

        let (request, _) = &transport.sent[0];
        assert_eq!(request.filename, "image_6000.jpg");
        assert_eq!(request.url, "http://127.0.0.1:5000/upload");
        let token = request.boundary.strip_prefix(BOUNDARY_PREFIX).unwrap();
        assert_eq!(token.len(), 7);
        assert!(token.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn flash_wraps_cycle_even_when_capture_fails() {
        let start = Instant::now();
        let mut scheduler = CaptureScheduler::new(test_settings(Duration::from_secs(5)), start);
        let mut camera = FakeCamera::empty();
        let mut transport = ScriptedTransport::returning(UploadOutcome::Success);
        let mut flash = RecordingFlash::new();

        let result = scheduler.run_now(
            start + Duration::from_secs(6),
            &mut camera,
            &mut transport,
            &mut flash,
        );
        assert_eq!(result, CycleResult::CaptureFailed);
        assert_eq!(flash.events, vec![true, false]);
        assert!(transport.sent.is_empty(), "transport must not be invoked");
    }

    #[test]
    fn transport_outcomes_map_onto_cycle_results() {
        let start = Instant::now();
        let scheduler = CaptureScheduler::new(test_settings(Duration::from_secs(5)), start);
        let request = UploadRequest::new("http://127.0.0.1:5000/upload", "B1", "image_1000.jpg");

        for (outcome, expected) in [
            (UploadOutcome::Success, CycleResult::Success),
            (
                UploadOutcome::ServerRejected(503),
                CycleResult::TransportFailed(Some(503)),
            ),
            (
                UploadOutcome::TransportFailure("connection refused".into()),
                CycleResult::TransportFailed(None),
            ),
        ] {
            let mut camera = FakeCamera::with_frame(b"jpeg");
            let mut transport = ScriptedTransport::returning(outcome);
            let mut flash = RecordingFlash::new();
            let result = scheduler.run_cycle(&request, &mut camera, &mut transport, &mut flash);
            assert_eq!(result, expected);
            assert_eq!(camera.released, 1);
        }
    }
}
