//! Synthetic camera backend (`stub://`).
//!
//! Produces deterministic JPEG-shaped frames without hardware. Used by tests
//! and by dev runs against a local upload endpoint.

use anyhow::Result;

use super::CameraStats;
use crate::frame::{CameraDriver, Frame};

const BASE_BODY_LEN: usize = 1024;

/// Deterministic synthetic camera.
///
/// Enforces the driver contract of at most one outstanding frame: `acquire`
/// returns `None` while a frame is out, which upstream treats as a capture
/// failure rather than a fault.
pub struct StubCamera {
    name: String,
    sequence: u64,
    outstanding: bool,
}

impl StubCamera {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequence: 0,
            outstanding: false,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        log::info!("camera: connected to {} (synthetic)", self.name);
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        true
    }

    pub fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.sequence,
            source: format!("stub://{}", self.name),
        }
    }

    fn synthesize(&self, sequence: u64) -> Vec<u8> {
        let body_len = BASE_BODY_LEN + (sequence as usize % 7) * 128;
        let mut data = Vec::with_capacity(body_len + 4);
        data.extend_from_slice(&[0xFF, 0xD8]);
        for i in 0..body_len {
            data.push(((i as u64).wrapping_mul(31).wrapping_add(sequence * 7) % 251) as u8);
        }
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }
}

impl CameraDriver for StubCamera {
    fn acquire(&mut self) -> Option<Frame> {
        if self.outstanding {
            return None;
        }
        self.sequence += 1;
        self.outstanding = true;
        Some(Frame::new(self.synthesize(self.sequence), self.sequence))
    }

    fn release(&mut self, _frame: Frame) {
        self.outstanding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::looks_like_jpeg;

    #[test]
    fn frames_are_deterministic_per_sequence() {
        let mut first = StubCamera::new("cam0");
        let mut second = StubCamera::new("cam0");

        let a = first.acquire().unwrap();
        let b = second.acquire().unwrap();
        assert_eq!(a.bytes(), b.bytes());
        assert_eq!(a.sequence(), 1);
    }

    #[test]
    fn frames_pass_the_jpeg_shape_check() {
        let mut camera = StubCamera::new("cam0");
        let frame = camera.acquire().unwrap();
        assert!(looks_like_jpeg(frame.bytes()));
    }

    #[test]
    fn at_most_one_frame_outstanding() {
        let mut camera = StubCamera::new("cam0");
        let frame = camera.acquire().unwrap();
        assert!(camera.acquire().is_none());

        camera.release(frame);
        let next = camera.acquire().unwrap();
        assert_eq!(next.sequence(), 2);
    }

    #[test]
    fn stats_track_capture_count() {
        let mut camera = StubCamera::new("cam0");
        let frame = camera.acquire().unwrap();
        camera.release(frame);
        let stats = camera.stats();
        assert_eq!(stats.frames_captured, 1);
        assert_eq!(stats.source, "stub://cam0");
    }
}
