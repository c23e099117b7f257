//! Camera frame ownership layer.
//!
//! This module enforces the single-owner frame discipline at the type level.
//!
//! - `Frame`: one captured, already-compressed image buffer. Driver-owned
//!   until acquired, then exclusively owned by the cycle that holds it.
//! - `CameraDriver`: the acquire/release seam every camera backend implements.
//! - `FrameGuard`: scoped acquisition. Releasing the frame back to the driver
//!   happens in `Drop`, so every exit path of a cycle releases exactly once.
//!
//! A frame is never cloned and never released twice: `release` consumes the
//! `Frame` value, and the guard is the only component that calls it.

use std::fmt;

// ----------------------------------------------------------------------------
// Frame: opaque compressed-image buffer
// ----------------------------------------------------------------------------

/// One captured image as an opaque compressed byte region.
///
/// The buffer is read-only for consumers; only the owning driver may recycle
/// it, which it does when `CameraDriver::release` hands the frame back.
pub struct Frame {
    /// Compressed image bytes (typically JPEG). Private; consumers go
    /// through `bytes()`.
    data: Vec<u8>,

    /// Monotonic capture counter assigned by the driver.
    sequence: u64,
}

impl Frame {
    /// Wrap driver-produced bytes. Only camera backends mint frames.
    pub fn new(data: Vec<u8>, sequence: u64) -> Self {
        Self { data, sequence }
    }

    /// Read-only view of the image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Byte length of the compressed image.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Capture counter, used for log lines and spool bookkeeping.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("len", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// CameraDriver: the acquire/release seam
// ----------------------------------------------------------------------------

/// Acquire/release contract every camera backend implements.
///
/// Guarantees required of implementations:
/// - At most one outstanding frame per `acquire` call.
/// - The buffer stays valid until `release` hands it back.
///
/// Guarantees required of callers (upheld by `FrameGuard`):
/// - `release` is called exactly once per successful `acquire`, never for a
///   frame the driver did not hand out.
pub trait CameraDriver {
    /// Capture one frame. `None` means the hardware is busy or unavailable;
    /// the caller treats that as a recoverable per-cycle failure.
    fn acquire(&mut self) -> Option<Frame>;

    /// Return a frame to the driver for recycling.
    fn release(&mut self, frame: Frame);
}

// ----------------------------------------------------------------------------
// FrameGuard: scoped acquisition
// ----------------------------------------------------------------------------

/// Holds an acquired frame together with the driver it came from and releases
/// it on drop. The upload cycle keeps the guard alive across encode and
/// transport so the release lands after the attempt, success or not.
pub struct FrameGuard<'a> {
    driver: &'a mut dyn CameraDriver,
    frame: Option<Frame>,
}

impl<'a> FrameGuard<'a> {
    /// Acquire a frame from `driver`. `None` propagates acquisition failure.
    pub fn acquire(driver: &'a mut dyn CameraDriver) -> Option<Self> {
        let frame = driver.acquire()?;
        Some(Self {
            driver,
            frame: Some(frame),
        })
    }

    /// Image bytes of the held frame.
    pub fn bytes(&self) -> &[u8] {
        match &self.frame {
            Some(frame) => frame.bytes(),
            None => &[],
        }
    }

    /// Byte length of the held frame.
    pub fn len(&self) -> usize {
        self.frame.as_ref().map_or(0, Frame::len)
    }

    /// Capture counter of the held frame.
    pub fn sequence(&self) -> u64 {
        self.frame.as_ref().map_or(0, Frame::sequence)
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.driver.release(frame);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
