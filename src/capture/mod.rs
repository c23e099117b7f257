//! Camera frame sources.
//!
//! This module provides the camera backends behind the `CameraDriver` seam:
//! - Stub camera (`stub://<name>`): deterministic synthetic JPEG frames for
//!   tests and dev runs
//! - Spool camera (`spool://<dir>` or a bare directory path): newest JPEG
//!   dropped into a spool directory by an external capture process
//!
//! All backends hand out `Frame` instances through acquire/release with at
//! most one frame outstanding at a time.
//!
//! The capture layer is responsible for:
//! - Producing already-compressed frames (JPEG magic checked where possible)
//! - Recycling buffers when frames are released
//!
//! The capture layer MUST NOT:
//! - Upload or encode anything itself
//! - Hand the same frame out twice

pub mod spool;
pub mod stub;

pub use spool::SpoolCamera;
pub use stub::StubCamera;

use anyhow::{anyhow, Result};

use crate::frame::{CameraDriver, Frame};

/// Camera selected from a URL-style spec string at startup.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Stub(StubCamera),
    Spool(SpoolCamera),
}

impl CameraSource {
    pub fn open(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(anyhow!("camera spec is empty"));
        }
        let backend = if let Some(name) = spec.strip_prefix("stub://") {
            CameraBackend::Stub(StubCamera::new(name))
        } else if let Some(dir) = spec.strip_prefix("spool://") {
            CameraBackend::Spool(SpoolCamera::at(dir))
        } else if !spec.contains("://") {
            CameraBackend::Spool(SpoolCamera::at(spec))
        } else {
            return Err(anyhow!(
                "unsupported camera scheme in '{}'; expected stub:// or spool://",
                spec
            ));
        };
        Ok(Self { backend })
    }

    /// Probe the backend once at startup.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Stub(camera) => camera.connect(),
            CameraBackend::Spool(camera) => camera.connect(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Stub(camera) => camera.is_healthy(),
            CameraBackend::Spool(camera) => camera.is_healthy(),
        }
    }

    /// Get capture statistics.
    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Stub(camera) => camera.stats(),
            CameraBackend::Spool(camera) => camera.stats(),
        }
    }
}

impl CameraDriver for CameraSource {
    fn acquire(&mut self) -> Option<Frame> {
        match &mut self.backend {
            CameraBackend::Stub(camera) => camera.acquire(),
            CameraBackend::Spool(camera) => camera.acquire(),
        }
    }

    fn release(&mut self, frame: Frame) {
        match &mut self.backend {
            CameraBackend::Stub(camera) => camera.release(frame),
            CameraBackend::Spool(camera) => camera.release(frame),
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Cheap JPEG shape check: SOI marker at the start, EOI at the end.
pub(crate) fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes.starts_with(&[0xFF, 0xD8]) && bytes.ends_with(&[0xFF, 0xD9])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_dispatches_on_scheme() {
        assert!(CameraSource::open("stub://cam0").is_ok());
        assert!(CameraSource::open("spool:///var/spool/cam").is_ok());
        assert!(CameraSource::open("/var/spool/cam").is_ok());
        assert!(CameraSource::open("rtsp://host/stream").is_err());
        assert!(CameraSource::open("").is_err());
    }

    #[test]
    fn jpeg_shape_check() {
        assert!(looks_like_jpeg(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]));
        assert!(looks_like_jpeg(&[0xFF, 0xD8, 0xFF, 0xD9]));
        assert!(!looks_like_jpeg(&[0xFF, 0xD8, 0x00]));
        assert!(!looks_like_jpeg(b"not a jpeg"));
        assert!(!looks_like_jpeg(&[]));
    }
}
