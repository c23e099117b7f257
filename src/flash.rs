//! Flash indicator control.
//!
//! The flash is a trivial side-actuator sequenced by the capture scheduler:
//! on before acquisition, off before the cycle ends. The contract is
//! fire-and-forget; a flash that fails to switch never fails a cycle, so
//! write errors are logged at debug and dropped.

use std::fs;
use std::path::{Path, PathBuf};

pub trait FlashIndicator {
    /// Engage or disengage the flash.
    fn set(&mut self, on: bool);
}

/// GPIO-backed flash writing `1`/`0` to a sysfs value file,
/// e.g. `/sys/class/gpio/gpio4/value` or a `leds` brightness node.
pub struct SysfsFlash {
    path: PathBuf,
}

impl SysfsFlash {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FlashIndicator for SysfsFlash {
    fn set(&mut self, on: bool) {
        let value: &[u8] = if on { b"1" } else { b"0" };
        if let Err(err) = fs::write(&self.path, value) {
            log::debug!("flash write to {} failed: {err}", self.path.display());
        }
    }
}

/// Stand-in for nodes without a flash wired up.
pub struct NullFlash;

impl FlashIndicator for NullFlash {
    fn set(&mut self, _on: bool) {}
}

/// Pick the flash backend for the configured GPIO path, if any.
pub fn open(path: Option<&Path>) -> Box<dyn FlashIndicator> {
    match path {
        Some(path) => {
            log::info!("flash indicator: {}", path.display());
            Box::new(SysfsFlash::new(path))
        }
        None => {
            log::debug!("flash indicator: none configured");
            Box::new(NullFlash)
        }
    }
}
