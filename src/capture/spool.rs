//! Spool-directory camera backend (`spool://`).
//!
//! An external capture process drops finished JPEG files into a spool
//! directory; `acquire` hands out the newest one and `release` deletes it,
//! so every file is handed out at most once. Files that fail the JPEG shape
//! check are left alone while fresh (they may still be mid-write) and
//! removed once older than a grace period.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context, Result};

use super::{looks_like_jpeg, CameraStats};
use crate::frame::{CameraDriver, Frame};

/// Age past which a malformed spool file counts as abandoned.
const DEFAULT_STALE_GRACE: Duration = Duration::from_secs(2);

pub struct SpoolCamera {
    dir: PathBuf,
    stale_grace: Duration,
    sequence: u64,
    /// Path backing the outstanding frame, if one is out.
    current: Option<PathBuf>,
}

impl SpoolCamera {
    pub fn new(dir: impl Into<PathBuf>, stale_grace: Duration) -> Self {
        Self {
            dir: dir.into(),
            stale_grace,
            sequence: 0,
            current: None,
        }
    }

    /// Spool camera with the default abandoned-file grace.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, DEFAULT_STALE_GRACE)
    }

    pub fn connect(&mut self) -> Result<()> {
        let meta = fs::metadata(&self.dir)
            .with_context(|| format!("open spool directory {}", self.dir.display()))?;
        if !meta.is_dir() {
            return Err(anyhow!("spool path {} is not a directory", self.dir.display()));
        }
        log::info!(
            "camera: spooling from {} ({} file(s) waiting)",
            self.dir.display(),
            self.candidates().len()
        );
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.sequence,
            source: format!("spool://{}", self.dir.display()),
        }
    }

    /// JPEG candidates, newest first.
    fn candidates(&self) -> Vec<(PathBuf, SystemTime)> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut files: Vec<(PathBuf, SystemTime)> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| has_jpeg_extension(path))
            .filter_map(|path| {
                let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
                Some((path, modified))
            })
            .collect();
        files.sort_by(|a, b| b.1.cmp(&a.1));
        files
    }
}

fn has_jpeg_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}

impl CameraDriver for SpoolCamera {
    fn acquire(&mut self) -> Option<Frame> {
        if self.current.is_some() {
            return None;
        }
        for (path, modified) in self.candidates() {
            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(err) => {
                    log::debug!("spool: read of {} failed: {err}", path.display());
                    continue;
                }
            };
            if looks_like_jpeg(&data) {
                self.sequence += 1;
                self.current = Some(path);
                return Some(Frame::new(data, self.sequence));
            }
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default();
            if age > self.stale_grace {
                log::warn!("spool: removing malformed file {}", path.display());
                let _ = fs::remove_file(&path);
            }
        }
        None
    }

    fn release(&mut self, frame: Frame) {
        drop(frame);
        if let Some(path) = self.current.take() {
            if let Err(err) = fs::remove_file(&path) {
                log::debug!("spool: cleanup of {} failed: {err}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    const GOOD_JPEG: [u8; 6] = [0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9];

    #[test]
    fn acquire_picks_newest_jpeg_and_release_deletes_it() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("old.jpg"), GOOD_JPEG).unwrap();
        thread::sleep(Duration::from_millis(20));
        fs::write(dir.path().join("new.jpg"), GOOD_JPEG).unwrap();

        let mut camera = SpoolCamera::at(dir.path());
        camera.connect().unwrap();

        let frame = camera.acquire().unwrap();
        assert_eq!(frame.bytes(), GOOD_JPEG);
        assert!(camera.acquire().is_none(), "one frame outstanding at most");

        camera.release(frame);
        assert!(!dir.path().join("new.jpg").exists());
        assert!(dir.path().join("old.jpg").exists());
    }

    #[test]
    fn empty_directory_yields_no_frame() {
        let dir = tempdir().unwrap();
        let mut camera = SpoolCamera::at(dir.path());
        assert!(camera.acquire().is_none());
    }

    #[test]
    fn fresh_malformed_file_is_skipped_not_deleted() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("partial.jpg");
        fs::write(&bad, b"not finished").unwrap();

        let mut camera = SpoolCamera::at(dir.path());
        assert!(camera.acquire().is_none());
        assert!(bad.exists());
    }

    #[test]
    fn abandoned_malformed_file_is_removed() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("abandoned.jpg");
        fs::write(&bad, b"truncated").unwrap();
        thread::sleep(Duration::from_millis(20));

        let mut camera = SpoolCamera::new(dir.path(), Duration::ZERO);
        assert!(camera.acquire().is_none());
        assert!(!bad.exists());
    }

    #[test]
    fn malformed_newest_does_not_hide_older_good_frame() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("good.jpg"), GOOD_JPEG).unwrap();
        thread::sleep(Duration::from_millis(20));
        fs::write(dir.path().join("bad.jpg"), b"mid-write").unwrap();

        let mut camera = SpoolCamera::at(dir.path());
        let frame = camera.acquire().unwrap();
        assert_eq!(frame.bytes(), GOOD_JPEG);
        camera.release(frame);
        assert!(dir.path().join("bad.jpg").exists());
    }

    #[test]
    fn non_jpeg_extensions_are_ignored() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("note.txt"), GOOD_JPEG).unwrap();
        let mut camera = SpoolCamera::at(dir.path());
        assert!(camera.acquire().is_none());
    }

    #[test]
    fn connect_requires_a_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let mut camera = SpoolCamera::at(&missing);
        assert!(camera.connect().is_err());
        assert!(!camera.is_healthy());
    }
}
