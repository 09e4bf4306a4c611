use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use super::video_track::TrackRegistry;
use crate::shared::frame::Frame;

/// Starting a camera failed; fatal to starting a proctoring session.
#[derive(Error, Debug)]
pub enum DeviceAccessError {
    #[error("camera permission denied for {device}")]
    PermissionDenied { device: String },
    #[error("no camera device found: {device}")]
    NoDevice { device: String },
    #[error("failed to open camera {device}: {reason}")]
    Open { device: String, reason: String },
}

/// Reading a single frame failed after a successful start.
#[derive(Error, Debug)]
pub enum FrameReadError {
    #[error("frame source not started")]
    NotStarted,
    /// The device stopped producing frames; its track has been ended.
    #[error("camera disconnected: {0}")]
    Disconnected(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

/// "Camera granted" flag written by the frame source. The lockdown
/// enforcer's camera watch does not instrument tracks until it is set.
#[derive(Clone, Debug, Default)]
pub struct CameraGrant {
    granted: Arc<AtomicBool>,
}

impl CameraGrant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    pub fn is_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

/// Shared media handles a frame source publishes into.
#[derive(Clone, Default)]
pub struct MediaContext {
    pub grant: CameraGrant,
    pub tracks: TrackRegistry,
}

impl MediaContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Owns a camera stream and hands decoded frames to a single consumer.
pub trait FrameSource: Send {
    /// Acquires the device at its configured resolution.
    fn start(&mut self) -> Result<(), DeviceAccessError>;

    /// Next decoded frame, or `Ok(None)` when none is ready yet; the caller
    /// skips this tick and retries on the next one.
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameReadError>;

    /// Releases the device. Idempotent.
    fn stop(&mut self);

    fn is_started(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_grant_is_shared() {
        let grant = CameraGrant::new();
        let seen_by_lockdown = grant.clone();
        assert!(!seen_by_lockdown.is_granted());
        grant.set(true);
        assert!(seen_by_lockdown.is_granted());
    }

    #[test]
    fn test_device_errors_are_readable() {
        let err = DeviceAccessError::PermissionDenied {
            device: "/dev/video0".into(),
        };
        assert_eq!(err.to_string(), "camera permission denied for /dev/video0");
    }
}
