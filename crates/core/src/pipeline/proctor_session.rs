use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::camera::domain::frame_source::{DeviceAccessError, FrameSource, MediaContext};
use crate::detection::domain::landmark_detector::{LandmarkDetector, ModelLoadError};
use crate::detection::domain::object_detector::{Detection, ObjectDetector};
use crate::lockdown::camera_watch::WatchTimings;
use crate::lockdown::domain::integrity_event::{
    DisplayController, IntegrityEventSource, LockdownError,
};
use crate::lockdown::domain::lockdown_state::LockdownState;
use crate::lockdown::lockdown_enforcer::LockdownEnforcer;
use crate::monitoring::domain::proctor_stats::ProctorStats;
use crate::monitoring::domain::violation::{LockdownIncident, Violation};
use crate::monitoring::domain::violation_aggregator::{AggregatorSnapshot, ViolationAggregator};
use crate::pipeline::detection_loop::{DetectionLoop, LiveView};
use crate::pipeline::session_observer::{NullSessionObserver, SessionObserver};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::frame::Frame;

const DEFAULT_IDLE: Duration = Duration::from_millis(33);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera unavailable: {0}")]
    DeviceAccess(#[from] DeviceAccessError),
    #[error("face model unavailable: {0}")]
    ModelLoad(#[from] ModelLoadError),
}

/// Host capabilities the lockdown enforcer needs.
pub struct LockdownHost {
    pub events: Arc<dyn IntegrityEventSource>,
    pub display: Arc<dyn DisplayController>,
    /// Grant flag and tracks published by the session's frame source.
    pub media: MediaContext,
    pub timings: WatchTimings,
}

/// Everything a session owns for its lifetime.
pub struct SessionParts {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn LandmarkDetector>,
    pub objects: Option<Box<dyn ObjectDetector>>,
    /// `None` runs without lockdown.
    pub lockdown: Option<LockdownHost>,
    pub observer: Box<dyn SessionObserver>,
    pub clock: Arc<dyn Clock>,
    /// Sleep between ticks that produced no frame.
    pub idle: Duration,
}

impl SessionParts {
    pub fn new(source: Box<dyn FrameSource>, detector: Box<dyn LandmarkDetector>) -> Self {
        Self {
            source,
            detector,
            objects: None,
            lockdown: None,
            observer: Box::new(NullSessionObserver),
            clock: Arc::new(SystemClock),
            idle: DEFAULT_IDLE,
        }
    }
}

/// One proctoring session: model and camera, detection loop thread,
/// aggregator and optional lockdown.
///
/// `stop` releases everything in a fixed order and also runs on drop.
pub struct ProctorSession {
    aggregator: Arc<ViolationAggregator>,
    view: Arc<LiveView>,
    lockdown: Option<LockdownEnforcer>,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<DetectionLoop>>,
}

impl ProctorSession {
    /// Loads the model, starts the camera, arms lockdown and spawns the
    /// detection loop. On failure everything acquired so far is released.
    pub fn start(parts: SessionParts) -> Result<Self, SessionError> {
        let SessionParts {
            mut source,
            mut detector,
            objects,
            lockdown,
            observer,
            clock,
            idle,
        } = parts;

        detector.load()?;
        if let Err(e) = source.start() {
            detector.dispose();
            return Err(e.into());
        }

        let aggregator = Arc::new(ViolationAggregator::new(clock));
        let view = Arc::new(LiveView::new());

        let lockdown = lockdown.map(|host| {
            let mut enforcer =
                LockdownEnforcer::new(host.events, host.display, host.media, aggregator.clone())
                    .with_timings(host.timings);
            enforcer.arm();
            enforcer
        });

        let cancelled = Arc::new(AtomicBool::new(false));
        let detection_loop =
            DetectionLoop::new(source, detector, aggregator.clone(), view.clone(), observer)
                .with_objects(objects);
        let c = cancelled.clone();
        let handle = std::thread::spawn(move || detection_loop.run(c, idle));

        log::info!("Proctoring session started");
        Ok(Self {
            aggregator,
            view,
            lockdown,
            cancelled,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Idempotent teardown: cancel and join the loop, disarm lockdown, stop
    /// the camera, dispose the model, clear overlay and warning.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.cancelled.store(true, Ordering::SeqCst);
        let detection_loop = handle.join();

        if let Some(enforcer) = self.lockdown.as_mut() {
            enforcer.disarm();
        }
        match detection_loop {
            Ok(detection_loop) => detection_loop.release(),
            Err(_) => log::error!("Detection loop panicked; camera and model dropped unreleased"),
        }
        self.view.clear();
        self.aggregator.clear_warning();
        log::info!("Proctoring session stopped");
    }

    pub fn stats(&self) -> ProctorStats {
        self.aggregator.stats()
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.aggregator.violations()
    }

    pub fn incidents(&self) -> Vec<LockdownIncident> {
        self.aggregator.incidents()
    }

    pub fn current_warning(&self) -> Option<String> {
        self.aggregator.current_warning()
    }

    pub fn snapshot(&self) -> AggregatorSnapshot {
        self.aggregator.snapshot()
    }

    pub fn aggregator(&self) -> &Arc<ViolationAggregator> {
        &self.aggregator
    }

    /// `None` when the session runs without lockdown.
    pub fn lockdown_state(&self) -> Option<LockdownState> {
        self.lockdown.as_ref().map(LockdownEnforcer::state)
    }

    pub fn is_paused(&self) -> bool {
        self.lockdown.as_ref().is_some_and(LockdownEnforcer::is_paused)
    }

    /// Manual re-arm after a pause.
    pub fn request_fullscreen(&self) -> Result<(), LockdownError> {
        self.lockdown
            .as_ref()
            .ok_or(LockdownError::DisplayUnavailable)?
            .request_fullscreen()
    }

    /// Face boxes of the last analysed frame, in pixels.
    pub fn overlay(&self) -> Vec<BoundingBox> {
        self.view.overlay()
    }

    pub fn detections(&self) -> Vec<Detection> {
        self.view.detections()
    }

    /// Latest analysed frame, for escalation.
    pub fn capture_frame(&self) -> Option<Frame> {
        self.view.latest_frame()
    }
}

impl Drop for ProctorSession {
    fn drop(&mut self) {
        self.stop();
    }
}
