use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::camera::domain::frame_source::FrameSource;
use crate::detection::domain::landmark_detector::LandmarkDetector;
use crate::detection::domain::object_detector::{Detection, ObjectDetector};
use crate::monitoring::domain::heuristic_classifier::{classify, FrameCounters};
use crate::monitoring::domain::violation::Violation;
use crate::monitoring::domain::violation_aggregator::ViolationAggregator;
use crate::pipeline::session_observer::SessionObserver;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Latest per-frame outputs, readable from the host while the loop runs.
#[derive(Default)]
pub struct LiveView {
    overlay: Mutex<Vec<BoundingBox>>,
    detections: Mutex<Vec<Detection>>,
    latest: Mutex<Option<Frame>>,
}

impl LiveView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Face boxes of the last analysed frame, in pixels.
    pub fn overlay(&self) -> Vec<BoundingBox> {
        self.overlay.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn detections(&self) -> Vec<Detection> {
        self.detections.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.latest.lock().ok().and_then(|f| f.clone())
    }

    fn publish(&self, frame: Frame, overlay: Vec<BoundingBox>) {
        if let Ok(mut o) = self.overlay.lock() {
            *o = overlay;
        }
        if let Ok(mut l) = self.latest.lock() {
            *l = Some(frame);
        }
    }

    fn publish_detections(&self, detections: Vec<Detection>) {
        if let Ok(mut d) = self.detections.lock() {
            *d = detections;
        }
    }

    pub fn clear(&self) {
        if let Ok(mut o) = self.overlay.lock() {
            o.clear();
        }
        if let Ok(mut d) = self.detections.lock() {
            d.clear();
        }
        if let Ok(mut l) = self.latest.lock() {
            *l = None;
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Nothing decodable this tick; the caller sleeps and retries.
    NoFrame,
    Analyzed {
        faces: usize,
        violation: Option<Violation>,
    },
    /// Detection failed on this frame; the loop continues.
    DetectionFailed,
}

/// One session's cooperative detection loop. Each `tick` reads at most one
/// frame and runs it through detection, classification and aggregation.
pub struct DetectionLoop {
    source: Box<dyn FrameSource>,
    detector: Box<dyn LandmarkDetector>,
    objects: Option<Box<dyn ObjectDetector>>,
    aggregator: Arc<ViolationAggregator>,
    view: Arc<LiveView>,
    observer: Box<dyn SessionObserver>,
    counters: FrameCounters,
}

impl DetectionLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn LandmarkDetector>,
        aggregator: Arc<ViolationAggregator>,
        view: Arc<LiveView>,
        observer: Box<dyn SessionObserver>,
    ) -> Self {
        Self {
            source,
            detector,
            objects: None,
            aggregator,
            view,
            observer,
            counters: FrameCounters::default(),
        }
    }

    pub fn with_objects(mut self, objects: Option<Box<dyn ObjectDetector>>) -> Self {
        self.objects = objects;
        self
    }

    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    pub fn tick(&mut self) -> TickOutcome {
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) if frame.is_decodable() => frame,
            Ok(_) => return TickOutcome::NoFrame,
            Err(e) => {
                log::debug!("Frame read failed: {e}");
                return TickOutcome::NoFrame;
            }
        };

        let start = Instant::now();
        let faces = match self.detector.detect(&frame) {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!("Face detection failed on frame {}: {e}", frame.index());
                return TickOutcome::DetectionFailed;
            }
        };
        self.observer
            .timing("landmarks", start.elapsed().as_secs_f64() * 1000.0);

        let signal = classify(&faces, &mut self.counters);
        let violation = signal.and_then(|s| self.aggregator.record(s.kind, s.message));
        if let Some(v) = &violation {
            self.observer.violation(v);
        }

        if let Some(objects) = self.objects.as_mut() {
            let start = Instant::now();
            match objects.detect(&frame) {
                Ok(detections) => self.view.publish_detections(detections),
                Err(e) => log::debug!("Object detection failed on frame {}: {e}", frame.index()),
            }
            self.observer
                .timing("objects", start.elapsed().as_secs_f64() * 1000.0);
        }

        let overlay = faces
            .iter()
            .map(|f| f.pixel_bbox(frame.width(), frame.height()))
            .collect();
        self.observer.frame(frame.index(), faces.len());
        self.view.publish(frame, overlay);

        TickOutcome::Analyzed {
            faces: faces.len(),
            violation,
        }
    }

    /// Ticks until `cancelled` is set, sleeping `idle` after ticks without a
    /// frame. Returns the loop so its resources can be released in order.
    pub fn run(mut self, cancelled: Arc<AtomicBool>, idle: Duration) -> Self {
        while !cancelled.load(Ordering::Relaxed) {
            if self.tick() == TickOutcome::NoFrame {
                std::thread::sleep(idle);
            }
        }
        self
    }

    /// Stops the camera and disposes the models.
    pub fn release(mut self) {
        self.source.stop();
        self.detector.dispose();
        self.observer.summary();
    }
}
