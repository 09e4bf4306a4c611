use std::collections::HashMap;
use std::time::Instant;

use crate::monitoring::domain::violation::{Violation, ViolationKind};

/// Observer for detection-loop events.
///
/// Keeps the loop free of output concerns: the CLI logs and summarises,
/// tests and embedding hosts stay silent.
pub trait SessionObserver: Send {
    /// One frame went through detection with `faces` faces found.
    fn frame(&mut self, index: usize, faces: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A violation passed the debounce and was counted.
    fn violation(&mut self, violation: &Violation);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards every event.
pub struct NullSessionObserver;

impl SessionObserver for NullSessionObserver {
    fn frame(&mut self, _index: usize, _faces: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn violation(&mut self, _violation: &Violation) {}
}

/// Logs violations as they happen and keeps per-stage timings for an
/// end-of-session report. Frame progress is logged every
/// `throttle_frames` frames.
pub struct LogSessionObserver {
    throttle_frames: usize,
    timings: HashMap<String, Vec<f64>>,
    violations: HashMap<ViolationKind, usize>,
    start_time: Instant,
    frames: usize,
    frames_with_faces: usize,
}

impl LogSessionObserver {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            violations: HashMap::new(),
            start_time: Instant::now(),
            frames: 0,
            frames_with_faces: 0,
        }
    }

    /// Formatted report, or `None` before the first frame.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames == 0 {
            return None;
        }
        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Session summary ({} frames, {} with a face, {elapsed_s:.1}s):",
            self.frames, self.frames_with_faces
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            lines.push(format!("  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"));
        }

        for kind in ViolationKind::ALL {
            if let Some(count) = self.violations.get(&kind) {
                lines.push(format!("  {}: {count}", kind.as_str()));
            }
        }

        if elapsed_s > 0.0 {
            lines.push(format!("  Throughput: {:.1} fps", self.frames as f64 / elapsed_s));
        }
        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn violation_count(&self, kind: ViolationKind) -> usize {
        self.violations.get(&kind).copied().unwrap_or(0)
    }
}

impl Default for LogSessionObserver {
    fn default() -> Self {
        Self::new(300)
    }
}

impl SessionObserver for LogSessionObserver {
    fn frame(&mut self, index: usize, faces: usize) {
        self.frames += 1;
        if faces > 0 {
            self.frames_with_faces += 1;
        }
        if self.frames % self.throttle_frames == 0 {
            log::info!("Frame {index}: {faces} face(s)");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn violation(&mut self, violation: &Violation) {
        *self.violations.entry(violation.kind).or_default() += 1;
        log::warn!("{}: {}", violation.kind.as_str(), violation.message);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
