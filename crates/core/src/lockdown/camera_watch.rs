//! Camera-liveness watch: finds live video tracks and attaches one
//! ended-listener per track, rescanning while none is live.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};

use crate::camera::domain::frame_source::MediaContext;
use crate::camera::domain::video_track::TrackId;
use crate::shared::constants::{TRACK_RESCAN_INTERVAL_MS, TRACK_SCAN_INITIAL_DELAY_MS};
use crate::shared::subscription::SubscriptionSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchTimings {
    pub initial_delay: Duration,
    pub rescan_interval: Duration,
}

impl Default for WatchTimings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(TRACK_SCAN_INITIAL_DELAY_MS),
            rescan_interval: Duration::from_millis(TRACK_RESCAN_INTERVAL_MS),
        }
    }
}

pub type TrackCallback = Arc<dyn Fn(TrackId) + Send + Sync>;

/// Instruments live tracks, at most once per track id. Nothing is
/// instrumented before the frame source has been granted the camera.
pub struct TrackScanner {
    media: MediaContext,
    instrumented: HashSet<TrackId>,
    listeners: SubscriptionSet,
    on_ended: TrackCallback,
    on_instrumented: TrackCallback,
}

impl TrackScanner {
    pub fn new(
        media: MediaContext,
        on_ended: TrackCallback,
        on_instrumented: TrackCallback,
    ) -> Self {
        Self {
            media,
            instrumented: HashSet::new(),
            listeners: SubscriptionSet::new(),
            on_ended,
            on_instrumented,
        }
    }

    /// Attaches listeners to newly seen live tracks. Returns how many live
    /// tracks exist, or 0 while the camera is not granted.
    pub fn scan(&mut self) -> usize {
        if !self.media.grant.is_granted() {
            log::debug!("Camera not granted yet; skipping track scan");
            return 0;
        }
        let live = self.media.tracks.live_tracks();
        for track in &live {
            if !self.instrumented.insert(track.id()) {
                continue;
            }
            self.listeners.add(track.on_ended(self.on_ended.clone()));
            log::info!("Watching camera track {} ({})", track.id(), track.label());
            (self.on_instrumented)(track.id());
        }
        live.len()
    }

    pub fn instrumented_count(&self) -> usize {
        self.instrumented.len()
    }

    pub fn detach_all(&mut self) {
        self.listeners.clear();
        self.instrumented.clear();
    }
}

/// Background thread running a `TrackScanner`.
///
/// Scans after the initial delay, then every rescan interval while no live
/// track exists. Once a track is watched, the thread sleeps until woken
/// (a track ended) or stopped.
pub struct CameraWatch {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CameraWatch {
    pub fn spawn(scanner: TrackScanner, wake_rx: Receiver<()>, timings: WatchTimings) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = std::thread::spawn(move || watch_loop(scanner, stop_rx, wake_rx, timings));
        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Cancels pending scans, detaches every listener and joins the thread.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread.
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Camera watch thread panicked");
            }
        }
    }
}

impl Drop for CameraWatch {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(
    mut scanner: TrackScanner,
    stop_rx: Receiver<()>,
    wake_rx: Receiver<()>,
    timings: WatchTimings,
) {
    let mut delay = timings.initial_delay;
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            default(delay) => {}
        }
        delay = timings.rescan_interval;

        if scanner.scan() == 0 {
            log::debug!("No live camera track, rescanning in {delay:?}");
            continue;
        }

        select! {
            recv(stop_rx) -> _ => break,
            recv(wake_rx) -> msg => {
                if msg.is_err() {
                    break;
                }
            }
        }
        // Drain wakes queued by several tracks ending at once.
        while wake_rx.try_recv().is_ok() {}
    }
    scanner.detach_all();
}
