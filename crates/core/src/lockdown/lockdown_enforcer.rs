use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::camera::domain::frame_source::MediaContext;
use crate::camera::domain::video_track::TrackId;
use crate::lockdown::camera_watch::{CameraWatch, TrackCallback, TrackScanner, WatchTimings};
use crate::lockdown::domain::integrity_event::{
    DisplayController, EventDisposition, EventKind, IntegrityEvent, IntegrityEventSource,
    LockdownError,
};
use crate::lockdown::domain::lockdown_state::LockdownState;
use crate::monitoring::domain::violation::{LockdownViolation, ViolationKind};
use crate::monitoring::domain::violation_aggregator::ViolationSink;
use crate::shared::subscription::SubscriptionSet;

struct Shared {
    state: Mutex<LockdownState>,
    sink: Arc<dyn ViolationSink>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LockdownState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update<R>(&self, f: impl FnOnce(&mut LockdownState) -> R) -> R {
        f(&mut self.lock())
    }

    fn report(&self, kind: LockdownViolation) {
        log::debug!("Reporting {kind} to the aggregator");
        self.sink.lockdown(kind, kind.default_message());
    }
}

/// Enforces fullscreen, blocks the context menu, reports tab switches and
/// pauses the session when the camera track ends.
///
/// Host events arrive through an `IntegrityEventSource`; handlers can run on
/// any thread. Every state transition happens under one lock, and reports
/// to the sink are made after the lock is released.
pub struct LockdownEnforcer {
    shared: Arc<Shared>,
    events: Arc<dyn IntegrityEventSource>,
    display: Arc<dyn DisplayController>,
    media: MediaContext,
    timings: WatchTimings,
    subscriptions: SubscriptionSet,
    watch: Option<CameraWatch>,
}

impl LockdownEnforcer {
    pub fn new(
        events: Arc<dyn IntegrityEventSource>,
        display: Arc<dyn DisplayController>,
        media: MediaContext,
        sink: Arc<dyn ViolationSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LockdownState::default()),
                sink,
            }),
            events,
            display,
            media,
            timings: WatchTimings::default(),
            subscriptions: SubscriptionSet::new(),
            watch: None,
        }
    }

    pub fn with_timings(mut self, timings: WatchTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Subscribes to host events, requests fullscreen and starts watching the
    /// camera. A denied fullscreen request is logged and arming continues.
    /// Arming an armed enforcer is a no-op.
    pub fn arm(&mut self) {
        if self.is_armed() {
            return;
        }
        *self.shared.lock() = LockdownState::armed();

        let weak = Arc::downgrade(&self.shared);
        self.subscriptions.add(self.events.subscribe(
            EventKind::Fullscreen,
            Arc::new(move |event: &IntegrityEvent| {
                if let (IntegrityEvent::FullscreenChanged { is_full_screen }, Some(shared)) =
                    (event, weak.upgrade())
                {
                    let exit = shared.update(|s| s.on_fullscreen_changed(*is_full_screen));
                    if let Some(kind) = exit {
                        shared.report(kind);
                    }
                }
                EventDisposition::Allow
            }),
        ));

        let weak = Arc::downgrade(&self.shared);
        self.subscriptions.add(self.events.subscribe(
            EventKind::ContextMenu,
            Arc::new(move |_: &IntegrityEvent| {
                if let Some(shared) = weak.upgrade() {
                    let kind = shared.update(LockdownState::on_context_menu);
                    shared.report(kind);
                }
                EventDisposition::Suppress
            }),
        ));

        let weak = Arc::downgrade(&self.shared);
        self.subscriptions.add(self.events.subscribe(
            EventKind::Visibility,
            Arc::new(move |event: &IntegrityEvent| {
                if let (IntegrityEvent::VisibilityChanged { hidden: true }, Some(shared)) =
                    (event, weak.upgrade())
                {
                    let kind = ViolationKind::TabSwitch;
                    shared.sink.violation(kind, kind.default_message());
                }
                EventDisposition::Allow
            }),
        ));

        if let Err(e) = self.display.request_fullscreen() {
            log::warn!("Fullscreen request denied: {e}");
        }

        self.watch = Some(self.spawn_watch());
        log::info!("Lockdown armed");
    }

    fn spawn_watch(&self) -> CameraWatch {
        let (wake_tx, wake_rx) = crossbeam_channel::unbounded::<()>();

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let on_ended: TrackCallback = Arc::new(move |id: TrackId| {
            if let Some(shared) = weak.upgrade() {
                log::warn!("Camera track {id} ended");
                let kind = shared.update(LockdownState::on_track_ended);
                shared.report(kind);
            }
            let _ = wake_tx.send(());
        });

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let on_instrumented: TrackCallback = Arc::new(move |_: TrackId| {
            if let Some(shared) = weak.upgrade() {
                shared.update(LockdownState::on_track_live);
            }
        });

        let scanner = TrackScanner::new(self.media.clone(), on_ended, on_instrumented);
        CameraWatch::spawn(scanner, wake_rx, self.timings)
    }

    /// Drops every subscription and stops the camera watch. Idempotent.
    pub fn disarm(&mut self) {
        self.subscriptions.clear();
        if let Some(mut watch) = self.watch.take() {
            watch.stop();
        }
        let was_armed = self.shared.update(|s| {
            let armed = s.is_armed();
            s.disarm();
            armed
        });
        if was_armed {
            log::info!("Lockdown disarmed");
        }
    }

    /// Manual re-arm: asks for fullscreen again and, when granted, lifts the
    /// pause.
    pub fn request_fullscreen(&self) -> Result<(), LockdownError> {
        match self.display.request_fullscreen() {
            Ok(()) => {
                self.shared.update(LockdownState::on_rearmed);
                Ok(())
            }
            Err(e) => {
                log::warn!("Fullscreen request denied: {e}");
                Err(e)
            }
        }
    }

    pub fn state(&self) -> LockdownState {
        self.shared.lock().clone()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().is_paused
    }

    pub fn is_armed(&self) -> bool {
        self.shared.lock().is_armed()
    }
}

impl Drop for LockdownEnforcer {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::domain::video_track::VideoTrack;
    use crate::lockdown::domain::lockdown_state::LockdownPhase;
    use crate::lockdown::infrastructure::event_bus::EventBus;
    use crate::lockdown::infrastructure::headless_display::HeadlessDisplay;
    use crate::monitoring::domain::violation_aggregator::ViolationAggregator;
    use crate::shared::clock::ManualClock;
    use std::time::{Duration, Instant};

    struct Harness {
        bus: EventBus,
        display: Arc<HeadlessDisplay>,
        media: MediaContext,
        aggregator: Arc<ViolationAggregator>,
        clock: ManualClock,
        enforcer: LockdownEnforcer,
    }

    fn harness() -> Harness {
        let bus = EventBus::new();
        let display = Arc::new(HeadlessDisplay::new(bus.clone()));
        let media = MediaContext::new();
        media.grant.set(true);
        let clock = ManualClock::new(1_000);
        let aggregator = Arc::new(ViolationAggregator::new(Arc::new(clock.clone())));
        let enforcer = LockdownEnforcer::new(
            Arc::new(bus.clone()),
            display.clone(),
            media.clone(),
            aggregator.clone(),
        )
        .with_timings(WatchTimings {
            initial_delay: Duration::from_millis(10),
            rescan_interval: Duration::from_millis(20),
        });
        Harness {
            bus,
            display,
            media,
            aggregator,
            clock,
            enforcer,
        }
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_arm_enters_fullscreen() {
        let mut h = harness();
        h.enforcer.arm();

        let state = h.enforcer.state();
        assert_eq!(state.phase, LockdownPhase::Armed);
        assert!(state.is_full_screen);
        assert!(!state.is_paused);
        assert!(h.display.is_full_screen());
    }

    #[test]
    fn test_fullscreen_exit_pauses_until_rearmed() {
        let mut h = harness();
        h.enforcer.arm();

        h.display.leave_fullscreen();

        let state = h.enforcer.state();
        assert!(state.is_paused);
        assert_eq!(state.phase, LockdownPhase::Paused);
        assert_eq!(state.exit_fullscreen_count, 1);
        let incidents = h.aggregator.incidents();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].kind, LockdownViolation::FullscreenExit);
        let stats = h.aggregator.stats();
        assert_eq!(stats.fullscreen_exit_count, 1);
        assert_eq!(stats.trust_score, 98);

        h.enforcer.request_fullscreen().unwrap();
        assert!(!h.enforcer.is_paused());
        assert_eq!(h.enforcer.state().phase, LockdownPhase::Armed);
    }

    #[test]
    fn test_denied_fullscreen_is_not_fatal() {
        let mut h = harness();
        h.display.set_deny_requests(true);
        h.enforcer.arm();

        assert!(h.enforcer.is_armed());
        assert!(!h.enforcer.state().is_full_screen);

        // Never observed fullscreen, so an exit event is ignored.
        h.bus.dispatch(IntegrityEvent::FullscreenChanged {
            is_full_screen: false,
        });
        assert!(!h.enforcer.is_paused());
        assert_eq!(h.enforcer.state().exit_fullscreen_count, 0);
        assert!(h.aggregator.incidents().is_empty());
    }

    #[test]
    fn test_denied_rearm_keeps_pause() {
        let mut h = harness();
        h.enforcer.arm();
        h.display.leave_fullscreen();
        h.display.set_deny_requests(true);

        assert!(h.enforcer.request_fullscreen().is_err());
        assert!(h.enforcer.is_paused());
    }

    #[test]
    fn test_context_menu_is_suppressed_and_counted() {
        let mut h = harness();
        h.enforcer.arm();

        for _ in 0..3 {
            assert_eq!(
                h.bus.dispatch(IntegrityEvent::ContextMenu),
                EventDisposition::Suppress
            );
        }

        let state = h.enforcer.state();
        assert_eq!(state.context_menu_attempts, 3);
        assert!(!state.is_paused);
        // Back-to-back attempts fall inside one debounce window.
        assert_eq!(h.aggregator.incidents().len(), 1);
        let stats = h.aggregator.stats();
        assert_eq!(stats.context_menu_count, 1);
        assert_eq!(stats.trust_score, 98);
    }

    #[test]
    fn test_repeated_lockdown_violations_cost_trust() {
        let mut h = harness();
        h.enforcer.arm();

        for _ in 0..5 {
            h.display.leave_fullscreen();
            h.enforcer.request_fullscreen().unwrap();
            h.clock.advance(5_000);
        }
        for _ in 0..10 {
            h.bus.dispatch(IntegrityEvent::ContextMenu);
        }

        let stats = h.aggregator.stats();
        assert_eq!(stats.fullscreen_exit_count, 5);
        assert_eq!(stats.context_menu_count, 1);
        assert_eq!(stats.total_violations, 6);
        assert_eq!(stats.trust_score, 88);
        assert_eq!(h.aggregator.incidents().len(), 6);
        assert_eq!(h.enforcer.state().exit_fullscreen_count, 5);
    }

    #[test]
    fn test_hidden_page_reports_tab_switch() {
        let mut h = harness();
        h.enforcer.arm();

        h.bus.dispatch(IntegrityEvent::VisibilityChanged { hidden: true });
        h.bus.dispatch(IntegrityEvent::VisibilityChanged { hidden: false });

        let stats = h.aggregator.stats();
        assert_eq!(stats.tab_switch_count, 1);
        assert_eq!(stats.trust_score, 98);
    }

    #[test]
    fn test_disarm_detaches_handlers() {
        let mut h = harness();
        h.enforcer.arm();
        h.enforcer.disarm();
        h.enforcer.disarm();

        assert_eq!(h.bus.handler_count(EventKind::ContextMenu), 0);
        assert_eq!(h.bus.handler_count(EventKind::Fullscreen), 0);
        assert_eq!(h.bus.handler_count(EventKind::Visibility), 0);
        assert_eq!(
            h.bus.dispatch(IntegrityEvent::ContextMenu),
            EventDisposition::Allow
        );
        assert_eq!(h.enforcer.state().phase, LockdownPhase::Unarmed);
    }

    #[test]
    fn test_arm_twice_subscribes_once() {
        let mut h = harness();
        h.enforcer.arm();
        h.enforcer.arm();
        assert_eq!(h.bus.handler_count(EventKind::ContextMenu), 1);
    }

    #[test]
    fn test_rearm_starts_fresh() {
        let mut h = harness();
        h.enforcer.arm();
        h.bus.dispatch(IntegrityEvent::ContextMenu);
        h.enforcer.disarm();

        h.enforcer.arm();
        assert_eq!(h.enforcer.state().context_menu_attempts, 0);
    }

    #[test]
    fn test_track_end_pauses_and_replacement_is_watched() {
        let mut h = harness();
        let first = VideoTrack::new("first");
        h.media.tracks.register(first.clone());
        h.enforcer.arm();
        assert!(wait_until(|| first.listener_count() == 1));

        first.end();
        let state = h.enforcer.state();
        assert!(state.is_webcam_disconnected);
        assert!(state.is_paused);
        assert!(h
            .aggregator
            .incidents()
            .iter()
            .any(|i| i.kind == LockdownViolation::WebcamDisconnect));

        let second = VideoTrack::new("second");
        h.media.tracks.register(second.clone());
        assert!(wait_until(|| second.listener_count() == 1));
        assert!(wait_until(|| !h.enforcer.state().is_webcam_disconnected));
        assert!(h.enforcer.is_paused());
    }

    #[test]
    fn test_tracks_are_watched_only_after_grant() {
        let mut h = harness();
        h.media.grant.set(false);
        let track = VideoTrack::new("cam");
        h.media.tracks.register(track.clone());
        h.enforcer.arm();

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(track.listener_count(), 0);

        h.media.grant.set(true);
        assert!(wait_until(|| track.listener_count() == 1));
    }

    #[test]
    fn test_disarm_releases_track_listeners() {
        let mut h = harness();
        let track = VideoTrack::new("cam");
        h.media.tracks.register(track.clone());
        h.enforcer.arm();
        assert!(wait_until(|| track.listener_count() == 1));

        h.enforcer.disarm();
        assert_eq!(track.listener_count(), 0);
    }
}
