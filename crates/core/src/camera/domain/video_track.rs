use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::shared::subscription::Subscription;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a video track, used to deduplicate listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track-{}", self.0)
    }
}

pub type EndedListener = Arc<dyn Fn(TrackId) + Send + Sync>;

struct TrackInner {
    id: TrackId,
    label: String,
    live: AtomicBool,
    next_listener: AtomicU64,
    listeners: Mutex<Vec<(u64, EndedListener)>>,
}

/// Shared handle to the live video output of a camera.
///
/// A track ends either locally (`stop`, no notification) or because its
/// source went away (`end`, notifies every ended-listener exactly once).
#[derive(Clone)]
pub struct VideoTrack {
    inner: Arc<TrackInner>,
}

impl VideoTrack {
    pub fn new(label: &str) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: TrackId(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed)),
                label: label.to_string(),
                live: AtomicBool::new(true),
                next_listener: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> TrackId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Registers a listener fired when the source ends the track.
    pub fn on_ended(&self, listener: EndedListener) -> Subscription {
        let key = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.push((key, listener));
        }
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut listeners) = inner.listeners.lock() {
                    listeners.retain(|(k, _)| *k != key);
                }
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Source-side end (device unplugged, stream lost). Notifies listeners
    /// on the first call only.
    pub fn end(&self) {
        if !self.inner.live.swap(false, Ordering::SeqCst) {
            return;
        }
        let listeners: Vec<EndedListener> = match self.inner.listeners.lock() {
            Ok(l) => l.iter().map(|(_, f)| f.clone()).collect(),
            Err(_) => return,
        };
        // Listeners run outside the lock so they may unsubscribe themselves.
        for listener in listeners {
            listener(self.inner.id);
        }
    }

    /// Local stop: the track is no longer live but listeners are not told.
    pub fn stop(&self) {
        self.inner.live.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for VideoTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoTrack")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("live", &self.is_live())
            .finish()
    }
}

/// Every video track currently attached to an output, shared between the
/// camera that owns them and the lockdown watch that observes them.
#[derive(Clone, Default)]
pub struct TrackRegistry {
    tracks: Arc<Mutex<Vec<VideoTrack>>>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, track: VideoTrack) {
        if let Ok(mut tracks) = self.tracks.lock() {
            if !tracks.iter().any(|t| t.id() == track.id()) {
                tracks.push(track);
            }
        }
    }

    pub fn unregister(&self, id: TrackId) {
        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.retain(|t| t.id() != id);
        }
    }

    pub fn tracks(&self) -> Vec<VideoTrack> {
        self.tracks.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn live_tracks(&self) -> Vec<VideoTrack> {
        self.tracks()
            .into_iter()
            .filter(VideoTrack::is_live)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.lock().map(|t| t.is_empty()).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_listener(count: &Arc<AtomicUsize>) -> EndedListener {
        let c = count.clone();
        Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(VideoTrack::new("a").id(), VideoTrack::new("b").id());
    }

    #[test]
    fn test_end_notifies_once() {
        let track = VideoTrack::new("cam");
        let count = Arc::new(AtomicUsize::new(0));
        let _sub = track.on_ended(counter_listener(&count));

        track.end();
        track.end();

        assert!(!track.is_live());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_does_not_notify() {
        let track = VideoTrack::new("cam");
        let count = Arc::new(AtomicUsize::new(0));
        let _sub = track.on_ended(counter_listener(&count));

        track.stop();
        track.end();

        assert!(!track.is_live());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribed_listener_not_called() {
        let track = VideoTrack::new("cam");
        let count = Arc::new(AtomicUsize::new(0));
        let mut sub = track.on_ended(counter_listener(&count));
        assert_eq!(track.listener_count(), 1);

        sub.unsubscribe();
        track.end();

        assert_eq!(track.listener_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_registry_filters_live_tracks() {
        let registry = TrackRegistry::new();
        let live = VideoTrack::new("live");
        let ended = VideoTrack::new("ended");
        registry.register(live.clone());
        registry.register(ended.clone());
        registry.register(live.clone());
        ended.stop();

        assert_eq!(registry.tracks().len(), 2);
        let live_ids: Vec<TrackId> = registry.live_tracks().iter().map(|t| t.id()).collect();
        assert_eq!(live_ids, vec![live.id()]);

        registry.unregister(live.id());
        registry.unregister(ended.id());
        assert!(registry.is_empty());
    }
}
