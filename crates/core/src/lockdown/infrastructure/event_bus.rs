use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::lockdown::domain::integrity_event::{
    EventDisposition, EventHandler, EventKind, IntegrityEvent, IntegrityEventSource,
};
use crate::shared::subscription::Subscription;

#[derive(Default)]
struct Handlers {
    next_id: AtomicU64,
    by_kind: Mutex<HashMap<EventKind, Vec<(u64, EventHandler)>>>,
}

/// In-process event source for hosts without a native event loop (the CLI,
/// tests). The host calls `dispatch` when something happens.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Handlers>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every handler registered for the event's kind. The default
    /// action is suppressed if any handler asks for it.
    pub fn dispatch(&self, event: IntegrityEvent) -> EventDisposition {
        let handlers: Vec<EventHandler> = match self.handlers.by_kind.lock() {
            Ok(map) => map
                .get(&event.kind())
                .map(|hs| hs.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default(),
            Err(_) => return EventDisposition::Allow,
        };

        let mut disposition = EventDisposition::Allow;
        for handler in handlers {
            if handler(&event) == EventDisposition::Suppress {
                disposition = EventDisposition::Suppress;
            }
        }
        disposition
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .by_kind
            .lock()
            .map(|map| map.get(&kind).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl IntegrityEventSource for EventBus {
    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> Subscription {
        let id = self.handlers.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut map) = self.handlers.by_kind.lock() {
            map.entry(kind).or_default().push((id, handler));
        }
        let weak = Arc::downgrade(&self.handlers);
        Subscription::new(move || {
            if let Some(handlers) = weak.upgrade() {
                if let Ok(mut map) = handlers.by_kind.lock() {
                    if let Some(list) = map.get_mut(&kind) {
                        list.retain(|(h, _)| *h != id);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(count: &Arc<AtomicUsize>, disposition: EventDisposition) -> EventHandler {
        let c = count.clone();
        Arc::new(move |_: &IntegrityEvent| {
            c.fetch_add(1, Ordering::SeqCst);
            disposition
        })
    }

    #[test]
    fn test_dispatch_reaches_matching_kind_only() {
        let bus = EventBus::new();
        let menus = Arc::new(AtomicUsize::new(0));
        let fullscreen = Arc::new(AtomicUsize::new(0));
        let _a = bus.subscribe(EventKind::ContextMenu, counting(&menus, EventDisposition::Allow));
        let _b = bus.subscribe(
            EventKind::Fullscreen,
            counting(&fullscreen, EventDisposition::Allow),
        );

        bus.dispatch(IntegrityEvent::ContextMenu);

        assert_eq!(menus.load(Ordering::SeqCst), 1);
        assert_eq!(fullscreen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_any_suppressing_handler_wins() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let _a = bus.subscribe(EventKind::ContextMenu, counting(&count, EventDisposition::Allow));
        let _b = bus.subscribe(
            EventKind::ContextMenu,
            counting(&count, EventDisposition::Suppress),
        );

        assert_eq!(
            bus.dispatch(IntegrityEvent::ContextMenu),
            EventDisposition::Suppress
        );
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_detaches_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let mut sub = bus.subscribe(EventKind::Visibility, counting(&count, EventDisposition::Allow));
        assert_eq!(bus.handler_count(EventKind::Visibility), 1);

        sub.unsubscribe();
        bus.dispatch(IntegrityEvent::VisibilityChanged { hidden: true });

        assert_eq!(bus.handler_count(EventKind::Visibility), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_handlers_allows() {
        let bus = EventBus::new();
        assert_eq!(
            bus.dispatch(IntegrityEvent::ContextMenu),
            EventDisposition::Allow
        );
    }
}
