use std::sync::atomic::{AtomicBool, Ordering};

use crate::lockdown::domain::integrity_event::{DisplayController, IntegrityEvent, LockdownError};

use super::event_bus::EventBus;

/// Display without a window system. Fullscreen is a flag; changes are
/// announced on the bus like a browser's `fullscreenchange`.
pub struct HeadlessDisplay {
    bus: EventBus,
    full_screen: AtomicBool,
    deny: AtomicBool,
}

impl HeadlessDisplay {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            full_screen: AtomicBool::new(false),
            deny: AtomicBool::new(false),
        }
    }

    /// Makes subsequent fullscreen requests fail, as when the user agent
    /// refuses without a gesture.
    pub fn set_deny_requests(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn is_full_screen(&self) -> bool {
        self.full_screen.load(Ordering::SeqCst)
    }

    /// The user left fullscreen (Esc, window switch).
    pub fn leave_fullscreen(&self) {
        if self.full_screen.swap(false, Ordering::SeqCst) {
            self.bus.dispatch(IntegrityEvent::FullscreenChanged {
                is_full_screen: false,
            });
        }
    }
}

impl DisplayController for HeadlessDisplay {
    fn request_fullscreen(&self) -> Result<(), LockdownError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(LockdownError::FullscreenDenied(
                "request refused by display".to_string(),
            ));
        }
        if !self.full_screen.swap(true, Ordering::SeqCst) {
            self.bus.dispatch(IntegrityEvent::FullscreenChanged {
                is_full_screen: true,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockdown::domain::integrity_event::{
        EventDisposition, EventKind, IntegrityEventSource,
    };
    use std::sync::{Arc, Mutex};

    fn recorder(bus: &EventBus) -> (Arc<Mutex<Vec<bool>>>, crate::shared::subscription::Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let sub = bus.subscribe(
            EventKind::Fullscreen,
            Arc::new(move |event: &IntegrityEvent| {
                if let IntegrityEvent::FullscreenChanged { is_full_screen } = event {
                    s.lock().unwrap().push(*is_full_screen);
                }
                EventDisposition::Allow
            }),
        );
        (seen, sub)
    }

    #[test]
    fn test_request_and_leave_announce_changes() {
        let bus = EventBus::new();
        let (seen, _sub) = recorder(&bus);
        let display = HeadlessDisplay::new(bus);

        display.request_fullscreen().unwrap();
        display.request_fullscreen().unwrap();
        display.leave_fullscreen();
        display.leave_fullscreen();

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
        assert!(!display.is_full_screen());
    }

    #[test]
    fn test_denied_request_changes_nothing() {
        let bus = EventBus::new();
        let (seen, _sub) = recorder(&bus);
        let display = HeadlessDisplay::new(bus);
        display.set_deny_requests(true);

        assert!(matches!(
            display.request_fullscreen(),
            Err(LockdownError::FullscreenDenied(_))
        ));
        assert!(seen.lock().unwrap().is_empty());
        assert!(!display.is_full_screen());
    }
}
