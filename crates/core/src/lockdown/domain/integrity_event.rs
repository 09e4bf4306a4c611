//! Host-environment events the lockdown enforcer listens to, and the two
//! host capabilities it needs: event subscription and fullscreen control.

use std::sync::Arc;

use thiserror::Error;

use crate::shared::subscription::Subscription;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegrityEvent {
    FullscreenChanged { is_full_screen: bool },
    /// A context menu (right click) is about to open.
    ContextMenu,
    VisibilityChanged { hidden: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Fullscreen,
    ContextMenu,
    Visibility,
}

impl IntegrityEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            IntegrityEvent::FullscreenChanged { .. } => EventKind::Fullscreen,
            IntegrityEvent::ContextMenu => EventKind::ContextMenu,
            IntegrityEvent::VisibilityChanged { .. } => EventKind::Visibility,
        }
    }
}

/// What the host should do with the event's default action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventDisposition {
    #[default]
    Allow,
    Suppress,
}

pub type EventHandler = Arc<dyn Fn(&IntegrityEvent) -> EventDisposition + Send + Sync>;

/// Delivers host events. Handlers may be invoked from any thread.
pub trait IntegrityEventSource: Send + Sync {
    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> Subscription;
}

#[derive(Error, Debug)]
pub enum LockdownError {
    #[error("fullscreen request denied: {0}")]
    FullscreenDenied(String),
    #[error("display is gone")]
    DisplayUnavailable,
}

pub trait DisplayController: Send + Sync {
    /// Asks the host to enter fullscreen. The resulting state change arrives
    /// as a `FullscreenChanged` event.
    fn request_fullscreen(&self) -> Result<(), LockdownError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert_eq!(
            IntegrityEvent::FullscreenChanged {
                is_full_screen: true
            }
            .kind(),
            EventKind::Fullscreen
        );
        assert_eq!(IntegrityEvent::ContextMenu.kind(), EventKind::ContextMenu);
        assert_eq!(
            IntegrityEvent::VisibilityChanged { hidden: true }.kind(),
            EventKind::Visibility
        );
    }

    #[test]
    fn test_default_disposition_allows() {
        assert_eq!(EventDisposition::default(), EventDisposition::Allow);
    }
}
