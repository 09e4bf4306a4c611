/// Handle to a registered listener. Dropping or unsubscribing detaches it.
///
/// Unsubscribing is idempotent: the detach closure runs at most once.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription with nothing to detach.
    pub fn empty() -> Self {
        Self { detach: None }
    }

    pub fn is_active(&self) -> bool {
        self.detach.is_some()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Owned collection of subscriptions released together.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Detaches every subscription. Safe to call repeatedly.
    pub fn clear(&mut self) {
        for mut sub in self.subscriptions.drain(..) {
            sub.unsubscribe();
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> Subscription {
        let c = counter.clone();
        Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_unsubscribe_runs_once() {
        let detached = Arc::new(AtomicUsize::new(0));
        let mut sub = counting(&detached);
        sub.unsubscribe();
        sub.unsubscribe();
        drop(sub);
        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_detaches() {
        let detached = Arc::new(AtomicUsize::new(0));
        drop(counting(&detached));
        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_clear_is_idempotent() {
        let detached = Arc::new(AtomicUsize::new(0));
        let mut set = SubscriptionSet::new();
        set.add(counting(&detached));
        set.add(counting(&detached));
        set.add(Subscription::empty());
        assert_eq!(set.len(), 3);

        set.clear();
        set.clear();

        assert!(set.is_empty());
        assert_eq!(detached.load(Ordering::SeqCst), 2);
    }
}
