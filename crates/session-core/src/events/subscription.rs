use std::sync::Mutex;

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Handle for one registered handler. Destroying it (explicitly or by drop) unregisters
/// the handler exactly once.
pub struct Subscription {
    unsubscribe: Mutex<Option<Unsubscribe>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Mutex::new(Some(Box::new(unsubscribe))),
        }
    }

    /// A subscription with nothing to tear down.
    pub fn inert() -> Self {
        Self {
            unsubscribe: Mutex::new(None),
        }
    }

    pub fn destroy(&self) {
        let unsubscribe = match self.unsubscribe.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
    }

    pub fn is_active(&self) -> bool {
        match self.unsubscribe.lock() {
            Ok(slot) => slot.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Group of subscriptions torn down together.
#[derive(Default)]
pub struct SubscriptionSet {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, subscription: Subscription) {
        match self.subscriptions.lock() {
            Ok(mut subscriptions) => subscriptions.push(subscription),
            Err(poisoned) => poisoned.into_inner().push(subscription),
        }
    }

    pub fn len(&self) -> usize {
        match self.subscriptions.lock() {
            Ok(subscriptions) => subscriptions.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn destroy_all(&self) {
        let drained: Vec<Subscription> = match self.subscriptions.lock() {
            Ok(mut subscriptions) => subscriptions.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for subscription in drained {
            subscription.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{Subscription, SubscriptionSet};

    #[test]
    fn destroy_runs_unsubscribe_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let subscription = Subscription::new({
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        subscription.destroy();
        subscription.destroy();
        drop(subscription);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_destroys_every_member() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = SubscriptionSet::new();
        for _ in 0..3 {
            let calls = calls.clone();
            set.insert(Subscription::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }

        set.destroy_all();

        assert!(set.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
