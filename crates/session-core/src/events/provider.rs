use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::{broadcast, mpsc};

use crate::events::{Event, SessionUpdate, Subscription};
use crate::models::{CoreError, OperationId};
use crate::orchestration::OrchestrationResult;

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

#[derive(Clone)]
pub struct EventProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    state: Mutex<ProviderState>,
    updates: broadcast::Sender<SessionUpdate>,
}

#[derive(Default)]
struct ProviderState {
    next_route_id: u64,
    routes: HashMap<OperationId, Vec<(u64, EventSender)>>,
    destroyed: bool,
}

impl EventProvider {
    pub fn new(updates_capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(updates_capacity.max(1));
        Self {
            inner: Arc::new(ProviderInner {
                state: Mutex::new(ProviderState::default()),
                updates,
            }),
        }
    }

    /// Routes every operation event carrying `operation` into `sender` until the returned
    /// subscription is destroyed.
    pub fn route(
        &self,
        operation: OperationId,
        sender: EventSender,
    ) -> OrchestrationResult<Subscription> {
        let route_id = {
            let mut state = lock_state(&self.inner)?;
            if state.destroyed {
                drop(state);
                let _ = sender.send(Event::SessionDestroyed);
                return Ok(Subscription::inert());
            }
            let route_id = state.next_route_id;
            state.next_route_id = state.next_route_id.saturating_add(1);
            state
                .routes
                .entry(operation)
                .or_default()
                .push((route_id, sender));
            route_id
        };

        let inner: Weak<ProviderInner> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                unroute(&inner, operation, route_id);
            }
        }))
    }

    pub fn emit(&self, event: Event) {
        match event {
            Event::SessionDestroyed => self.broadcast_destroyed(),
            Event::Update(update) => {
                let _ = self.inner.updates.send(update);
            }
            event => self.dispatch(event),
        }
    }

    pub fn destroy(&self) {
        self.emit(Event::SessionDestroyed);
    }

    pub fn is_destroyed(&self) -> bool {
        lock_state(&self.inner)
            .map(|state| state.destroyed)
            .unwrap_or(true)
    }

    pub fn updates(&self) -> broadcast::Receiver<SessionUpdate> {
        self.inner.updates.subscribe()
    }

    /// Number of operation ids that currently have at least one route.
    pub fn routed_operations(&self) -> usize {
        lock_state(&self.inner)
            .map(|state| state.routes.len())
            .unwrap_or(0)
    }

    fn dispatch(&self, event: Event) {
        let Some(operation) = event.operation() else {
            return;
        };
        let senders: Vec<EventSender> = match lock_state(&self.inner) {
            Ok(state) => state
                .routes
                .get(&operation)
                .map(|routes| routes.iter().map(|(_, sender)| sender.clone()).collect())
                .unwrap_or_default(),
            Err(error) => {
                tracing::error!(message = %error.message, "event provider state is unavailable");
                return;
            }
        };

        if senders.is_empty() {
            tracing::debug!(
                operation = %operation,
                event = event.name(),
                "orphan event: no live operation is waiting for it"
            );
            return;
        }

        for sender in senders {
            let _ = sender.send(event.clone());
        }
    }

    fn broadcast_destroyed(&self) {
        let senders: Vec<EventSender> = match lock_state(&self.inner) {
            Ok(mut state) => {
                if state.destroyed {
                    tracing::debug!("session destroyed event received twice");
                }
                state.destroyed = true;
                state
                    .routes
                    .values()
                    .flat_map(|routes| routes.iter().map(|(_, sender)| sender.clone()))
                    .collect()
            }
            Err(error) => {
                tracing::error!(message = %error.message, "event provider state is unavailable");
                return;
            }
        };

        tracing::debug!(routes = senders.len(), "broadcasting session destroyed");
        for sender in senders {
            let _ = sender.send(Event::SessionDestroyed);
        }
        let _ = self.inner.updates.send(SessionUpdate::SessionDestroyed);
    }
}

impl std::fmt::Debug for EventProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProvider")
            .field("routed_operations", &self.routed_operations())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

fn unroute(inner: &ProviderInner, operation: OperationId, route_id: u64) {
    let Ok(mut state) = lock_state(inner) else {
        return;
    };
    if let Some(routes) = state.routes.get_mut(&operation) {
        routes.retain(|(id, _)| *id != route_id);
        if routes.is_empty() {
            state.routes.remove(&operation);
        }
    }
}

fn lock_state(inner: &ProviderInner) -> OrchestrationResult<MutexGuard<'_, ProviderState>> {
    inner
        .state
        .lock()
        .map_err(|_| CoreError::internal("event provider mutex poisoned"))
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::EventProvider;
    use crate::events::{Event, SessionUpdate};
    use crate::models::OperationId;

    #[tokio::test]
    async fn routes_only_matching_operation() {
        let provider = EventProvider::new(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watched = OperationId::new();
        let _subscription = provider.route(watched, tx).unwrap();

        provider.emit(Event::OperationStarted(OperationId::new()));
        provider.emit(Event::OperationStarted(watched));

        assert_eq!(rx.recv().await, Some(Event::OperationStarted(watched)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn destroying_subscription_removes_route() {
        let provider = EventProvider::new(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watched = OperationId::new();
        let subscription = provider.route(watched, tx).unwrap();
        assert_eq!(provider.routed_operations(), 1);

        subscription.destroy();
        provider.emit(Event::done_empty(watched));

        assert_eq!(provider.routed_operations(), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn late_route_after_destroy_sees_session_destroyed() {
        let provider = EventProvider::new(8);
        let mut updates = provider.updates();
        provider.destroy();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = provider.route(OperationId::new(), tx).unwrap();

        assert_eq!(rx.recv().await, Some(Event::SessionDestroyed));
        assert_eq!(updates.recv().await.unwrap(), SessionUpdate::SessionDestroyed);
        assert!(provider.is_destroyed());
    }

    #[tokio::test]
    async fn updates_are_broadcast() {
        let provider = EventProvider::new(8);
        let mut first = provider.updates();
        let mut second = provider.updates();

        provider.emit(Event::Update(SessionUpdate::StreamUpdated(42)));

        assert_eq!(first.recv().await.unwrap(), SessionUpdate::StreamUpdated(42));
        assert_eq!(second.recv().await.unwrap(), SessionUpdate::StreamUpdated(42));
    }
}
