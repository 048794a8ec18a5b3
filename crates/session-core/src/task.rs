//! Settle-once task handle with a cancellation handshake.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, broadcast};

use crate::models::{CoreError, CoreErrorKind, OperationId, OperationKind};
use crate::orchestration::OrchestrationResult;

pub const DEFAULT_SIGNALS_CAPACITY: usize = 16;

type Callback = Box<dyn FnOnce() + Send>;
type CancelHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TaskState {
    Pending,
    Processing,
    Canceling,
    Resolved,
    Rejected,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected | Self::Canceled)
    }
}

/// Advisory progress signals; they never change the task state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TaskSignal {
    /// The native side accepted the operation.
    Confirmed,
    Processing,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome<T> {
    Resolved(T),
    Rejected(CoreError),
    Canceled,
}

impl<T> TaskOutcome<T> {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    pub fn state(&self) -> TaskState {
        match self {
            Self::Resolved(_) => TaskState::Resolved,
            Self::Rejected(_) => TaskState::Rejected,
            Self::Canceled => TaskState::Canceled,
        }
    }
}

enum Phase<T> {
    Pending,
    Processing,
    Canceling { abort_id: Option<OperationId> },
    Settled(TaskOutcome<T>),
}

struct TaskInner<T> {
    uuid: OperationId,
    uuid_reassigned: bool,
    phase: Phase<T>,
    cancel_handler: Option<CancelHandler>,
    finalizers: Vec<Callback>,
    canceled_handlers: Vec<Callback>,
    relays: Vec<broadcast::Sender<TaskSignal>>,
}

struct TaskShared<T> {
    kind: OperationKind,
    inner: Mutex<TaskInner<T>>,
    settled: Notify,
    signals: broadcast::Sender<TaskSignal>,
}

pub struct CancelableTask<T> {
    shared: Arc<TaskShared<T>>,
}

impl<T> Clone for CancelableTask<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + 'static> CancelableTask<T> {
    pub fn new(kind: OperationKind) -> Self {
        Self::with_phase(kind, Phase::Processing, DEFAULT_SIGNALS_CAPACITY)
    }

    pub fn with_signals_capacity(kind: OperationKind, capacity: usize) -> Self {
        Self::with_phase(kind, Phase::Processing, capacity)
    }

    /// Creates a task promised to a caller before the underlying work exists.
    pub fn pending(kind: OperationKind) -> Self {
        Self::with_phase(kind, Phase::Pending, DEFAULT_SIGNALS_CAPACITY)
    }

    pub fn canceled(kind: OperationKind) -> Self {
        Self::with_phase(
            kind,
            Phase::Settled(TaskOutcome::Canceled),
            DEFAULT_SIGNALS_CAPACITY,
        )
    }

    fn with_phase(kind: OperationKind, phase: Phase<T>, capacity: usize) -> Self {
        let (signals, _) = broadcast::channel(capacity.max(1));
        Self {
            shared: Arc::new(TaskShared {
                kind,
                inner: Mutex::new(TaskInner {
                    uuid: OperationId::new(),
                    uuid_reassigned: false,
                    phase,
                    cancel_handler: None,
                    finalizers: Vec::new(),
                    canceled_handlers: Vec::new(),
                    relays: Vec::new(),
                }),
                settled: Notify::new(),
                signals,
            }),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.shared.kind
    }

    pub fn uuid(&self) -> OperationId {
        self.lock().uuid
    }

    /// Replaces the identity minted at creation. Allowed exactly once.
    pub fn set_uuid(&self, uuid: OperationId) -> OrchestrationResult<()> {
        let mut inner = self.lock();
        if inner.uuid_reassigned {
            return Err(CoreError::for_operation(
                inner.uuid,
                self.shared.kind,
                CoreErrorKind::InvalidInput,
                format!("task '{}' already had its identity reassigned", inner.uuid),
            ));
        }
        inner.uuid = uuid;
        inner.uuid_reassigned = true;
        Ok(())
    }

    pub fn state(&self) -> TaskState {
        match &self.lock().phase {
            Phase::Pending => TaskState::Pending,
            Phase::Processing => TaskState::Processing,
            Phase::Canceling { .. } => TaskState::Canceling,
            Phase::Settled(outcome) => outcome.state(),
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.lock().phase, Phase::Pending | Phase::Processing)
    }

    pub fn is_canceling(&self) -> bool {
        matches!(self.lock().phase, Phase::Canceling { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.lock().phase, Phase::Settled(_))
    }

    pub fn abort_id(&self) -> Option<OperationId> {
        match self.lock().phase {
            Phase::Canceling { abort_id } => abort_id,
            _ => None,
        }
    }

    pub fn mark_processing(&self) {
        let mut inner = self.lock();
        if matches!(inner.phase, Phase::Pending) {
            inner.phase = Phase::Processing;
        }
    }

    /// Resolves the task. Ignored once settled, and while a committed abort is in flight.
    pub fn resolve(&self, value: T) -> bool {
        {
            let inner = self.lock();
            if let Phase::Canceling {
                abort_id: Some(abort_id),
            } = inner.phase
            {
                tracing::debug!(
                    operation = %inner.uuid,
                    abort = %abort_id,
                    "result discarded: abort already dispatched"
                );
                return false;
            }
        }
        self.settle(TaskOutcome::Resolved(value))
    }

    pub fn reject(&self, error: CoreError) -> bool {
        self.settle(TaskOutcome::Rejected(error))
    }

    /// Settles the task as canceled; this is the completion path of a cancellation.
    pub fn settle_canceled(&self) -> bool {
        self.settle(TaskOutcome::Canceled)
    }

    /// Requests cancellation. With a registered handler the task enters `Canceling` and the
    /// handler decides how to finish; without one the task is canceled on the spot. Repeated
    /// requests are no-ops.
    pub fn cancel(&self) {
        let handler = {
            let mut inner = self.lock();
            match inner.phase {
                Phase::Settled(_) => {
                    tracing::debug!(operation = %inner.uuid, "cancel ignored: task already settled");
                    return;
                }
                Phase::Canceling { .. } => {
                    tracing::debug!(operation = %inner.uuid, "cancel ignored: cancellation already requested");
                    return;
                }
                Phase::Pending | Phase::Processing => {}
            }
            match inner.cancel_handler.clone() {
                Some(handler) => {
                    inner.phase = Phase::Canceling { abort_id: None };
                    Some(handler)
                }
                None => None,
            }
        };

        match handler {
            Some(handler) => handler(),
            None => {
                self.settle(TaskOutcome::Canceled);
            }
        }
    }

    pub fn on_cancel_requested(&self, handler: impl Fn() + Send + Sync + 'static) {
        let mut inner = self.lock();
        if !matches!(inner.phase, Phase::Settled(_)) {
            inner.cancel_handler = Some(Arc::new(handler));
        }
    }

    /// Mints the abort id for a cancellation in progress. Returns `None` when the task is not
    /// canceling or already has one.
    pub fn mint_abort_id(&self) -> Option<OperationId> {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Canceling { abort_id: None } => {
                let abort_id = OperationId::new();
                inner.phase = Phase::Canceling {
                    abort_id: Some(abort_id),
                };
                Some(abort_id)
            }
            _ => None,
        }
    }

    /// Recalls a cancellation whose abort id has not been minted yet.
    pub fn try_to_stop_cancellation(&self) -> bool {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Canceling { abort_id: None } => {
                inner.phase = Phase::Processing;
                true
            }
            _ => false,
        }
    }

    pub fn emit(&self, signal: TaskSignal) {
        let relays = self.lock().relays.clone();
        let _ = self.shared.signals.send(signal);
        for relay in relays {
            let _ = relay.send(signal);
        }
    }

    pub fn signals(&self) -> broadcast::Receiver<TaskSignal> {
        self.shared.signals.subscribe()
    }

    /// Re-emits every future signal of this task on `target`.
    pub fn relay_signals_to<U>(&self, target: &CancelableTask<U>) {
        let sender = target.shared.signals.clone();
        self.lock().relays.push(sender);
    }

    /// Registers a callback run exactly once when the task settles, whatever the outcome.
    /// Runs immediately if the task is already settled.
    pub fn finally(&self, callback: impl FnOnce() + Send + 'static) {
        let mut inner = self.lock();
        if matches!(inner.phase, Phase::Settled(_)) {
            drop(inner);
            callback();
        } else {
            inner.finalizers.push(Box::new(callback));
        }
    }

    pub fn on_canceled(&self, callback: impl FnOnce() + Send + 'static) {
        let mut inner = self.lock();
        let run_now = match inner.phase {
            Phase::Settled(TaskOutcome::Canceled) => true,
            Phase::Settled(_) => return,
            _ => false,
        };
        if run_now {
            drop(inner);
            callback();
        } else {
            inner.canceled_handlers.push(Box::new(callback));
        }
    }

    fn settle(&self, outcome: TaskOutcome<T>) -> bool {
        let (canceled_handlers, finalizers) = {
            let mut inner = self.lock();
            if matches!(inner.phase, Phase::Settled(_)) {
                return false;
            }
            let canceled_handlers = if outcome.is_canceled() {
                std::mem::take(&mut inner.canceled_handlers)
            } else {
                inner.canceled_handlers.clear();
                Vec::new()
            };
            inner.phase = Phase::Settled(outcome);
            inner.cancel_handler = None;
            inner.relays.clear();
            (canceled_handlers, std::mem::take(&mut inner.finalizers))
        };

        for handler in canceled_handlers {
            handler();
        }
        for finalizer in finalizers {
            finalizer();
        }
        self.shared.settled.notify_waiters();
        true
    }

    fn lock(&self) -> MutexGuard<'_, TaskInner<T>> {
        // Callbacks never run under this lock, so a poisoned guard still holds a consistent
        // state.
        match self.shared.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T: Clone + Send + 'static> CancelableTask<T> {
    pub async fn outcome(&self) -> TaskOutcome<T> {
        loop {
            let notified = self.shared.settled.notified();
            if let Some(outcome) = self.settled_outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Waits for the task to settle; cancellation surfaces as a `Cancelled` error.
    pub async fn into_result(self) -> OrchestrationResult<T> {
        let uuid = self.uuid();
        match self.outcome().await {
            TaskOutcome::Resolved(value) => Ok(value),
            TaskOutcome::Rejected(error) => Err(error),
            TaskOutcome::Canceled => Err(CoreError::for_operation(
                uuid,
                self.shared.kind,
                CoreErrorKind::Cancelled,
                format!("{} operation '{uuid}' was canceled", self.shared.kind.label()),
            )),
        }
    }

    pub fn settled_outcome(&self) -> Option<TaskOutcome<T>> {
        match &self.lock().phase {
            Phase::Settled(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for CancelableTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelableTask")
            .field("kind", &self.shared.kind)
            .field("uuid", &self.uuid())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{CancelableTask, TaskOutcome, TaskSignal, TaskState};
    use crate::models::{CoreError, CoreErrorKind, OperationId, OperationKind};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn settle_is_idempotent_and_finalizer_runs_once() {
        let task = CancelableTask::<u32>::new(OperationKind::Sleep);
        let finals = counter();
        task.finally({
            let finals = finals.clone();
            move || {
                finals.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(task.resolve(1));
        assert!(!task.resolve(2));
        assert!(!task.reject(CoreError::internal("late")));
        assert!(!task.settle_canceled());

        assert_eq!(finals.load(Ordering::SeqCst), 1);
        assert_eq!(task.settled_outcome(), Some(TaskOutcome::Resolved(1)));
    }

    #[test]
    fn cancel_without_handler_cancels_immediately() {
        let task = CancelableTask::<()>::new(OperationKind::Observe);
        let canceled = counter();
        task.on_canceled({
            let canceled = canceled.clone();
            move || {
                canceled.fetch_add(1, Ordering::SeqCst);
            }
        });

        task.cancel();

        assert_eq!(task.state(), TaskState::Canceled);
        assert_eq!(canceled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_cancel_does_not_reinvoke_handler_or_remint() {
        let task = CancelableTask::<()>::new(OperationKind::Search);
        let calls = counter();
        task.on_cancel_requested({
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        task.cancel();
        let abort_id = task.mint_abort_id();
        task.cancel();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(abort_id.is_some());
        assert_eq!(task.mint_abort_id(), None);
        assert_eq!(task.abort_id(), abort_id);
    }

    #[test]
    fn stop_cancellation_only_before_abort_id() {
        let task = CancelableTask::<()>::new(OperationKind::Search);
        task.on_cancel_requested(|| {});

        task.cancel();
        assert!(task.is_canceling());
        assert!(task.try_to_stop_cancellation());
        assert_eq!(task.state(), TaskState::Processing);

        task.cancel();
        task.mint_abort_id();
        assert!(!task.try_to_stop_cancellation());
        assert!(task.is_canceling());
    }

    #[test]
    fn committed_abort_discards_result_but_allows_rejection() {
        let task = CancelableTask::<u8>::new(OperationKind::Search);
        task.on_cancel_requested(|| {});
        task.cancel();
        task.mint_abort_id();

        assert!(!task.resolve(7));
        assert!(task.reject(CoreError::new(CoreErrorKind::SessionDestroyed, "gone")));
        assert_eq!(task.state(), TaskState::Rejected);
    }

    #[test]
    fn uuid_can_be_reassigned_once() {
        let task = CancelableTask::<()>::pending(OperationKind::Search);
        let first = OperationId::new();

        task.set_uuid(first).unwrap();
        let error = task.set_uuid(OperationId::new()).unwrap_err();

        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
        assert_eq!(task.uuid(), first);
    }

    #[test]
    fn finally_after_settle_runs_immediately() {
        let task = CancelableTask::<()>::canceled(OperationKind::Search);
        let finals = counter();
        task.finally({
            let finals = finals.clone();
            move || {
                finals.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(finals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn signals_are_relayed() {
        let inner = CancelableTask::<()>::new(OperationKind::Search);
        let outer = CancelableTask::<()>::pending(OperationKind::Search);
        inner.relay_signals_to(&outer);
        let mut received = outer.signals();

        inner.emit(TaskSignal::Confirmed);

        assert_eq!(received.recv().await.unwrap(), TaskSignal::Confirmed);
    }

    #[tokio::test]
    async fn into_result_maps_cancellation() {
        let task = CancelableTask::<()>::new(OperationKind::Export);
        let waiter = tokio::spawn(task.clone().into_result());

        task.cancel();

        let error = waiter.await.unwrap().unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::Cancelled);
    }
}
