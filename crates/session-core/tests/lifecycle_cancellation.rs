use std::sync::{Arc, Mutex};

use session_core::events::{Event, EventProvider};
use session_core::executors::{self, ExecutorContext};
use session_core::lifecycle::OperationLifecycle;
use session_core::models::{CoreErrorKind, OperationId, OperationKind, SearchFilter, SearchResult};
use session_core::native::{NativeCall, NativeError, NativeErrorKind, NativeSession};
use session_core::task::{CancelableTask, TaskOutcome, TaskSignal, TaskState};

#[derive(Default)]
struct FakeSession {
    started: Mutex<Vec<OperationId>>,
    aborts: Mutex<Vec<(OperationId, OperationId)>>,
    refuse_abort: bool,
    fail_start: bool,
}

impl FakeSession {
    fn started(&self) -> Vec<OperationId> {
        self.started.lock().unwrap().clone()
    }

    fn aborts(&self) -> Vec<(OperationId, OperationId)> {
        self.aborts.lock().unwrap().clone()
    }

    fn start(&self, operation: OperationId) -> NativeCall {
        self.started.lock().unwrap().push(operation);
        let fail = self.fail_start;
        Box::pin(async move {
            if fail {
                Err(NativeError::new(NativeErrorKind::Io, "grabber is not initialized"))
            } else {
                Ok(())
            }
        })
    }
}

impl NativeSession for FakeSession {
    fn abort(&self, abort_id: OperationId, target: OperationId) -> Result<(), NativeError> {
        self.aborts.lock().unwrap().push((abort_id, target));
        if self.refuse_abort {
            return Err(NativeError::channel("abort channel closed"));
        }
        Ok(())
    }

    fn search(&self, _filters: Vec<SearchFilter>, operation: OperationId) -> NativeCall {
        self.start(operation)
    }

    fn sleep(&self, _duration_ms: u64, _ignore: bool, operation: OperationId) -> NativeCall {
        self.start(operation)
    }
}

fn setup(fake: FakeSession) -> (Arc<FakeSession>, EventProvider, ExecutorContext) {
    let fake = Arc::new(fake);
    let provider = EventProvider::new(16);
    let context = ExecutorContext::new(fake.clone(), provider.clone());
    (fake, provider, context)
}

const VALID_SEARCH: &str = r#"{"found":2,"stats":[["error",2]]}"#;

#[tokio::test]
async fn done_event_resolves_with_decoded_result() {
    let (fake, provider, context) = setup(FakeSession::default());
    let task = executors::search::search(&context, vec![SearchFilter::plain("error")]);
    let operation = task.uuid();
    assert_eq!(fake.started(), vec![operation]);

    provider.emit(Event::done_json(operation, VALID_SEARCH));

    assert_eq!(
        task.outcome().await,
        TaskOutcome::Resolved(SearchResult {
            found: 2,
            stats: vec![("error".to_string(), 2)],
        })
    );
    assert_eq!(provider.routed_operations(), 0);
}

#[tokio::test]
async fn done_for_abort_id_cancels_instead_of_resolving() {
    let (fake, provider, context) = setup(FakeSession::default());
    let task = executors::search::search(&context, vec![SearchFilter::plain("error")]);
    let operation = task.uuid();

    task.cancel();

    let aborts = fake.aborts();
    assert_eq!(aborts.len(), 1);
    let (abort_id, target) = aborts[0];
    assert_eq!(target, operation);
    assert_ne!(abort_id, operation);
    assert_eq!(task.abort_id(), Some(abort_id));

    provider.emit(Event::done_empty(abort_id));

    assert_eq!(task.outcome().await, TaskOutcome::Canceled);
    assert_eq!(provider.routed_operations(), 0);
}

#[tokio::test]
async fn error_on_abort_operation_still_cancels() {
    let (fake, provider, context) = setup(FakeSession::default());
    let task = executors::sleep::sleep(&context, 1_000, false);

    task.cancel();
    let (abort_id, _) = fake.aborts()[0];
    provider.emit(Event::OperationError {
        uuid: abort_id,
        error: NativeError::new(NativeErrorKind::Interrupted, "nothing to abort"),
    });

    assert_eq!(task.outcome().await, TaskOutcome::Canceled);
}

#[tokio::test]
async fn result_racing_committed_abort_is_discarded() {
    let (fake, provider, context) = setup(FakeSession::default());
    let task = executors::search::search(&context, vec![SearchFilter::plain("warn")]);
    let operation = task.uuid();

    task.cancel();
    assert_eq!(fake.aborts().len(), 1);
    provider.emit(Event::done_json(operation, VALID_SEARCH));

    assert_eq!(task.outcome().await, TaskOutcome::Canceled);
}

#[tokio::test]
async fn done_recalls_cancellation_without_abort_id() {
    let fake = Arc::new(FakeSession::default());
    let provider = EventProvider::new(16);
    let task = CancelableTask::<SearchResult>::new(OperationKind::Search);
    OperationLifecycle::bind(
        task.clone(),
        provider.clone(),
        fake.clone(),
        executors::readers::search(),
    )
    .unwrap();
    // Holds the task in canceling without dispatching an abort.
    task.on_cancel_requested(|| {});

    task.cancel();
    assert_eq!(task.state(), TaskState::Canceling);
    assert_eq!(task.abort_id(), None);
    provider.emit(Event::done_json(task.uuid(), VALID_SEARCH));

    assert!(matches!(task.outcome().await, TaskOutcome::Resolved(result) if result.found == 2));
    assert!(fake.aborts().is_empty());
}

#[tokio::test]
async fn second_cancel_dispatches_no_second_abort() {
    let (fake, _provider, context) = setup(FakeSession::default());
    let task = executors::sleep::sleep(&context, 1_000, false);

    task.cancel();
    let abort_id = task.abort_id();
    task.cancel();

    assert_eq!(fake.aborts().len(), 1);
    assert_eq!(task.abort_id(), abort_id);
}

#[tokio::test]
async fn refused_abort_rejects_with_cancellation_failed() {
    let (fake, provider, context) = setup(FakeSession {
        refuse_abort: true,
        ..FakeSession::default()
    });
    let task = executors::sleep::sleep(&context, 1_000, false);

    task.cancel();

    // Rejected inside `cancel`, without waiting for any event.
    assert_eq!(task.state(), TaskState::Rejected);
    assert_eq!(fake.aborts().len(), 1);
    let TaskOutcome::Rejected(error) = task.outcome().await else {
        panic!("expected rejection");
    };
    assert_eq!(error.kind, CoreErrorKind::CancellationFailed);
    assert_eq!(provider.routed_operations(), 0);

    provider.emit(Event::done_binary(task.uuid(), vec![0xa1]));
    assert_eq!(task.state(), TaskState::Rejected);
}

#[tokio::test]
async fn operation_error_rejects_with_native_message() {
    let (_fake, provider, context) = setup(FakeSession::default());
    let task = executors::search::search(&context, vec![SearchFilter::plain("x")]);

    provider.emit(Event::OperationError {
        uuid: task.uuid(),
        error: NativeError::new(NativeErrorKind::OperationSearch, "regex is invalid"),
    });

    let TaskOutcome::Rejected(error) = task.outcome().await else {
        panic!("expected rejection");
    };
    assert_eq!(error.kind, CoreErrorKind::OperationFailed);
    assert_eq!(error.operation, Some(task.uuid()));
    assert!(error.message.contains("regex is invalid"));
}

#[tokio::test]
async fn malformed_payload_is_distinct_from_operation_error() {
    let (_fake, provider, context) = setup(FakeSession::default());
    let task = executors::sleep::sleep(&context, 10, false);

    provider.emit(Event::done_binary(task.uuid(), vec![0xa1, 0x6a, 0x73]));

    let TaskOutcome::Rejected(error) = task.outcome().await else {
        panic!("expected rejection");
    };
    assert_eq!(error.kind, CoreErrorKind::ParseFailure);
    assert!(error.message.starts_with("fail to parse sleep results"));
    assert_eq!(error.operation, Some(task.uuid()));
}

#[tokio::test]
async fn failing_native_call_is_a_run_failure() {
    let (_fake, provider, context) = setup(FakeSession {
        fail_start: true,
        ..FakeSession::default()
    });
    let task = executors::search::search(&context, vec![SearchFilter::plain("x")]);

    let TaskOutcome::Rejected(error) = task.outcome().await else {
        panic!("expected rejection");
    };
    assert_eq!(error.kind, CoreErrorKind::RunFailure);
    assert!(error.message.starts_with("failed to run search operation"));
    assert_eq!(provider.routed_operations(), 0);
}

#[tokio::test]
async fn session_destroyed_rejects_every_live_task() {
    let (_fake, provider, context) = setup(FakeSession::default());
    let first = executors::sleep::sleep(&context, 1_000, false);
    let second = executors::sleep::sleep(&context, 1_000, false);
    let third = executors::search::search(&context, vec![SearchFilter::plain("x")]);
    second.cancel();
    assert_eq!(second.state(), TaskState::Canceling);

    provider.emit(Event::SessionDestroyed);
    provider.emit(Event::done_json(third.uuid(), VALID_SEARCH));

    for state in [
        first.outcome().await.state(),
        second.outcome().await.state(),
    ] {
        assert_eq!(state, TaskState::Rejected);
    }
    let TaskOutcome::Rejected(error) = third.outcome().await else {
        panic!("expected rejection");
    };
    assert_eq!(error.kind, CoreErrorKind::SessionDestroyed);
    assert_eq!(provider.routed_operations(), 0);
}

#[tokio::test]
async fn started_and_processing_emit_signals_without_settling() {
    let (_fake, provider, context) = setup(FakeSession::default());
    let task = executors::search::search(&context, vec![SearchFilter::plain("x")]);
    let mut signals = task.signals();

    provider.emit(Event::OperationStarted(task.uuid()));
    provider.emit(Event::OperationProcessing(task.uuid()));

    assert_eq!(signals.recv().await.unwrap(), TaskSignal::Confirmed);
    assert_eq!(signals.recv().await.unwrap(), TaskSignal::Processing);
    assert_eq!(task.state(), TaskState::Processing);
}

#[tokio::test]
async fn duplicate_done_after_settle_is_ignored() {
    let (_fake, provider, context) = setup(FakeSession::default());
    let task = executors::search::search(&context, vec![SearchFilter::plain("x")]);
    let operation = task.uuid();

    provider.emit(Event::done_json(operation, VALID_SEARCH));
    provider.emit(Event::done_json(operation, r#"{"found":9,"stats":[]}"#));
    let outcome = task.outcome().await;
    provider.emit(Event::done_json(operation, r#"{"found":7,"stats":[]}"#));

    assert!(matches!(outcome, TaskOutcome::Resolved(ref result) if result.found == 2));
    assert_eq!(task.settled_outcome(), Some(outcome));
}
