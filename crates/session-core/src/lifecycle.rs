//! Binds one [`CancelableTask`] to the event stream of one native operation.
//!
//! The controller routes the operation id (and, once cancellation starts, the abort id)
//! from the [`EventProvider`] into a private channel and drives the task from a spawned
//! loop. Every route is torn down from the task's finalizer, so whichever path settles the
//! task also ends the subscriptions.
//!
//! ```text
//! Active ──cancel()──► Canceling{abort id} ──Done/Error(abort id)──► Canceled
//!   │                      │  └─Done(operation id)──────────────────► Canceled
//!   │                      └─abort dispatch fails──────────────────► Rejected(CancellationFailed)
//!   ├─Done(operation id)──► result reader ──► Resolved | Rejected(ParseFailure)
//!   ├─Error(operation id)─► Rejected(OperationFailed)
//!   └─SessionDestroyed (any state) ─────────────────────────────────► Rejected(SessionDestroyed)
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::{Event, EventProvider, EventReceiver, EventSender, Payload, SubscriptionSet};
use crate::models::{CoreError, CoreErrorKind, OperationId};
use crate::native::{NativeError, NativeSession};
use crate::orchestration::{OrchestrationResult, current_runtime};
use crate::task::{CancelableTask, TaskSignal};

/// Decodes the raw payload of a finished operation.
pub type ResultReader<T> =
    Arc<dyn Fn(Option<&Payload>) -> OrchestrationResult<T> + Send + Sync>;

pub struct OperationLifecycle<T> {
    task: CancelableTask<T>,
    provider: EventProvider,
    sender: EventSender,
    subscriptions: Arc<SubscriptionSet>,
}

impl<T: Send + 'static> OperationLifecycle<T> {
    /// Subscribes to the task's operation id and starts processing events for it.
    pub fn bind(
        task: CancelableTask<T>,
        provider: EventProvider,
        session: Arc<dyn NativeSession>,
        reader: ResultReader<T>,
    ) -> OrchestrationResult<Self> {
        let runtime = current_runtime(task.kind())?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(SubscriptionSet::new());
        let operation = task.uuid();

        subscriptions.insert(provider.route(operation, sender.clone())?);

        task.finally({
            let subscriptions = subscriptions.clone();
            move || subscriptions.destroy_all()
        });

        task.on_cancel_requested({
            let task = task.clone();
            let provider = provider.clone();
            let sender = sender.clone();
            let subscriptions = subscriptions.clone();
            move || {
                request_abort(&task, &provider, &sender, &subscriptions, session.as_ref());
            }
        });

        runtime.spawn(drive(task.clone(), operation, receiver, reader));

        Ok(Self {
            task,
            provider,
            sender,
            subscriptions,
        })
    }

    pub fn task(&self) -> &CancelableTask<T> {
        &self.task
    }

    /// Watches `operation` instead of the task's own id; used when the native call hands
    /// back the id it will report under.
    pub fn rebind(&self, operation: OperationId) -> OrchestrationResult<()> {
        if operation == self.task.uuid() {
            return Ok(());
        }
        self.task.set_uuid(operation)?;
        self.subscriptions.destroy_all();
        self.subscriptions
            .insert(self.provider.route(operation, self.sender.clone())?);
        Ok(())
    }

    /// Tears the subscriptions down and rejects the task before it ever went live.
    pub fn abandon(&self, error: CoreError) {
        self.subscriptions.destroy_all();
        self.task.reject(error);
    }
}

fn request_abort<T: Send + 'static>(
    task: &CancelableTask<T>,
    provider: &EventProvider,
    sender: &EventSender,
    subscriptions: &SubscriptionSet,
    session: &dyn NativeSession,
) {
    let operation = task.uuid();
    let Some(abort_id) = task.mint_abort_id() else {
        tracing::debug!(operation = %operation, "abort not dispatched: cancellation was recalled");
        return;
    };

    match provider.route(abort_id, sender.clone()) {
        Ok(subscription) => subscriptions.insert(subscription),
        Err(error) => {
            task.reject(cancellation_failed(task, operation, &error.message));
            return;
        }
    }

    tracing::debug!(operation = %operation, abort = %abort_id, "dispatching abort");
    // The abort id is committed at this point, so a refused abort cannot be recalled.
    if let Err(error) = session.abort(abort_id, operation) {
        task.reject(cancellation_failed(task, operation, &error.describe()));
    }
}

async fn drive<T: Send + 'static>(
    task: CancelableTask<T>,
    operation: OperationId,
    mut receiver: EventReceiver,
    reader: ResultReader<T>,
) {
    while let Some(event) = receiver.recv().await {
        handle_event(&task, &event, reader.as_ref());
        if task.is_completed() {
            break;
        }
    }
    tracing::trace!(operation = %operation, "life-cycle controller finished");
}

fn handle_event<T: Send + 'static>(
    task: &CancelableTask<T>,
    event: &Event,
    reader: &(dyn Fn(Option<&Payload>) -> OrchestrationResult<T> + Send + Sync),
) {
    let operation = task.uuid();
    let abort_id = task.abort_id();

    match event {
        Event::SessionDestroyed => {
            task.reject(CoreError::for_operation(
                operation,
                task.kind(),
                CoreErrorKind::SessionDestroyed,
                format!(
                    "session destroyed while {} operation '{operation}' was live",
                    task.kind().label()
                ),
            ));
        }
        Event::OperationDone { uuid, .. } | Event::OperationError { uuid, .. }
            if Some(*uuid) == abort_id =>
        {
            if let Event::OperationError { error, .. } = event {
                tracing::debug!(
                    operation = %operation,
                    message = %error.describe(),
                    "abort operation reported an error; treating task as canceled"
                );
            }
            task.settle_canceled();
        }
        Event::OperationDone { uuid, result } if *uuid == operation => {
            if abort_id.is_some() {
                tracing::warn!(
                    operation = %operation,
                    "operation finished after abort was dispatched; result discarded"
                );
                task.settle_canceled();
                return;
            }
            if task.is_canceling() && !task.try_to_stop_cancellation() {
                tracing::warn!(operation = %operation, "done ignored: cancellation can no longer be recalled");
                return;
            }
            match reader(result.as_ref()) {
                Ok(value) => {
                    task.resolve(value);
                }
                Err(error) => {
                    task.reject(CoreError {
                        operation: error.operation.or(Some(operation)),
                        task: error.task.or(Some(task.kind())),
                        ..error
                    });
                }
            }
        }
        Event::OperationError { uuid, error } if *uuid == operation => {
            if abort_id.is_some() {
                task.settle_canceled();
                return;
            }
            task.try_to_stop_cancellation();
            task.reject(operation_failed(task, operation, error));
        }
        Event::OperationStarted(uuid) if *uuid == operation => task.emit(TaskSignal::Confirmed),
        Event::OperationProcessing(uuid) if *uuid == operation => {
            task.emit(TaskSignal::Processing)
        }
        other => {
            tracing::trace!(operation = %operation, event = other.name(), "event not addressed to this operation");
        }
    }
}

fn operation_failed<T: Send + 'static>(
    task: &CancelableTask<T>,
    operation: OperationId,
    error: &NativeError,
) -> CoreError {
    CoreError::for_operation(
        operation,
        task.kind(),
        CoreErrorKind::OperationFailed,
        format!(
            "{} operation '{operation}' failed: {error}",
            task.kind().label()
        ),
    )
}

fn cancellation_failed<T: Send + 'static>(
    task: &CancelableTask<T>,
    operation: OperationId,
    reason: &str,
) -> CoreError {
    let message = format!(
        "fail to cancel {} operation '{operation}': {reason}",
        task.kind().label()
    );
    tracing::error!(operation = %operation, message = %message, "cancellation failed");
    CoreError::for_operation(
        operation,
        task.kind(),
        CoreErrorKind::CancellationFailed,
        message,
    )
}
