pub mod readers;
pub mod search;
pub mod sleep;
pub mod stream;

use std::sync::Arc;

use crate::events::EventProvider;
use crate::lifecycle::{OperationLifecycle, ResultReader};
use crate::models::{CoreError, CoreErrorKind, OperationId, OperationKind};
use crate::native::{NativeCall, NativeError, NativeSession};
use crate::orchestration::current_runtime;
use crate::task::{CancelableTask, DEFAULT_SIGNALS_CAPACITY};

#[derive(Clone)]
pub struct ExecutorContext {
    pub session: Arc<dyn NativeSession>,
    pub provider: EventProvider,
    pub signals_capacity: usize,
}

impl ExecutorContext {
    pub fn new(session: Arc<dyn NativeSession>, provider: EventProvider) -> Self {
        Self {
            session,
            provider,
            signals_capacity: DEFAULT_SIGNALS_CAPACITY,
        }
    }
}

/// Runs an operation whose native call reports start-up failure through its future.
pub fn execute_async<T, F>(
    context: &ExecutorContext,
    kind: OperationKind,
    reader: ResultReader<T>,
    call: F,
) -> CancelableTask<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn NativeSession, OperationId) -> NativeCall,
{
    let task = CancelableTask::with_signals_capacity(kind, context.signals_capacity);
    let operation = task.uuid();
    let runtime = match current_runtime(kind) {
        Ok(runtime) => runtime,
        Err(error) => {
            task.reject(run_failure(kind, operation, &error.message));
            return task;
        }
    };
    if let Err(error) = OperationLifecycle::bind(
        task.clone(),
        context.provider.clone(),
        context.session.clone(),
        reader,
    ) {
        task.reject(run_failure(kind, operation, &error.message));
        return task;
    }

    tracing::debug!(operation = %operation, kind = ?kind, "starting operation");
    let pending = call(context.session.as_ref(), operation);
    let watched = task.clone();
    runtime.spawn(async move {
        if let Err(error) = pending.await {
            if watched.is_processing() {
                watched.reject(run_failure(kind, operation, &error.describe()));
            } else {
                tracing::debug!(
                    operation = %operation,
                    message = %error.describe(),
                    "native call failed after the operation had settled or begun canceling"
                );
            }
        }
    });
    task
}

/// Runs an operation whose native call answers synchronously with the id to watch.
pub fn execute_sync<T, F>(
    context: &ExecutorContext,
    kind: OperationKind,
    reader: ResultReader<T>,
    call: F,
) -> CancelableTask<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn NativeSession) -> Result<OperationId, NativeError>,
{
    let task = CancelableTask::with_signals_capacity(kind, context.signals_capacity);
    let lifecycle = match OperationLifecycle::bind(
        task.clone(),
        context.provider.clone(),
        context.session.clone(),
        reader,
    ) {
        Ok(lifecycle) => lifecycle,
        Err(error) => {
            task.reject(run_failure(kind, task.uuid(), &error.message));
            return task;
        }
    };

    match call(context.session.as_ref()) {
        Ok(operation) => {
            if let Err(error) = lifecycle.rebind(operation) {
                lifecycle.abandon(run_failure(kind, operation, &error.message));
            } else {
                tracing::debug!(operation = %operation, kind = ?kind, "watching operation");
            }
        }
        Err(error) => lifecycle.abandon(run_failure(kind, task.uuid(), &error.describe())),
    }
    task
}

pub(crate) fn run_failure(kind: OperationKind, operation: OperationId, reason: &str) -> CoreError {
    CoreError::for_operation(
        operation,
        kind,
        CoreErrorKind::RunFailure,
        format!("failed to run {} operation: {reason}", kind.label()),
    )
}
