use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::OperationKind;
use crate::orchestration::current_runtime;
use crate::task::{CancelableTask, TaskOutcome};

pub type FlightExecutor<A, T> = Arc<dyn Fn(A) -> CancelableTask<T> + Send + Sync>;

pub struct SingleFlightManager<A, T> {
    inner: Arc<ManagerInner<A, T>>,
}

impl<A, T> Clone for SingleFlightManager<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct ManagerInner<A, T> {
    kind: OperationKind,
    executor: FlightExecutor<A, T>,
    state: Mutex<FlightState<A, T>>,
}

struct QueuedRun<A, T> {
    args: A,
    task: CancelableTask<T>,
}

struct FlightState<A, T> {
    queue: Vec<QueuedRun<A, T>>,
    running: Option<CancelableTask<T>>,
    starting: bool,
    preempt_starting: bool,
    drain_scheduled: bool,
    dropping: bool,
}

impl<A, T> SingleFlightManager<A, T>
where
    A: Send + 'static,
    T: Clone + Send + 'static,
{
    pub fn new(
        kind: OperationKind,
        executor: impl Fn(A) -> CancelableTask<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                kind,
                executor: Arc::new(executor),
                state: Mutex::new(FlightState {
                    queue: Vec::new(),
                    running: None,
                    starting: false,
                    preempt_starting: false,
                    drain_scheduled: false,
                    dropping: false,
                }),
            }),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.inner.kind
    }

    /// Queues `args`, preempting whatever runs now. The returned task is bound to the
    /// underlying operation once it starts.
    pub fn run(&self, args: A) -> CancelableTask<T> {
        let kind = self.inner.kind;
        if let Err(error) = current_runtime(kind) {
            let task = CancelableTask::pending(kind);
            task.reject(error);
            return task;
        }
        let (task, running, schedule) = {
            let mut state = self.lock();
            if state.dropping {
                tracing::debug!(kind = ?kind, "manager is dropping; request canceled");
                return CancelableTask::canceled(kind);
            }
            let task = CancelableTask::pending(kind);
            state.queue.push(QueuedRun {
                args,
                task: task.clone(),
            });
            if state.starting {
                state.preempt_starting = true;
            }
            let schedule = !state.drain_scheduled;
            state.drain_scheduled = true;
            (task, state.running.clone(), schedule)
        };

        if let Some(running) = running {
            tracing::debug!(kind = ?kind, operation = %running.uuid(), "preempting running operation");
            running.cancel();
        }
        if schedule {
            self.spawn_drain();
        }
        task
    }

    pub fn next(&self) {
        let (entry, superseded) = {
            let mut state = self.lock();
            state.drain_scheduled = false;
            if state.running.is_some() || state.starting {
                return;
            }
            let Some(entry) = state.queue.pop() else {
                return;
            };
            let superseded: Vec<QueuedRun<A, T>> = state.queue.drain(..).collect();
            state.starting = true;
            (entry, superseded)
        };

        for stale in superseded {
            stale.task.cancel();
        }

        if entry.task.is_completed() {
            self.lock().starting = false;
            self.next();
            return;
        }

        let underlying = (self.inner.executor)(entry.args);
        bind(&entry.task, &underlying);

        let preempt = {
            let mut state = self.lock();
            state.starting = false;
            state.running = Some(underlying.clone());
            std::mem::take(&mut state.preempt_starting)
        };

        let manager = self.clone();
        underlying.finally(move || manager.finish_running());
        if preempt {
            underlying.cancel();
        }
    }

    /// Cancels every queued and running request and waits until all of them settled. New
    /// requests issued meanwhile are canceled right away.
    pub async fn drop_all(&self) {
        self.begin_drop().settled().await;
    }

    /// Cancels every queued and running request without waiting for them.
    pub fn begin_drop(&self) -> PendingDrop<A, T> {
        let tasks = {
            let mut state = self.lock();
            state.dropping = true;
            if state.starting {
                state.preempt_starting = true;
            }
            let mut tasks: Vec<CancelableTask<T>> =
                state.queue.drain(..).map(|queued| queued.task).collect();
            if let Some(running) = state.running.clone() {
                tasks.push(running);
            }
            tasks
        };

        tracing::debug!(kind = ?self.inner.kind, tasks = tasks.len(), "dropping manager tasks");
        for task in &tasks {
            task.cancel();
        }
        PendingDrop {
            manager: self.clone(),
            tasks,
        }
    }

    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.running.is_none() && !state.starting && state.queue.is_empty()
    }

    pub fn is_dropping(&self) -> bool {
        self.lock().dropping
    }

    fn finish_running(&self) {
        let schedule = {
            let mut state = self.lock();
            state.running = None;
            let schedule = !state.queue.is_empty() && !state.drain_scheduled;
            if schedule {
                state.drain_scheduled = true;
            }
            schedule
        };
        if schedule {
            self.spawn_drain();
        }
    }

    fn spawn_drain(&self) {
        match current_runtime(self.inner.kind) {
            Ok(runtime) => {
                let manager = self.clone();
                runtime.spawn(async move { manager.next() });
            }
            Err(_) => self.next(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlightState<A, T>> {
        // No callbacks run under this lock; a poisoned guard still holds consistent state.
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[must_use = "the manager keeps refusing requests until the drop has settled"]
pub struct PendingDrop<A, T> {
    manager: SingleFlightManager<A, T>,
    tasks: Vec<CancelableTask<T>>,
}

impl<A, T> PendingDrop<A, T>
where
    A: Send + 'static,
    T: Clone + Send + 'static,
{
    pub async fn settled(self) {
        for task in &self.tasks {
            task.outcome().await;
        }
        self.manager.lock().dropping = false;
    }
}

fn bind<T: Clone + Send + 'static>(promised: &CancelableTask<T>, underlying: &CancelableTask<T>) {
    if let Err(error) = promised.set_uuid(underlying.uuid()) {
        tracing::debug!(message = %error.message, "promised task keeps its identity");
    }
    promised.mark_processing();
    underlying.relay_signals_to(promised);
    promised.on_cancel_requested({
        let underlying = underlying.clone();
        move || underlying.cancel()
    });
    underlying.finally({
        let underlying = underlying.clone();
        let promised = promised.clone();
        move || match underlying.settled_outcome() {
            Some(TaskOutcome::Resolved(value)) => {
                promised.resolve(value);
            }
            Some(TaskOutcome::Rejected(error)) => {
                promised.reject(error);
            }
            Some(TaskOutcome::Canceled) | None => {
                promised.settle_canceled();
            }
        }
    });
}
