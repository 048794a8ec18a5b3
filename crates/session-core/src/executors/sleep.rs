use crate::executors::{ExecutorContext, execute_async, readers};
use crate::models::{OperationKind, SleepResult};
use crate::task::CancelableTask;

/// Diagnostic operation: the native side idles for `duration_ms`. With
/// `ignore_cancellation` it keeps sleeping after an abort, which exercises the path where a
/// result races a dispatched cancellation.
pub fn sleep(
    context: &ExecutorContext,
    duration_ms: u64,
    ignore_cancellation: bool,
) -> CancelableTask<SleepResult> {
    execute_async(
        context,
        OperationKind::Sleep,
        readers::sleep(),
        move |session, operation| session.sleep(duration_ms, ignore_cancellation, operation),
    )
}
