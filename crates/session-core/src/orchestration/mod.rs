pub mod single_flight;

pub use single_flight::{FlightExecutor, PendingDrop, SingleFlightManager};

use tokio::runtime::Handle;

use crate::models::{CoreError, CoreErrorKind, OperationKind};

pub type OrchestrationResult<T> = Result<T, CoreError>;

/// Handle of the Tokio runtime the caller runs on; operations cannot be driven without one.
pub(crate) fn current_runtime(kind: OperationKind) -> OrchestrationResult<Handle> {
    Handle::try_current().map_err(|error| {
        CoreError::new(
            CoreErrorKind::RunFailure,
            format!("{} operation needs a Tokio runtime: {error}", kind.label()),
        )
        .with_task(kind)
    })
}
