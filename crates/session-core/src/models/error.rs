use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::models::{OperationId, OperationKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    /// The native computation reported a failure through the event channel.
    OperationFailed,
    /// A result payload could not be decoded into the expected shape.
    ParseFailure,
    /// The abort request could not be dispatched or was refused.
    CancellationFailed,
    SessionDestroyed,
    /// The native call that starts an operation failed before it went live.
    RunFailure,
    Cancelled,
    InvalidInput,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoreError {
    pub operation: Option<OperationId>,
    pub task: Option<OperationKind>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation: None,
            task: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_operation(
        operation: OperationId,
        task: OperationKind,
        kind: CoreErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: Some(operation),
            task: Some(task),
            kind,
            message: message.into(),
        }
    }

    pub fn with_task(mut self, task: OperationKind) -> Self {
        self.task = Some(task);
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::Internal, message)
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for CoreError {}
