use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::OperationId;
use crate::native::NativeError;

/// Raw result payload attached to `OperationDone`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Json(String),
    Binary(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionUpdate {
    StreamUpdated(u64),
    FileRead,
    SearchUpdated {
        found: u64,
        stat: HashMap<String, u64>,
    },
    SearchValuesUpdated(HashMap<u8, (f64, f64)>),
    IndexedMapUpdated {
        len: u64,
    },
    Progress {
        uuid: OperationId,
        count: u64,
        total: Option<u64>,
    },
    SessionDestroyed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OperationDone {
        uuid: OperationId,
        result: Option<Payload>,
    },
    OperationError {
        uuid: OperationId,
        error: NativeError,
    },
    OperationStarted(OperationId),
    OperationProcessing(OperationId),
    SessionDestroyed,
    Update(SessionUpdate),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OperationDone { .. } => "OperationDone",
            Self::OperationError { .. } => "OperationError",
            Self::OperationStarted(_) => "OperationStarted",
            Self::OperationProcessing(_) => "OperationProcessing",
            Self::SessionDestroyed => "SessionDestroyed",
            Self::Update(_) => "Update",
        }
    }

    /// Correlation key; `None` for session-wide events.
    pub fn operation(&self) -> Option<OperationId> {
        match self {
            Self::OperationDone { uuid, .. }
            | Self::OperationError { uuid, .. }
            | Self::OperationStarted(uuid)
            | Self::OperationProcessing(uuid) => Some(*uuid),
            Self::SessionDestroyed | Self::Update(_) => None,
        }
    }

    pub fn done_json(uuid: OperationId, json: impl Into<String>) -> Self {
        Self::OperationDone {
            uuid,
            result: Some(Payload::Json(json.into())),
        }
    }

    pub fn done_binary(uuid: OperationId, bytes: Vec<u8>) -> Self {
        Self::OperationDone {
            uuid,
            result: Some(Payload::Binary(bytes)),
        }
    }

    pub fn done_empty(uuid: OperationId) -> Self {
        Self::OperationDone { uuid, result: None }
    }
}
