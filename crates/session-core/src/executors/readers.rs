use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::events::Payload;
use crate::lifecycle::ResultReader;
use crate::models::{
    CoreError, CoreErrorKind, ExtractedMatchValue, NearestPosition, OperationKind,
    ScaledDistribution, SearchResult, SleepResult,
};
use crate::orchestration::OrchestrationResult;

pub fn decode_json<T: DeserializeOwned>(
    kind: OperationKind,
    payload: Option<&Payload>,
) -> OrchestrationResult<T> {
    match payload {
        Some(Payload::Json(json)) => {
            serde_json::from_str(json).map_err(|error| parse_failure(kind, error.to_string()))
        }
        Some(Payload::Binary(_)) => Err(parse_failure(kind, "expected JSON, got binary payload")),
        None => Err(parse_failure(kind, "payload is missing")),
    }
}

pub fn decode_binary<T: DeserializeOwned>(
    kind: OperationKind,
    payload: Option<&Payload>,
) -> OrchestrationResult<T> {
    match payload {
        Some(Payload::Binary(bytes)) => ciborium::de::from_reader(bytes.as_slice())
            .map_err(|error| parse_failure(kind, error.to_string())),
        Some(Payload::Json(_)) => Err(parse_failure(kind, "expected binary, got JSON payload")),
        None => Err(parse_failure(kind, "payload is missing")),
    }
}

pub fn empty() -> ResultReader<()> {
    Arc::new(|_payload: Option<&Payload>| Ok(()))
}

pub fn search() -> ResultReader<SearchResult> {
    Arc::new(|payload: Option<&Payload>| decode_json(OperationKind::Search, payload))
}

pub fn extracted_matches() -> ResultReader<Vec<ExtractedMatchValue>> {
    Arc::new(|payload: Option<&Payload>| decode_json(OperationKind::ExtractMatches, payload))
}

pub fn scaled_map() -> ResultReader<ScaledDistribution> {
    Arc::new(|payload: Option<&Payload>| decode_json(OperationKind::Map, payload))
}

/// No payload means the stream has no match near the position.
pub fn nearest() -> ResultReader<Option<NearestPosition>> {
    Arc::new(|payload: Option<&Payload>| match payload {
        None => Ok(None),
        payload => decode_json(OperationKind::Nearest, payload),
    })
}

pub fn export(kind: OperationKind) -> ResultReader<bool> {
    Arc::new(move |payload: Option<&Payload>| decode_binary(kind, payload))
}

pub fn sleep() -> ResultReader<SleepResult> {
    Arc::new(|payload: Option<&Payload>| decode_binary(OperationKind::Sleep, payload))
}

fn parse_failure(kind: OperationKind, reason: impl std::fmt::Display) -> CoreError {
    let message = format!("fail to parse {} results: {reason}", kind.label());
    tracing::warn!(kind = ?kind, message = %message, "result payload rejected");
    CoreError::new(CoreErrorKind::ParseFailure, message).with_task(kind)
}
