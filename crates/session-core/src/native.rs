use std::future::Future;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind, OperationId, SearchFilter};

pub type NativeCall = Pin<Box<dyn Future<Output = Result<(), NativeError>> + Send>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum NativeErrorKind {
    FileNotFound,
    UnsupportedFileType,
    ComputationFailed,
    Configuration,
    Interrupted,
    OperationSearch,
    NotYetImplemented,
    ChannelError,
    Io,
    Grabber,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?} ({severity:?}): {}", .message.as_deref().unwrap_or("no details"))]
pub struct NativeError {
    pub severity: Severity,
    pub kind: NativeErrorKind,
    pub message: Option<String>,
}

impl NativeError {
    pub fn new(kind: NativeErrorKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: Some(message.into()),
        }
    }

    pub fn unsupported(call: &str) -> Self {
        Self::new(
            NativeErrorKind::NotYetImplemented,
            format!("native session does not support '{call}'"),
        )
    }

    pub fn channel(message: impl Into<String>) -> Self {
        Self::new(NativeErrorKind::ChannelError, message)
    }

    pub fn describe(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("{:?}", self.kind))
    }
}

impl From<NativeError> for CoreError {
    fn from(error: NativeError) -> Self {
        CoreError::new(CoreErrorKind::OperationFailed, error.to_string())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ObserveOrigin {
    File(PathBuf),
    Concat(Vec<PathBuf>),
    Stream(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ParserKind {
    Text,
    Dlt,
    SomeIp,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ObserveOptions {
    pub origin: ObserveOrigin,
    pub parser: ParserKind,
}

impl ObserveOptions {
    pub fn text_file(path: impl Into<PathBuf>) -> Self {
        Self {
            origin: ObserveOrigin::File(path.into()),
            parser: ParserKind::Text,
        }
    }
}

fn not_supported(call: &'static str) -> NativeCall {
    Box::pin(async move { Err(NativeError::unsupported(call)) })
}

/// Calls exposed by a native session. Only [`abort`](NativeSession::abort) is mandatory;
/// operation kinds a backend does not implement fail with `NotYetImplemented`.
pub trait NativeSession: Send + Sync {
    fn abort(&self, abort_id: OperationId, target: OperationId) -> Result<(), NativeError>;

    fn observe(&self, _source: ObserveOptions, _operation: OperationId) -> NativeCall {
        not_supported("observe")
    }

    fn search(&self, _filters: Vec<SearchFilter>, _operation: OperationId) -> NativeCall {
        not_supported("search")
    }

    fn search_values(&self, _filters: Vec<String>, _operation: OperationId) -> NativeCall {
        not_supported("search_values")
    }

    fn extract_matches(&self, _filters: Vec<SearchFilter>, _operation: OperationId) -> NativeCall {
        not_supported("extract_matches")
    }

    fn export(
        &self,
        _dest: PathBuf,
        _ranges: Vec<RangeInclusive<u64>>,
        _operation: OperationId,
    ) -> NativeCall {
        not_supported("export")
    }

    fn export_raw(
        &self,
        _dest: PathBuf,
        _ranges: Vec<RangeInclusive<u64>>,
        _operation: OperationId,
    ) -> NativeCall {
        not_supported("export_raw")
    }

    fn sleep(
        &self,
        _duration_ms: u64,
        _ignore_cancellation: bool,
        _operation: OperationId,
    ) -> NativeCall {
        not_supported("sleep")
    }

    fn get_map(
        &self,
        _dataset_len: u16,
        _range: Option<RangeInclusive<u64>>,
        _operation: OperationId,
    ) -> NativeCall {
        not_supported("get_map")
    }

    fn get_nearest_to(&self, _position: u64, _operation: OperationId) -> NativeCall {
        not_supported("get_nearest_to")
    }

    /// Synchronous shape: returns the id of the operation to watch.
    fn merge(&self, _files: Vec<PathBuf>) -> Result<OperationId, NativeError> {
        Err(NativeError::unsupported("merge"))
    }

    fn destroy(&self) -> NativeCall {
        Box::pin(async { Ok(()) })
    }
}
