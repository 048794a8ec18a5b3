use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::executors::{ExecutorContext, execute_async, execute_sync, readers};
use crate::models::{NearestPosition, OperationKind, ScaledDistribution};
use crate::native::ObserveOptions;
use crate::task::CancelableTask;

pub fn observe(context: &ExecutorContext, source: ObserveOptions) -> CancelableTask<()> {
    execute_async(
        context,
        OperationKind::Observe,
        readers::empty(),
        move |session, operation| session.observe(source, operation),
    )
}

/// Resolves with `true` when the native side wrote the file.
pub fn export(
    context: &ExecutorContext,
    dest: PathBuf,
    ranges: Vec<RangeInclusive<u64>>,
) -> CancelableTask<bool> {
    execute_async(
        context,
        OperationKind::Export,
        readers::export(OperationKind::Export),
        move |session, operation| session.export(dest, ranges, operation),
    )
}

pub fn export_raw(
    context: &ExecutorContext,
    dest: PathBuf,
    ranges: Vec<RangeInclusive<u64>>,
) -> CancelableTask<bool> {
    execute_async(
        context,
        OperationKind::ExportRaw,
        readers::export(OperationKind::ExportRaw),
        move |session, operation| session.export_raw(dest, ranges, operation),
    )
}

pub fn map(
    context: &ExecutorContext,
    dataset_len: u16,
    range: Option<RangeInclusive<u64>>,
) -> CancelableTask<ScaledDistribution> {
    execute_async(
        context,
        OperationKind::Map,
        readers::scaled_map(),
        move |session, operation| session.get_map(dataset_len, range, operation),
    )
}

pub fn nearest(context: &ExecutorContext, position: u64) -> CancelableTask<Option<NearestPosition>> {
    execute_async(
        context,
        OperationKind::Nearest,
        readers::nearest(),
        move |session, operation| session.get_nearest_to(position, operation),
    )
}

pub fn merge(context: &ExecutorContext, files: Vec<PathBuf>) -> CancelableTask<()> {
    execute_sync(
        context,
        OperationKind::Merge,
        readers::empty(),
        move |session| session.merge(files),
    )
}
