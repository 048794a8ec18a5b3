use crate::executors::{ExecutorContext, execute_async, readers};
use crate::models::{ExtractedMatchValue, OperationKind, SearchFilter, SearchResult};
use crate::task::CancelableTask;

pub fn search(context: &ExecutorContext, filters: Vec<SearchFilter>) -> CancelableTask<SearchResult> {
    execute_async(
        context,
        OperationKind::Search,
        readers::search(),
        move |session, operation| session.search(filters, operation),
    )
}

/// Values are delivered through `SearchValuesUpdated` events; the task only reports completion.
pub fn search_values(context: &ExecutorContext, filters: Vec<String>) -> CancelableTask<()> {
    execute_async(
        context,
        OperationKind::SearchValues,
        readers::empty(),
        move |session, operation| session.search_values(filters, operation),
    )
}

pub fn extract_matches(
    context: &ExecutorContext,
    filters: Vec<SearchFilter>,
) -> CancelableTask<Vec<ExtractedMatchValue>> {
    execute_async(
        context,
        OperationKind::ExtractMatches,
        readers::extracted_matches(),
        move |session, operation| session.extract_matches(filters, operation),
    )
}
