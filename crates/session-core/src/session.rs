use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::events::{EventProvider, SessionUpdate};
use crate::executors::{self, ExecutorContext};
use crate::logging;
use crate::models::{
    CoreError, CoreErrorKind, ExtractedMatchValue, NearestPosition, OperationKind,
    ScaledDistribution, SearchFilter, SearchResult, SleepResult,
};
use crate::native::{NativeSession, ObserveOptions};
use crate::orchestration::{OrchestrationResult, PendingDrop, SingleFlightManager};
use crate::task::CancelableTask;

pub struct Session {
    uuid: Uuid,
    context: ExecutorContext,
    stream: SessionStream,
    search: SessionSearch,
    destroyed: AtomicBool,
}

impl Session {
    pub fn new(native: Arc<dyn NativeSession>, config: &SessionConfig) -> Self {
        if let Some(filter) = &config.log_filter {
            logging::init_tracing(filter);
        }
        let provider = EventProvider::new(config.updates_capacity);
        let context = ExecutorContext {
            session: native,
            provider,
            signals_capacity: config.signals_capacity,
        };
        let uuid = Uuid::new_v4();
        tracing::debug!(session = %uuid, "session created");

        Self {
            uuid,
            stream: SessionStream {
                context: context.clone(),
            },
            search: SessionSearch::new(&context),
            context,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Event entry point for the native side.
    pub fn provider(&self) -> &EventProvider {
        &self.context.provider
    }

    pub fn updates(&self) -> broadcast::Receiver<SessionUpdate> {
        self.context.provider.updates()
    }

    pub fn stream(&self) -> &SessionStream {
        &self.stream
    }

    pub fn search(&self) -> &SessionSearch {
        &self.search
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Cancels pending search work, destroys the native session and rejects every operation
    /// that is still live. A second call is a no-op.
    pub async fn destroy(&self) -> OrchestrationResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            logging::warn_msg(format!("session '{}' is already destroyed", self.uuid));
            return Ok(());
        }

        let dropped_searches = self.search.begin_drop();
        let native = self.context.session.destroy().await;
        self.context.provider.destroy();
        dropped_searches.settled().await;
        tracing::debug!(session = %self.uuid, "session destroyed");

        native.map_err(|error| {
            CoreError::new(
                CoreErrorKind::OperationFailed,
                logging::error_msg(format!(
                    "fail to destroy native session '{}': {error}",
                    self.uuid
                )),
            )
        })
    }
}

pub struct SessionStream {
    context: ExecutorContext,
}

impl SessionStream {
    pub fn observe(&self, source: ObserveOptions) -> CancelableTask<()> {
        executors::stream::observe(&self.context, source)
    }

    pub fn export(&self, dest: PathBuf, ranges: Vec<RangeInclusive<u64>>) -> CancelableTask<bool> {
        executors::stream::export(&self.context, dest, ranges)
    }

    pub fn export_raw(
        &self,
        dest: PathBuf,
        ranges: Vec<RangeInclusive<u64>>,
    ) -> CancelableTask<bool> {
        executors::stream::export_raw(&self.context, dest, ranges)
    }

    pub fn map(
        &self,
        dataset_len: u16,
        range: Option<RangeInclusive<u64>>,
    ) -> CancelableTask<ScaledDistribution> {
        executors::stream::map(&self.context, dataset_len, range)
    }

    pub fn nearest(&self, position: u64) -> CancelableTask<Option<NearestPosition>> {
        executors::stream::nearest(&self.context, position)
    }

    pub fn merge(&self, files: Vec<PathBuf>) -> CancelableTask<()> {
        executors::stream::merge(&self.context, files)
    }

    pub fn sleep(&self, duration_ms: u64, ignore_cancellation: bool) -> CancelableTask<SleepResult> {
        executors::sleep::sleep(&self.context, duration_ms, ignore_cancellation)
    }
}

pub struct SessionSearch {
    search: SingleFlightManager<Vec<SearchFilter>, SearchResult>,
    values: SingleFlightManager<Vec<String>, ()>,
    extract: SingleFlightManager<Vec<SearchFilter>, Vec<ExtractedMatchValue>>,
}

impl SessionSearch {
    fn new(context: &ExecutorContext) -> Self {
        Self {
            search: SingleFlightManager::new(OperationKind::Search, {
                let context = context.clone();
                move |filters| executors::search::search(&context, filters)
            }),
            values: SingleFlightManager::new(OperationKind::SearchValues, {
                let context = context.clone();
                move |filters| executors::search::search_values(&context, filters)
            }),
            extract: SingleFlightManager::new(OperationKind::ExtractMatches, {
                let context = context.clone();
                move |filters| executors::search::extract_matches(&context, filters)
            }),
        }
    }

    /// Only the latest filter set is searched; earlier pending searches end canceled.
    pub fn search(&self, filters: Vec<SearchFilter>) -> CancelableTask<SearchResult> {
        self.search.run(filters)
    }

    pub fn search_values(&self, filters: Vec<String>) -> CancelableTask<()> {
        self.values.run(filters)
    }

    pub fn extract_matches(
        &self,
        filters: Vec<SearchFilter>,
    ) -> CancelableTask<Vec<ExtractedMatchValue>> {
        self.extract.run(filters)
    }

    pub async fn drop_all(&self) {
        self.begin_drop().settled().await;
    }

    fn begin_drop(&self) -> PendingSearchDrop {
        PendingSearchDrop {
            search: self.search.begin_drop(),
            values: self.values.begin_drop(),
            extract: self.extract.begin_drop(),
        }
    }
}

struct PendingSearchDrop {
    search: PendingDrop<Vec<SearchFilter>, SearchResult>,
    values: PendingDrop<Vec<String>, ()>,
    extract: PendingDrop<Vec<SearchFilter>, Vec<ExtractedMatchValue>>,
}

impl PendingSearchDrop {
    async fn settled(self) {
        self.search.settled().await;
        self.values.settled().await;
        self.extract.settled().await;
    }
}
