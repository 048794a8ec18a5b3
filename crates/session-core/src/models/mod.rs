pub mod error;
pub mod operation;
pub mod results;

pub use error::{CoreError, CoreErrorKind};
pub use operation::{OperationId, OperationKind};
pub use results::{
    ExtractedMatchValue, NearestPosition, ScaledDistribution, SearchFilter, SearchResult,
    SleepResult,
};
