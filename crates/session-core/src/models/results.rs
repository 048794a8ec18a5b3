use serde::{Deserialize, Serialize};

/// Summary produced by a finished search: total matches and per-filter hits.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub found: u64,
    pub stats: Vec<(String, u64)>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMatchValue {
    pub index: u64,
    pub values: Vec<(u8, Vec<String>)>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SleepResult {
    pub sleep_well: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NearestPosition {
    pub index: u64,
    pub position: u64,
}

/// One bucket per scaled row; each bucket lists `(filter index, matches)`.
pub type ScaledDistribution = Vec<Vec<(u8, u16)>>;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub filter: String,
    pub is_regex: bool,
    pub ignore_case: bool,
    pub is_word: bool,
}

impl SearchFilter {
    pub fn plain(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            is_regex: false,
            ignore_case: false,
            is_word: false,
        }
    }
}
