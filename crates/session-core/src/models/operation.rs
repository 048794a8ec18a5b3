use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Search,
    SearchValues,
    ExtractMatches,
    Export,
    ExportRaw,
    Observe,
    Sleep,
    Map,
    Nearest,
    Merge,
}

impl OperationKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::SearchValues => "search values",
            Self::ExtractMatches => "extract matches",
            Self::Export => "export",
            Self::ExportRaw => "raw export",
            Self::Observe => "observe",
            Self::Sleep => "sleep",
            Self::Map => "map",
            Self::Nearest => "nearest position",
            Self::Merge => "merge",
        }
    }
}
