use serde::Deserialize;

use crate::models::{CoreError, CoreErrorKind};
use crate::orchestration::OrchestrationResult;
use crate::task::DEFAULT_SIGNALS_CAPACITY;

pub const UPDATES_CAPACITY_ENV: &str = "SESSION_CORE_UPDATES_CAPACITY";
pub const SIGNALS_CAPACITY_ENV: &str = "SESSION_CORE_SIGNALS_CAPACITY";
pub const LOG_FILTER_ENV: &str = "SESSION_CORE_LOG";

pub const DEFAULT_UPDATES_CAPACITY: usize = 256;

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the broadcast channel carrying session data updates.
    pub updates_capacity: usize,
    /// Capacity of each task's signal channel.
    pub signals_capacity: usize,
    /// When set, a tracing subscriber with this filter is installed on session creation.
    pub log_filter: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            updates_capacity: DEFAULT_UPDATES_CAPACITY,
            signals_capacity: DEFAULT_SIGNALS_CAPACITY,
            log_filter: None,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(raw: &str) -> OrchestrationResult<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("invalid session config: {error}"),
            )
        })?;
        config.validate()
    }

    pub fn from_env() -> OrchestrationResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> OrchestrationResult<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(UPDATES_CAPACITY_ENV) {
            config.updates_capacity = parse_capacity(UPDATES_CAPACITY_ENV, &raw)?;
        }
        if let Some(raw) = lookup(SIGNALS_CAPACITY_ENV) {
            config.signals_capacity = parse_capacity(SIGNALS_CAPACITY_ENV, &raw)?;
        }
        config.log_filter = lookup(LOG_FILTER_ENV).filter(|filter| !filter.trim().is_empty());
        config.validate()
    }

    fn validate(self) -> OrchestrationResult<Self> {
        check_capacity("updates_capacity", self.updates_capacity)?;
        check_capacity("signals_capacity", self.signals_capacity)?;
        Ok(self)
    }
}

fn parse_capacity(key: &str, raw: &str) -> OrchestrationResult<usize> {
    raw.trim().parse::<usize>().map_err(|_| {
        CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("'{key}' must be a positive integer, got '{raw}'"),
        )
    })
}

fn check_capacity(field: &str, value: usize) -> OrchestrationResult<()> {
    if value == 0 {
        return Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("'{field}' must be a positive integer, got 0"),
        ));
    }
    Ok(())
}
