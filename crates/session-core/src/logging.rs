use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber filtered by `filter`. Does nothing when a global subscriber is
/// already set.
pub fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Logs `message` as a warning and hands it back for use in an error.
pub fn warn_msg(message: impl Into<String>) -> String {
    let message = message.into();
    tracing::warn!("{message}");
    message
}

/// Logs `message` as an error and hands it back for use in an error.
pub fn error_msg(message: impl Into<String>) -> String {
    let message = message.into();
    tracing::error!("{message}");
    message
}
