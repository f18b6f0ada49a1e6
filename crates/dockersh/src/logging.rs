//! Logger setup.

use log::LevelFilter;

/// Environment variable that overrides the log level.
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";

/// Logging configuration, built once at startup and handed to [`LogSettings::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
}

impl LogSettings {
    /// `log_level` wins when it names a level; otherwise `debug` selects
    /// `Debug` and the default is `Info`.
    pub fn new(debug: bool, log_level: Option<&str>) -> Self {
        let fallback = if debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };
        let level = log_level
            .and_then(|value| value.trim().parse::<LevelFilter>().ok())
            .unwrap_or(fallback);
        Self { level }
    }

    /// Settings from `--debug` and the process environment.
    pub fn from_env(debug: bool) -> Self {
        let log_level = std::env::var(LOG_LEVEL_VAR).ok();
        Self::new(debug, log_level.as_deref())
    }

    /// Install the global logger. Logs go to stderr.
    pub fn init(&self) {
        env_logger::Builder::new()
            .filter_level(self.level)
            .format_timestamp(None)
            .init();
    }
}
