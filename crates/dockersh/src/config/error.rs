//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration resolution.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while resolving the effective configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The calling user's name, home, uid or gid could not be determined.
    #[error("could not determine the calling user: {0}")]
    Identity(String),

    /// The admin config file exists but could not be read or parsed.
    #[error("could not load admin config {}: {message}", .path.display())]
    AdminSource { path: PathBuf, message: String },

    /// The user's own config file exists but could not be read or parsed.
    #[error("could not load user config {}: {message}", .path.display())]
    UserSource { path: PathBuf, message: String },
}

/// Which layer a config file feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    Admin,
    User,
}

impl ConfigOrigin {
    pub(crate) fn error(self, path: impl Into<PathBuf>, message: impl ToString) -> ConfigError {
        let path = path.into();
        let message = message.to_string();
        match self {
            ConfigOrigin::Admin => ConfigError::AdminSource { path, message },
            ConfigOrigin::User => ConfigError::UserSource { path, message },
        }
    }
}

impl std::fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigOrigin::Admin => write!(f, "admin"),
            ConfigOrigin::User => write!(f, "user"),
        }
    }
}

/// Errors in the contents of a config file.
#[derive(Debug, Error)]
pub enum ConfigFormatError {
    #[error("syntax error: {0}")]
    Syntax(#[from] ini::ParseError),

    #[error("unknown section [{0}]")]
    UnknownSection(String),

    #[error("key '{0}' appears before any section")]
    OutsideSection(String),

    #[error("[{section}] {key}: {message}")]
    InvalidValue {
        section: String,
        key: String,
        message: String,
    },
}
