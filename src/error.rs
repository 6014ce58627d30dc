//! Unified error handling for the class-organize crate
//!
//! Each layer keeps its own error type ([`AllocationError`], [`StoreError`],
//! [`ChannelError`], [`ServerError`]). [`Error`] wraps them for code that
//! crosses layers, such as the binary, which turns the [`ErrorCategory`]
//! into its process exit code.
//!
//! # Usage
//!
//! ```rust,ignore
//! use class_organize::error::Error;
//!
//! fn report(err: &Error) -> u8 {
//!     if err.is_recoverable() {
//!         eprintln!("retry later: {err}");
//!     }
//!     err.category().exit_code()
//! }
//! ```

use thiserror::Error;

pub use crate::allocation::AllocationError;
pub use crate::notifications::ChannelError;
pub use crate::server::ServerError;
pub use crate::storage::StoreError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad input from a caller
    Validation,
    /// Allocation rules refused the request (conflict, nothing free)
    Allocation,
    /// Persistence and I/O
    Storage,
    /// Notice delivery
    Notification,
    /// Configuration and startup
    Config,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Allocation => "allocation",
            Self::Storage => "storage",
            Self::Notification => "notification",
            Self::Config => "config",
            Self::Other => "other",
        }
    }

    /// Process exit code for a command failing with this category
    ///
    /// Storage and config follow `sysexits.h` (`EX_IOERR`, `EX_CONFIG`).
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation => 2,
            Self::Allocation => 3,
            Self::Storage => 74,
            Self::Notification => 75,
            Self::Config => 78,
            Self::Other => 1,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification error: {0}")]
    Notification(#[from] ChannelError),

    #[error("{0}")]
    Server(#[from] ServerError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Allocation(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Notification(e) => matches!(e, ChannelError::HttpError(_)),
            Self::Server(e) => matches!(e, ServerError::BindError(_)),
            Self::Json(_) | Self::Config(_) | Self::Other { .. } => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Allocation(AllocationError::Validation(_)) => ErrorCategory::Validation,
            Self::Allocation(AllocationError::Storage(_)) => ErrorCategory::Storage,
            Self::Allocation(_) => ErrorCategory::Allocation,
            Self::Store(StoreError::RoomConflict { .. }) => ErrorCategory::Allocation,
            Self::Store(_) => ErrorCategory::Storage,
            Self::Notification(ChannelError::InvalidConfig(_)) => ErrorCategory::Config,
            Self::Notification(_) => ErrorCategory::Notification,
            Self::Server(ServerError::ConfigError(_)) => ErrorCategory::Config,
            Self::Server(_) => ErrorCategory::Other,
            Self::Json(_) => ErrorCategory::Other,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err: Error = AllocationError::validation("start_time is required").into();
        assert_eq!(err.category(), ErrorCategory::Validation);

        let err: Error = AllocationError::NoAllocationCreated { attempted: 3 }.into();
        assert_eq!(err.category(), ErrorCategory::Allocation);

        let err: Error = StoreError::Backend("locked".into()).into();
        assert_eq!(err.category(), ErrorCategory::Storage);

        let err: Error = ChannelError::InvalidConfig("empty url".into()).into();
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_is_recoverable() {
        let err: Error = AllocationError::validation("bad window").into();
        assert!(!err.is_recoverable());

        let err: Error = ServerError::BindError("address in use".into()).into();
        assert!(err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Other);
    }

    #[test]
    fn test_exit_codes_distinguish_categories() {
        let err: Error = AllocationError::InsufficientResources {
            professors: 0,
            rooms: 1,
            classes: 1,
        }
        .into();
        assert_eq!(err.category().exit_code(), 3);

        let err: Error = ServerError::ConfigError("bad address".into()).into();
        assert_eq!(err.category().exit_code(), 78);

        let err: Error = StoreError::Backend("disk full".into()).into();
        assert_eq!(err.category().exit_code(), 74);
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing DATABASE_URL");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert_eq!(err.to_string(), "Config error: missing DATABASE_URL");
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let err: Error = anyhow::anyhow!("root cause").context("loading config").into();
        assert!(err.to_string().contains("loading config"));
        assert!(err.to_string().contains("root cause"));
    }
}
