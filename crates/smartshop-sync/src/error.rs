//! # Sync Error Types
//!
//! Error types for repository, mirror and configuration operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │       Local             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  RemoteWrite    │  │  Database               │ │
//! │  │  ConfigLoad     │  │  Stream         │  │  InvalidRecord          │ │
//! │  │  ConfigSave     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │    Lifecycle    │   Every variant maps to one ErrorKind, which the  │
//! │  │                 │   view states and CLI use to decide how to show   │
//! │  │  NotInitialized │   a failure.                                      │
//! │  │  ShuttingDown   │                                                   │
//! │  │  ChannelError   │                                                   │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A record or input broke the Product rules.
    Validation,

    /// The remote store did not confirm a save or delete.
    RemoteWrite,

    /// A read subscription failed.
    Stream,

    /// The local cache failed.
    Database,

    /// Configuration could not be loaded, saved or validated.
    Config,

    /// Lifecycle and internal plumbing.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::RemoteWrite => write!(f, "remote_write"),
            ErrorKind::Stream => write!(f, "stream"),
            ErrorKind::Database => write!(f, "database"),
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Sync error type covering all repository failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The remote store did not confirm a write.
    ///
    /// The local cache is left unchanged.
    #[error("Remote {operation} of product {id} failed: {reason}")]
    RemoteWrite {
        operation: String,
        id: String,
        reason: String,
    },

    /// A read subscription failed or ended.
    #[error("Stream failed: {0}")]
    Stream(String),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Local cache operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A record broke the Product invariants and was not written anywhere.
    #[error("{0}")]
    InvalidRecord(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// The process-wide catalog has not been initialized.
    #[error("Catalog is not initialized")]
    NotInitialized,

    /// The repository is shutting down.
    #[error("Repository is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl SyncError {
    /// Creates a RemoteWrite error.
    pub fn remote_write(
        operation: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SyncError::RemoteWrite {
            operation: operation.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::InvalidConfig(_)
            | SyncError::ConfigLoadFailed(_)
            | SyncError::ConfigSaveFailed(_) => ErrorKind::Config,
            SyncError::RemoteWrite { .. } => ErrorKind::RemoteWrite,
            SyncError::Stream(_) => ErrorKind::Stream,
            SyncError::Database(_) => ErrorKind::Database,
            SyncError::InvalidRecord(_) => ErrorKind::Validation,
            SyncError::NotInitialized | SyncError::ShuttingDown | SyncError::ChannelError(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns true if repeating the operation may succeed.
    ///
    /// The repository itself never retries writes; this is a hint for
    /// callers and for the mirror's resubscribe loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteWrite { .. } | SyncError::Stream(_) | SyncError::Database(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        self.kind() == ErrorKind::Config
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<smartshop_db::DbError> for SyncError {
    fn from(err: smartshop_db::DbError) -> Self {
        match err {
            smartshop_db::DbError::InvalidRecord(reason) => SyncError::InvalidRecord(reason),
            other => SyncError::Database(other.to_string()),
        }
    }
}

impl From<smartshop_core::CoreError> for SyncError {
    fn from(err: smartshop_core::CoreError) -> Self {
        SyncError::InvalidRecord(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            SyncError::remote_write("save", "p1", "offline").kind(),
            ErrorKind::RemoteWrite
        );
        assert_eq!(SyncError::Stream("closed".into()).kind(), ErrorKind::Stream);
        assert_eq!(
            SyncError::InvalidRecord("bad".into()).kind(),
            ErrorKind::Validation
        );
        assert!(SyncError::InvalidConfig("bad".into()).is_config_error());
        assert!(!SyncError::ShuttingDown.is_config_error());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::remote_write("delete", "p1", "timeout").is_retryable());
        assert!(SyncError::Stream("reset".into()).is_retryable());

        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::InvalidRecord("bad".into()).is_retryable());
    }

    #[test]
    fn test_db_error_conversion() {
        let err: SyncError = smartshop_db::DbError::InvalidRecord("price".into()).into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: SyncError = smartshop_db::DbError::PoolExhausted.into();
        assert_eq!(err.kind(), ErrorKind::Database);
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::remote_write("save", "abc-123", "permission denied");
        assert!(err.to_string().contains("save"));
        assert!(err.to_string().contains("abc-123"));
        assert!(err.to_string().contains("permission denied"));
    }
}
