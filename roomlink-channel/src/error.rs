//! Error types for channel primitive operations

use thiserror::Error;

/// Channel primitive error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Channel has been disposed")]
    Disposed,

    #[error("Native error: {0}")]
    Native(String),
}

impl ChannelError {
    /// Expected failures are reported to callers as absent results
    /// rather than errors.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::AlreadyExists(_) | Self::InvalidInput(_) | Self::Disposed
        )
    }
}

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;
