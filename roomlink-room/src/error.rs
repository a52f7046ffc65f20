use roomlink_channel::{ChannelError, PublicationId};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The engine named a relaying publication that never became visible
    #[error(
        "Relay protocol violation: publication {relaying_publication_id} not visible after {attempts} attempts"
    )]
    RelayProtocol {
        relaying_publication_id: PublicationId,
        attempts: usize,
    },

    #[error("Relay agent is missing")]
    RelayAgentMissing,

    #[error("Room has been disposed")]
    Disposed,

    #[error("Room context is not set up")]
    ContextNotSetup,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Invariant breaks have no safe default and must reach the caller
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::RelayProtocol { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Turn a channel result into an optional value, logging the failure.
/// Expected refusals (not found, duplicate, disposed) log at debug.
pub(crate) fn absent_on_error<T>(
    result: roomlink_channel::Result<T>,
    operation: &'static str,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) if err.is_expected() => {
            debug!(operation, error = %err, "Channel operation refused");
            None
        }
        Err(err) => {
            warn!(operation, error = %err, "Channel operation failed");
            None
        }
    }
}

pub(crate) fn succeeded(result: roomlink_channel::Result<()>, operation: &'static str) -> bool {
    absent_on_error(result, operation).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_error_conversion() {
        let err: Error = ChannelError::NotFound("publication p1".to_string()).into();
        assert!(matches!(err, Error::Channel(ChannelError::NotFound(_))));
        assert!(!err.is_invariant_violation());
    }

    #[test]
    fn test_absent_on_error() {
        assert_eq!(absent_on_error(Ok(3), "op"), Some(3));
        assert_eq!(
            absent_on_error::<u8>(Err(ChannelError::Native("x".to_string())), "op"),
            None
        );
        assert!(!succeeded(Err(ChannelError::Disposed), "op"));
        assert!(succeeded(Ok(()), "op"));
    }

    #[test]
    fn test_relay_protocol_message() {
        let err = Error::RelayProtocol {
            relaying_publication_id: PublicationId::new("relay-1"),
            attempts: 10,
        };
        assert!(err.is_invariant_violation());
        assert!(err.to_string().contains("relay-1"));
        assert!(err.to_string().contains("10 attempts"));
    }
}
