//! Errors that can occur when talking to the secret service

use secret_client_crypto::CryptoError;
use thiserror::Error;

use crate::{operation::OperationKind, transport::TransportError};

/// Errors surfaced by every operation in this crate.
///
/// The type is `Clone` so that a failed session negotiation can be delivered to every caller
/// that was waiting on it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// The service sent a reply that does not have the expected shape.
    #[error("{0}")]
    Protocol(String),

    /// The caller cancelled the operation.
    #[error("The operation was cancelled")]
    Cancelled,

    /// Passed through verbatim from the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    #[allow(missing_docs)]
    Crypto(#[from] CryptoError),

    /// A result was handed to the wrong `*_finish` method. This is a programming error.
    #[error(
        "Result of {actual_kind:?} on {actual_source} was passed to the finish call for \
         {expected_kind:?} on {expected_source}"
    )]
    MismatchedResult {
        /// Object the finish call was made on.
        expected_source: String,
        /// Operation the finish call belongs to.
        expected_kind: OperationKind,
        /// Object the result was produced for.
        actual_source: String,
        /// Operation that produced the result.
        actual_kind: OperationKind,
    },

    /// The [`Service`](crate::Service) an item proxy belonged to has been dropped.
    #[error("The secret service this item belongs to has been released")]
    ServiceReleased,

    /// The service wants to show a prompt before completing the operation.
    #[error("The secret service requires a prompt to complete the operation: {0}")]
    PromptRequired(String),

    /// No usable async runtime for the requested call style.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    pub(crate) fn invalid_secret() -> Self {
        Error::Protocol("Received invalid secret from the secret storage".to_string())
    }

    pub(crate) fn invalid_reply(method: &str) -> Self {
        Error::Protocol(format!("Received invalid reply to {method} from the secret storage"))
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
