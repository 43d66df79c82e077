//! Error types for composing and sending mail messages.

use crate::types::BlobId;

/// Result type alias for mail operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Mail message error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Malformed mailbox or display name.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Malformed header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Custom header collides with a header managed by the message itself.
    #[error("Header is reserved: {0}")]
    ReservedHeader(String),

    /// The blob store has no object with this ID.
    #[error("Unknown blob: {0}")]
    UnknownBlob(BlobId),

    /// Malformed Message-ID.
    #[error("Invalid Message-ID: {0}")]
    InvalidMessageId(String),

    /// Required fields are missing at send time.
    #[error("Incomplete message: {0}")]
    IncompleteMessage(String),

    /// The message has already been sent.
    #[error("Message has already been sent")]
    AlreadySent,

    /// Delivery failed in the transport.
    #[error("Transport failure: {message}")]
    TransportFailure {
        /// Error message from the transport.
        message: String,
        /// Whether retrying the same message is pointless.
        permanent: bool,
    },

    /// A blob store or user directory failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Creates a transient transport failure.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: message.into(),
            permanent: false,
        }
    }

    /// Creates a permanent transport failure.
    #[must_use]
    pub fn transport_permanent(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: message.into(),
            permanent: true,
        }
    }

    /// Returns true if this is a permanent transport failure.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::TransportFailure { permanent: true, .. })
    }

    /// Returns true if the error was raised by local validation in the builder.
    ///
    /// These errors never change the state of the message.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress(_)
                | Self::InvalidHeader(_)
                | Self::ReservedHeader(_)
                | Self::UnknownBlob(_)
                | Self::InvalidMessageId(_)
                | Self::IncompleteMessage(_)
                | Self::AlreadySent
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
