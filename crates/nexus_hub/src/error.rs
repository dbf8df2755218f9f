//! Hub-level error types.

use thiserror::Error;

/// Top-level errors surfaced by the hub while processing traffic.
#[derive(Debug, Error)]
pub enum HubError {
    /// An inbound frame could not be decoded into an envelope
    #[error("Envelope decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// An envelope decoded but its payload is missing or mistyped fields
    #[error("Malformed payload: {0}")]
    Payload(#[from] crate::envelope::PayloadError),

    /// A reply or broadcast could not be handed to the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// The ownership store rejected an operation
    #[error("Ownership store error: {0}")]
    Store(#[from] crate::ownership::StoreError),

    /// A session operation failed
    #[error("Session error: {0}")]
    Session(#[from] crate::sessions::SessionError),

    /// Internal invariant violation, always a bug
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
