//! Relay driver error types.
//!
//! Strongly-typed errors for relay processing: session bookkeeping,
//! storage, and frame decoding. Operation-level failures (missing fields,
//! unknown driver) are not errors here; they become reply payloads.

use std::fmt;

use crate::storage::StorageError;

/// Errors that can occur while the relay processes an event.
#[derive(Debug)]
pub enum RelayError {
    /// Session not found in registry.
    ///
    /// A frame arrived for a session that was never accepted or is already
    /// closed. Transient: the client should reconnect.
    SessionNotFound(u64),

    /// Session already registered.
    ///
    /// The runtime handed out a duplicate session ID. Logic bug; session
    /// IDs must be unique.
    SessionAlreadyExists(u64),

    /// Storage operation failed.
    ///
    /// Wraps backend errors. Reaching here means the failure could not be
    /// expressed as an operation reply (it happened outside a request).
    Storage(StorageError),

    /// Frame encoding/decoding error.
    ///
    /// A server-built reply failed to encode. Indicates a bug, not client
    /// misbehavior: client decode failures become Error frames instead.
    Protocol(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::SessionAlreadyExists(id) => write!(f, "session already exists: {id}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for RelayError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<waypost_proto::ProtocolError> for RelayError {
    fn from(err: waypost_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
