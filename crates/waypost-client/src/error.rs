//! Client error types.

use thiserror::Error;

/// Errors surfaced by the relay client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection establishment or handshake failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A QUIC stream operation failed.
    #[error("stream error: {0}")]
    Stream(String),

    /// Frame or payload encoding/decoding failed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection closed before a pending reply arrived.
    #[error("connection closed while waiting for a reply")]
    Closed,

    /// The server rejected the frame with an error payload.
    #[error("server rejected request (code {code:#06x}): {message}")]
    Rejected {
        /// Protocol error code.
        code: u16,
        /// Server-supplied message.
        message: String,
    },

    /// The server replied with a payload of the wrong type.
    #[error("unexpected reply payload: {0}")]
    UnexpectedReply(&'static str),
}
