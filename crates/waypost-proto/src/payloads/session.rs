//! Session management payloads.

use serde::{Deserialize, Serialize};

/// Initial handshake sent by a client after the QUIC connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Free-form client identifier for logs (app name, device tag).
    pub client_name: String,
}

/// Server response to [`Hello`], carrying the assigned session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Session id the server will stamp on frames sent to this client.
    pub session_id: u64,
}

/// Graceful disconnect notice, sent by either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Human-readable reason for the disconnect.
    pub reason: String,
}
