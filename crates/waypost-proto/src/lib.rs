//! Wire protocol for the Waypost driver location relay.
//!
//! A frame is a fixed 32-byte raw binary header followed by a CBOR-encoded
//! payload. The header is big-endian and parsed zero-copy, so the server can
//! route frames (opcode, request id, payload size) without touching the
//! payload. Payload types live in [`payloads`] and are selected by the
//! header's [`Opcode`].
//!
//! Request frames carry a client-assigned `request_id` for reply
//! correlation. A `request_id` of zero marks the request fire-and-forget:
//! the server performs the operation but sends no direct reply.

mod errors;
mod frame;
mod header;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use payloads::Payload;

/// ALPN protocol identifier negotiated during the QUIC/TLS handshake.
pub const ALPN_PROTOCOL: &[u8] = b"waypost";

/// Frame operation codes.
///
/// Each opcode maps to exactly one payload type (see [`Payload`]).
/// `0x00xx` is session management, `0x001x` the location relay, `0x002x`
/// the driver directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client handshake after connecting.
    Hello = 0x0001,
    /// Server reply carrying the assigned session id.
    HelloReply = 0x0002,
    /// Graceful disconnect.
    Goodbye = 0x0003,

    /// Publish a driver's current position.
    LocationSet = 0x0010,
    /// Reply to [`Opcode::LocationSet`].
    LocationSetReply = 0x0011,
    /// Query a driver's last known position.
    LocationGet = 0x0012,
    /// Reply to [`Opcode::LocationGet`].
    LocationGetReply = 0x0013,
    /// Position broadcast to every session except the publisher.
    LocationUpdate = 0x0014,

    /// Onboard a new driver under a logistics client.
    DriverAdd = 0x0020,
    /// Reply to [`Opcode::DriverAdd`].
    DriverAddReply = 0x0021,
    /// List drivers belonging to a logistics client.
    DriverList = 0x0022,
    /// Reply to [`Opcode::DriverList`].
    DriverListReply = 0x0023,

    /// Protocol-level error reply.
    Error = 0x00FF,
}

impl Opcode {
    /// Raw wire value.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value. `None` if unrecognized.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0002 => Some(Self::HelloReply),
            0x0003 => Some(Self::Goodbye),
            0x0010 => Some(Self::LocationSet),
            0x0011 => Some(Self::LocationSetReply),
            0x0012 => Some(Self::LocationGet),
            0x0013 => Some(Self::LocationGetReply),
            0x0014 => Some(Self::LocationUpdate),
            0x0020 => Some(Self::DriverAdd),
            0x0021 => Some(Self::DriverAddReply),
            0x0022 => Some(Self::DriverList),
            0x0023 => Some(Self::DriverListReply),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trip() {
        for opcode in [
            Opcode::Hello,
            Opcode::HelloReply,
            Opcode::Goodbye,
            Opcode::LocationSet,
            Opcode::LocationSetReply,
            Opcode::LocationGet,
            Opcode::LocationGetReply,
            Opcode::LocationUpdate,
            Opcode::DriverAdd,
            Opcode::DriverAddReply,
            Opcode::DriverList,
            Opcode::DriverListReply,
            Opcode::Error,
        ] {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unknown_opcode_rejected() {
        assert_eq!(Opcode::from_u16(0xBEEF), None);
    }
}
