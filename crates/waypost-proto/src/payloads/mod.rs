//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary so the server can route without parsing the
//! body, but payloads use CBOR: self-describing, compact, and no code
//! generation step. Request payloads model every client-supplied field as
//! `Option` so that an absent field survives deserialization and presence
//! validation stays a relay concern, not a parser concern.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). The variant discriminator is NOT serialized; the frame
//! header's opcode selects the payload type, so a sender cannot pair an
//! opcode with a mismatched body.

pub mod directory;
pub mod location;
pub mod session;

use bytes::{BufMut, Bytes};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads.
///
/// Holds `f64` coordinates, so only `PartialEq` (no `Eq`).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    // Session management
    /// Initial handshake
    Hello(session::Hello),
    /// Server response to Hello
    HelloReply(session::HelloReply),
    /// Graceful disconnect
    Goodbye(session::Goodbye),

    // Location relay
    /// Publish a driver's position
    LocationSet(location::LocationSet),
    /// Result of a position publish
    LocationSetReply(location::LocationSetReply),
    /// Query a driver's last known position
    LocationGet(location::LocationGet),
    /// Result of a position query
    LocationGetReply(location::LocationGetReply),
    /// Position pushed to every other session
    LocationUpdate(location::LocationUpdate),

    // Driver directory
    /// Onboard a new driver
    DriverAdd(directory::NewDriver),
    /// Result of onboarding
    DriverAddReply(directory::DriverAddReply),
    /// List a logistics client's drivers
    DriverList(directory::DriverList),
    /// Result of the listing
    DriverListReply(directory::DriverListReply),

    // Error frame
    /// Protocol-level error response
    Error(ErrorPayload),
}

/// Error payload for error frames.
///
/// These cover protocol-level failures (malformed body, unknown opcode).
/// Operation failures are reported in the operation's own reply type with
/// `success: false`, mirroring an HTTP error body rather than a broken
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Frame was rejected by the server.
    pub const FRAME_REJECTED: u16 = 0x0001;
    /// Payload body could not be decoded.
    pub const INVALID_PAYLOAD: u16 = 0x0002;
    /// Opcode is not one a client may send.
    pub const UNSUPPORTED_OPCODE: u16 = 0x0003;

    /// Create a frame rejection error.
    pub fn frame_rejected(reason: impl Into<String>) -> Self {
        Self { code: Self::FRAME_REJECTED, message: reason.into() }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: msg.into() }
    }

    /// Create an unsupported opcode error.
    #[must_use]
    pub fn unsupported_opcode(opcode: u16) -> Self {
        Self {
            code: Self::UNSUPPORTED_OPCODE,
            message: format!("unsupported opcode: {opcode:#06x}"),
        }
    }
}

fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::LocationSet(_) => Opcode::LocationSet,
            Self::LocationSetReply(_) => Opcode::LocationSetReply,
            Self::LocationGet(_) => Opcode::LocationGet,
            Self::LocationGetReply(_) => Opcode::LocationGetReply,
            Self::LocationUpdate(_) => Opcode::LocationUpdate,
            Self::DriverAdd(_) => Opcode::DriverAdd,
            Self::DriverAddReply(_) => Opcode::DriverAddReply,
            Self::DriverList(_) => Opcode::DriverList,
            Self::DriverListReply(_) => Opcode::DriverListReply,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode the payload body into a buffer.
    ///
    /// Serializes only the inner struct, never the variant tag; the frame
    /// header's opcode identifies the payload type. Size limits are enforced
    /// at frame construction, not here.
    ///
    /// # Errors
    ///
    /// `ProtocolError::CborEncode` if serialization fails.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Hello(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::HelloReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Goodbye(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LocationSet(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LocationSetReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LocationGet(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LocationGetReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LocationUpdate(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::DriverAdd(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::DriverAddReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::DriverList(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::DriverListReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode a payload body, selecting the type from the opcode.
    ///
    /// The size check runs before CBOR parsing so the parser never sees an
    /// oversized input.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed the frame limit
    /// - `ProtocolError::CborDecode` if deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(decode_cbor(bytes)?),
            Opcode::HelloReply => Self::HelloReply(decode_cbor(bytes)?),
            Opcode::Goodbye => Self::Goodbye(decode_cbor(bytes)?),
            Opcode::LocationSet => Self::LocationSet(decode_cbor(bytes)?),
            Opcode::LocationSetReply => Self::LocationSetReply(decode_cbor(bytes)?),
            Opcode::LocationGet => Self::LocationGet(decode_cbor(bytes)?),
            Opcode::LocationGetReply => Self::LocationGetReply(decode_cbor(bytes)?),
            Opcode::LocationUpdate => Self::LocationUpdate(decode_cbor(bytes)?),
            Opcode::DriverAdd => Self::DriverAdd(decode_cbor(bytes)?),
            Opcode::DriverAddReply => Self::DriverAddReply(decode_cbor(bytes)?),
            Opcode::DriverList => Self::DriverList(decode_cbor(bytes)?),
            Opcode::DriverListReply => Self::DriverListReply(decode_cbor(bytes)?),
            Opcode::Error => Self::Error(decode_cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Convert the payload into a transport frame.
    ///
    /// Encodes the body to CBOR, stamps the matching opcode into the header,
    /// and sizes the frame.
    ///
    /// # Errors
    ///
    /// `ProtocolError::CborEncode` if serialization fails.
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Frame::new(header, Bytes::from(buf))
    }

    /// Parse the typed payload out of a raw transport frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the header opcode is unrecognized
    /// - `ProtocolError::CborDecode` if deserialization fails
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}
