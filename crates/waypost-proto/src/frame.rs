//! Frame assembly and parsing.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    errors::{ProtocolError, Result},
    header::FrameHeader,
};

/// A complete wire frame: header plus opaque payload bytes.
///
/// The payload stays as raw [`Bytes`] here; decoding into a typed
/// [`crate::Payload`] is a separate step so routing code can forward frames
/// (broadcasts in particular) without re-serializing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header.
    pub header: FrameHeader,
    /// Raw payload bytes (CBOR).
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, stamping the payload size into the header.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    /// [`FrameHeader::MAX_PAYLOAD_SIZE`].
    pub fn new(mut header: FrameHeader, payload: Bytes) -> Result<Self> {
        if payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        header.set_payload_size(payload.len() as u32);
        Ok(Self { header, payload })
    }

    /// Serialize the frame to contiguous wire bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + self.payload.len());
        buf.put_slice(&self.header.to_bytes());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a frame from wire bytes.
    ///
    /// Validates the header and checks that the buffer holds exactly as
    /// many payload bytes as the header claims.
    ///
    /// # Errors
    ///
    /// Any header validation error, or [`ProtocolError::FrameTruncated`]
    /// if the buffer is shorter than `header.payload_size()` past the
    /// header.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let available = bytes.len() - FrameHeader::SIZE;
        if available < payload_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: available,
            });
        }

        let payload =
            Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..FrameHeader::SIZE + payload_size]);
        Ok(Self { header, payload })
    }

    /// Total serialized size in bytes.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }
}
