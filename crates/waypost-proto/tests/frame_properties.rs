//! Property-based tests for frame and payload encoding.
//!
//! Verifies serialization for arbitrary inputs rather than hand-picked
//! examples: headers survive the wire, typed payloads survive CBOR, and
//! malformed buffers are rejected instead of misparsed.

use bytes::Bytes;
use proptest::prelude::*;
use waypost_proto::{
    Frame, FrameHeader, Opcode, Payload, ProtocolError,
    payloads::location::{LocationSet, LocationUpdate},
    payloads::session::{Goodbye, Hello},
};

fn arbitrary_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::Hello),
        Just(Opcode::HelloReply),
        Just(Opcode::Goodbye),
        Just(Opcode::LocationSet),
        Just(Opcode::LocationSetReply),
        Just(Opcode::LocationGet),
        Just(Opcode::LocationGetReply),
        Just(Opcode::LocationUpdate),
        Just(Opcode::DriverAdd),
        Just(Opcode::DriverAddReply),
        Just(Opcode::DriverList),
        Just(Opcode::DriverListReply),
        Just(Opcode::Error),
    ]
}

fn arbitrary_header() -> impl Strategy<Value = FrameHeader> {
    (arbitrary_opcode(), any::<u32>(), any::<u64>()).prop_map(
        |(opcode, request_id, sender_id)| {
            let mut header = FrameHeader::new(opcode);
            header.set_request_id(request_id);
            header.set_sender_id(sender_id);
            header
        },
    )
}

fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (arbitrary_header(), prop::collection::vec(any::<u8>(), 0..1024)).prop_map(
        |(header, payload)| {
            Frame::new(header, Bytes::from(payload)).expect("payload under limit")
        },
    )
}

proptest! {
    #[test]
    fn frame_wire_round_trip(frame in arbitrary_frame()) {
        let encoded = frame.encode();
        prop_assert_eq!(encoded.len(), frame.wire_size());

        let decoded = Frame::decode(&encoded).expect("should decode");
        prop_assert_eq!(decoded, frame);
    }

    #[test]
    fn header_fields_survive_wire(header in arbitrary_header()) {
        let frame = Frame::new(header, Bytes::new()).expect("empty payload fits");
        let decoded = Frame::decode(&frame.encode()).expect("should decode");

        prop_assert_eq!(decoded.header.opcode(), header.opcode());
        prop_assert_eq!(decoded.header.request_id(), header.request_id());
        prop_assert_eq!(decoded.header.sender_id(), header.sender_id());
    }

    #[test]
    fn truncation_never_misparses(frame in arbitrary_frame(), cut in 1usize..64) {
        prop_assume!(!frame.payload.is_empty());

        let encoded = frame.encode();
        let cut = cut.min(frame.payload.len());
        let truncated = &encoded[..encoded.len() - cut];

        let truncated_err = matches!(
            Frame::decode(truncated),
            Err(ProtocolError::FrameTruncated { .. })
        );
        prop_assert!(truncated_err);
    }

    #[test]
    fn corrupted_magic_rejected(frame in arbitrary_frame(), corrupt_byte in 0usize..4) {
        let mut encoded = frame.encode().to_vec();
        encoded[corrupt_byte] ^= 0xFF;

        prop_assert_eq!(Frame::decode(&encoded), Err(ProtocolError::InvalidMagic));
    }

    #[test]
    fn location_set_payload_round_trip(
        driver_id in prop::option::of("[A-Za-z0-9]{1,16}"),
        latitude in prop::option::of(-90.0f64..90.0),
        longitude in prop::option::of(-180.0f64..180.0),
        request_id in any::<u32>(),
    ) {
        let payload = Payload::LocationSet(LocationSet { driver_id, latitude, longitude });

        let mut header = FrameHeader::new(Opcode::LocationSet);
        header.set_request_id(request_id);

        let frame = payload.clone().into_frame(header).expect("encodes");
        let wire = frame.encode();

        let received = Frame::decode(&wire).expect("should decode");
        let decoded = Payload::from_frame(&received).expect("should parse payload");
        prop_assert_eq!(decoded, payload);
    }

    #[test]
    fn location_update_payload_round_trip(
        driver_id in "[A-Za-z0-9]{1,16}",
        latitude in -90.0f64..90.0,
        longitude in -180.0f64..180.0,
        seq in any::<u64>(),
    ) {
        let payload = Payload::LocationUpdate(LocationUpdate {
            driver_id,
            latitude,
            longitude,
            seq,
        });

        let frame = payload
            .clone()
            .into_frame(FrameHeader::new(Opcode::LocationUpdate))
            .expect("encodes");
        let decoded = Payload::from_frame(&frame).expect("should parse payload");
        prop_assert_eq!(decoded, payload);
    }
}

#[test]
fn unknown_opcode_surfaces_at_payload_parse() {
    // Frame decode is opcode-agnostic; only typed parsing rejects it.
    let mut wire = FrameHeader::new(Opcode::Hello).to_bytes();
    wire[6..8].copy_from_slice(&0x7777u16.to_be_bytes());

    let received = Frame::decode(&wire).expect("frame layer accepts it");
    assert_eq!(received.header.opcode_enum(), None);
    assert_eq!(Payload::from_frame(&received), Err(ProtocolError::UnknownOpcode(0x7777)));
}

#[test]
fn hello_and_goodbye_bodies() {
    let hello = Payload::Hello(Hello { client_name: "dispatch-board".to_string() });
    let frame = hello.clone().into_frame(FrameHeader::new(Opcode::Hello)).expect("encodes");
    assert_eq!(Payload::from_frame(&frame).expect("decodes"), hello);

    let goodbye = Payload::Goodbye(Goodbye { reason: "shift over".to_string() });
    let frame = goodbye.clone().into_frame(FrameHeader::new(Opcode::Goodbye)).expect("encodes");
    assert_eq!(Payload::from_frame(&frame).expect("decodes"), goodbye);
}
