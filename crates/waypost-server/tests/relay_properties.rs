//! Property tests for relay invariants.
//!
//! - A rejected publish never mutates the position store.
//! - Accepted publishes assign strictly increasing sequence numbers.
//! - Arbitrary garbage payload bytes never crash the relay.

use bytes::Bytes;
use proptest::prelude::*;
use waypost_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::{directory::DriverRecord, location::LocationSet},
};
use waypost_server::{
    Environment, MemoryStorage, RelayAction, RelayConfig, RelayDriver, RelayEvent, Storage,
};

#[derive(Clone)]
struct FixedEnv;

impl Environment for FixedEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x42);
    }

    fn wall_clock_secs(&self) -> u64 {
        1_724_400_000
    }
}

fn relay_with_driver(driver_id: &str) -> RelayDriver<FixedEnv, MemoryStorage> {
    let storage = MemoryStorage::new();
    storage
        .create_driver(&waypost_server::storage::StoredDriver {
            record: DriverRecord {
                driver_id: driver_id.to_string(),
                logistic_client_id: "LC1".to_string(),
                name: "Asha".to_string(),
                email: "asha@example.com".to_string(),
                contact_number: "9800000001".to_string(),
                license_number: "KA-01-2024".to_string(),
                vehicle_number: "KA01AB1234".to_string(),
                chassis_number: "CH-778899".to_string(),
            },
            pwd_digest: vec![0; 32],
            created_at_secs: 0,
        })
        .expect("seed driver");

    let mut relay = RelayDriver::new(FixedEnv, storage, RelayConfig::default());
    relay.process_event(RelayEvent::ConnectionAccepted { session_id: 1 }).expect("accept");
    relay
}

fn set_frame(set: LocationSet, request_id: u32) -> Frame {
    let payload = Payload::LocationSet(set);
    let mut header = FrameHeader::new(payload.opcode());
    header.set_request_id(request_id);
    payload.into_frame(header).expect("encode failed")
}

/// A LocationSet with at least one required field missing or the driver id
/// empty.
fn incomplete_set() -> impl Strategy<Value = LocationSet> {
    (
        prop::option::of("[a-z0-9]{0,12}"),
        prop::option::of(-90.0..90.0f64),
        prop::option::of(-180.0..180.0f64),
    )
        .prop_filter("at least one field must be absent or blank", |(id, lat, lon)| {
            id.as_deref().is_none_or(str::is_empty) || lat.is_none() || lon.is_none()
        })
        .prop_map(|(driver_id, latitude, longitude)| LocationSet {
            driver_id,
            latitude,
            longitude,
        })
}

proptest! {
    #[test]
    fn rejected_publishes_never_mutate_the_store(sets in prop::collection::vec(incomplete_set(), 1..20)) {
        let mut relay = relay_with_driver("D1");

        for (i, set) in sets.into_iter().enumerate() {
            let actions = relay
                .process_event(RelayEvent::FrameReceived {
                    session_id: 1,
                    frame: set_frame(set, (i + 1) as u32),
                })
                .expect("relay must not fail");

            let broadcasted =
                actions.iter().any(|a| matches!(a, RelayAction::BroadcastExceptSender { .. }));
            prop_assert!(!broadcasted);
        }

        prop_assert_eq!(relay.storage().position_count(), 0);
    }

    #[test]
    fn accepted_publishes_have_strictly_increasing_seq(
        updates in prop::collection::vec((-90.0..90.0f64, -180.0..180.0f64), 1..30),
    ) {
        let mut relay = relay_with_driver("D1");

        for (i, (lat, lon)) in updates.iter().enumerate() {
            let actions = relay
                .process_event(RelayEvent::FrameReceived {
                    session_id: 1,
                    frame: set_frame(
                        LocationSet {
                            driver_id: Some("D1".to_string()),
                            latitude: Some(*lat),
                            longitude: Some(*lon),
                        },
                        (i + 1) as u32,
                    ),
                })
                .expect("relay must not fail");

            let reply = actions
                .iter()
                .find_map(|a| match a {
                    RelayAction::SendToSession { frame, .. } => Some(frame),
                    _ => None,
                })
                .expect("reply sent");

            match Payload::from_frame(reply).expect("reply decodes") {
                Payload::LocationSetReply(r) => {
                    prop_assert!(r.success);
                    prop_assert_eq!(r.position.expect("position").seq, (i + 1) as u64);
                }
                other => prop_assert!(false, "unexpected reply: {other:?}"),
            }
        }

        prop_assert_eq!(relay.storage().position_count(), 1);
    }

    #[test]
    fn garbage_payload_bytes_get_an_error_reply(body in prop::collection::vec(any::<u8>(), 1..256)) {
        let mut relay = relay_with_driver("D1");

        let mut header = FrameHeader::new(Opcode::LocationSet);
        header.set_request_id(7);
        header.set_payload_size(body.len() as u32);
        let frame = Frame::new(header, Bytes::from(body)).expect("frame fits");

        // Valid CBOR by coincidence gets a normal reply; anything else
        // must come back as a protocol error, never a crash.
        let actions = relay
            .process_event(RelayEvent::FrameReceived { session_id: 1, frame })
            .expect("relay must not fail");

        let reply = actions
            .iter()
            .find_map(|a| match a {
                RelayAction::SendToSession { frame, .. } => Some(frame),
                _ => None,
            })
            .expect("reply sent");
        prop_assert!(Payload::from_frame(reply).is_ok());
    }
}
