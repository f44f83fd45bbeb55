//! Chaos tests for storage fault handling.
//!
//! Verifies the relay degrades to error replies when storage fails, and
//! that partially failing backends never leave positions half-written:
//! whatever a query returns must be a position that was acknowledged.

use proptest::prelude::*;
use waypost_proto::{
    Frame, FrameHeader, Payload,
    payloads::{directory::DriverRecord, location::LocationSet},
};
use waypost_server::{
    ChaoticStorage, Environment, MemoryStorage, RelayAction, RelayConfig, RelayDriver,
    RelayEvent, Storage, StorageError,
};

#[derive(Clone)]
struct FixedEnv;

impl Environment for FixedEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0xA5);
    }

    fn wall_clock_secs(&self) -> u64 {
        1_724_400_000
    }
}

fn stored_driver(driver_id: &str) -> waypost_server::storage::StoredDriver {
    waypost_server::storage::StoredDriver {
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
    }
}

fn location_set_frame(driver_id: &str, lat: f64, lon: f64, request_id: u32) -> Frame {
    let payload = Payload::LocationSet(LocationSet {
        driver_id: Some(driver_id.to_string()),
        latitude: Some(lat),
        longitude: Some(lon),
    });
    let mut header = FrameHeader::new(payload.opcode());
    header.set_request_id(request_id);
    payload.into_frame(header).expect("encode failed")
}

#[test]
fn full_failure_rate_degrades_to_error_replies() {
    let inner = MemoryStorage::new();
    inner.create_driver(&stored_driver("D1")).expect("seed driver");

    let storage = ChaoticStorage::new(inner, 1.0);
    let mut relay = RelayDriver::new(FixedEnv, storage, RelayConfig::default());
    relay.process_event(RelayEvent::ConnectionAccepted { session_id: 1 }).expect("accept");
    relay.process_event(RelayEvent::ConnectionAccepted { session_id: 2 }).expect("accept");

    let actions = relay
        .process_event(RelayEvent::FrameReceived {
            session_id: 1,
            frame: location_set_frame("D1", 12.9, 77.6, 1),
        })
        .expect("chaos must not crash the relay");

    // No broadcast for an unwritten position
    assert!(!actions.iter().any(|a| matches!(a, RelayAction::BroadcastExceptSender { .. })));

    let reply = actions
        .iter()
        .find_map(|a| match a {
            RelayAction::SendToSession { frame, .. } => Some(frame),
            _ => None,
        })
        .expect("error reply sent");
    match Payload::from_frame(reply).expect("reply decodes") {
        Payload::LocationSetReply(r) => {
            assert!(!r.success);
            assert_eq!(r.message, "Internal Server Error!");
        },
        other => panic!("unexpected reply: {other:?}"),
    }

    assert_eq!(relay.storage().inner().position_count(), 0);
}

#[test]
fn prop_acknowledged_writes_are_readable_under_chaos() {
    proptest!(|(
        failure_rate in 0.0..0.8f64,
        seed in any::<u64>(),
        updates in prop::collection::vec((-90.0..90.0f64, -180.0..180.0f64), 1..40),
    )| {
        let inner = MemoryStorage::new();
        inner.create_driver(&stored_driver("D1")).expect("seed driver");
        let storage = ChaoticStorage::with_seed(inner, failure_rate, seed);

        let mut acknowledged = None;
        let mut acked_count = 0u64;

        for (lat, lon) in updates {
            match storage.upsert_position("D1", lat, lon, acked_count) {
                Ok(Some(position)) => {
                    acked_count += 1;
                    prop_assert_eq!(position.seq, acked_count, "seq counts acknowledged writes");
                    acknowledged = Some(position);
                }
                Ok(None) => prop_assert!(false, "seeded driver vanished"),
                Err(StorageError::Io(_)) => {} // injected failure, write dropped whole
                Err(e) => prop_assert!(false, "unexpected error: {e:?}"),
            }
        }

        // The inner store holds exactly the last acknowledged position
        let stored = storage.inner().query_positions("D1").expect("inner query");
        match acknowledged {
            Some(position) => {
                prop_assert_eq!(stored.len(), 1);
                prop_assert_eq!(&stored[0], &position);
            }
            None => prop_assert!(stored.is_empty()),
        }
    });
}
