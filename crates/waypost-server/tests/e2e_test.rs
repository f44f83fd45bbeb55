//! End-to-end tests over real QUIC.
//!
//! Boots a server on a random port with a self-signed certificate, then
//! exercises the full client path: handshake, driver onboarding, position
//! publishing, queries, and cross-session update fan-out.

use std::time::Duration;

use tokio::time::timeout;
use waypost_proto::payloads::directory::NewDriver;
use waypost_server::{MemoryStorage, RelayConfig, Server, ServerRuntimeConfig};

const WAIT: Duration = Duration::from_secs(5);

/// Start a server on a random local port, returning its address.
fn start_server() -> std::net::SocketAddr {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        cert_path: None,
        key_path: None,
        relay: RelayConfig::default(),
    };

    let mut server = Server::bind(config, MemoryStorage::new()).expect("server bind");
    server.register_logistic_client("LC1", "Acme Logistics").expect("seed client");
    let addr = server.local_addr().expect("local addr");

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    addr
}

fn new_driver() -> NewDriver {
    NewDriver {
        logistic_client_id: Some("LC1".to_string()),
        name: Some("Asha".to_string()),
        email: Some("asha@example.com".to_string()),
        contact_number: Some("9800000001".to_string()),
        license_number: Some("KA-01-2024".to_string()),
        vehicle_number: Some("KA01AB1234".to_string()),
        chassis_number: Some("CH-778899".to_string()),
    }
}

#[tokio::test]
async fn handshake_assigns_a_session() {
    let addr = start_server();

    let client = timeout(WAIT, waypost_client::connect(&addr.to_string()))
        .await
        .expect("connect timed out")
        .expect("connect failed");

    let reply = timeout(WAIT, client.hello("e2e-test"))
        .await
        .expect("hello timed out")
        .expect("hello failed");
    assert_ne!(reply.session_id, 0);

    client.goodbye("done").await.expect("goodbye failed");
}

#[tokio::test]
async fn onboard_publish_query_over_the_wire() {
    let addr = start_server();
    let client = waypost_client::connect(&addr.to_string()).await.expect("connect failed");
    client.hello("admin").await.expect("hello failed");

    let added = timeout(WAIT, client.add_driver(new_driver()))
        .await
        .expect("add timed out")
        .expect("add failed");
    assert!(added.success, "onboarding failed: {}", added.message);
    let credentials = added.credentials.expect("credentials issued");
    assert_eq!(credentials.temp_password.len(), 12);
    let driver_id = added.driver.expect("record returned").driver_id;

    let ack = client.set_location(&driver_id, 12.9716, 77.5946).await.expect("set failed");
    assert!(ack.success);
    assert_eq!(ack.message, "Driver location updated successfully!");

    let fetched = client.get_locations(&driver_id).await.expect("get failed");
    assert_eq!(fetched.message, "Driver locations fetched successfully!");
    assert_eq!(fetched.positions.len(), 1);
    assert_eq!(fetched.positions[0].latitude, 12.9716);

    let listed = client.list_drivers("LC1").await.expect("list failed");
    assert_eq!(listed.drivers.len(), 1);
    assert_eq!(listed.drivers[0].driver_id, driver_id);
}

#[tokio::test]
async fn updates_fan_out_to_other_sessions_only() {
    let addr = start_server();

    let publisher = waypost_client::connect(&addr.to_string()).await.expect("connect failed");
    publisher.hello("driver-app").await.expect("hello failed");

    let mut watcher = waypost_client::connect(&addr.to_string()).await.expect("connect failed");
    watcher.hello("dashboard").await.expect("hello failed");

    let added = publisher.add_driver(new_driver()).await.expect("add failed");
    let driver_id = added.driver.expect("record returned").driver_id;

    publisher.set_location(&driver_id, 12.9, 77.6).await.expect("set failed");

    let update = timeout(WAIT, watcher.next_update())
        .await
        .expect("no update within deadline")
        .expect("update channel closed");
    assert_eq!(update.driver_id, driver_id);
    assert_eq!(update.latitude, 12.9);
    assert_eq!(update.longitude, 77.6);
    assert_eq!(update.seq, 1);
}

#[tokio::test]
async fn fire_and_forget_publish_reaches_watchers() {
    let addr = start_server();

    let publisher = waypost_client::connect(&addr.to_string()).await.expect("connect failed");
    publisher.hello("driver-app").await.expect("hello failed");

    let mut watcher = waypost_client::connect(&addr.to_string()).await.expect("connect failed");
    watcher.hello("dashboard").await.expect("hello failed");

    let added = publisher.add_driver(new_driver()).await.expect("add failed");
    let driver_id = added.driver.expect("record returned").driver_id;

    publisher.publish_location(&driver_id, 13.0, 77.7).await.expect("publish failed");

    let update = timeout(WAIT, watcher.next_update())
        .await
        .expect("no update within deadline")
        .expect("update channel closed");
    assert_eq!(update.driver_id, driver_id);
    assert_eq!(update.latitude, 13.0);
}

#[tokio::test]
async fn validation_failures_use_the_operation_reply() {
    let addr = start_server();
    let client = waypost_client::connect(&addr.to_string()).await.expect("connect failed");
    client.hello("driver-app").await.expect("hello failed");

    let ack = client.set_location("nobody", 12.9, 77.6).await.expect("set failed");
    assert!(!ack.success);
    assert_eq!(ack.message, "Driver not found!");

    let incomplete = client
        .add_driver(NewDriver { name: Some("Asha".to_string()), ..Default::default() })
        .await
        .expect("add failed");
    assert!(!incomplete.success);
    assert_eq!(incomplete.message, "All fields are required!");
}
