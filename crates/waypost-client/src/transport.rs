//! QUIC transport and request plumbing.
//!
//! One QUIC connection per client. Each request goes out on its own
//! bidirectional stream; every server frame (replies and pushed location
//! updates alike) arrives on the single unidirectional stream the server
//! opens after the handshake. Replies carry the request ID they answer, so
//! a background reader task routes them to the waiting caller; frames with
//! request ID zero are pushes and land on the update channel.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
};

use bytes::BytesMut;
use quinn::{ClientConfig, Endpoint, RecvStream};
use tokio::sync::{mpsc, oneshot};
use waypost_proto::{ALPN_PROTOCOL, Frame, FrameHeader, Payload, payloads::location::LocationUpdate};

use crate::error::ClientError;

/// Pending replies, keyed by request ID.
type PendingMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Frame>>>>;

/// A connected relay client.
///
/// Request methods take `&self` and may run concurrently; each opens its
/// own stream. [`RelayClient::next_update`] needs `&mut self` since pushed
/// updates form a single ordered queue.
pub struct RelayClient {
    connection: quinn::Connection,
    pending: PendingMap,
    next_request_id: AtomicU32,
    updates: mpsc::Receiver<LocationUpdate>,
    reader: tokio::task::AbortHandle,
}

/// Connect to a relay server.
///
/// Uses a certificate verifier that accepts anything, matching the
/// server's self-signed development certificates. Not for production.
///
/// # Errors
///
/// [`ClientError::Connection`] if the address is invalid or the QUIC
/// handshake fails, [`ClientError::Stream`] if the server never opens its
/// push stream.
pub async fn connect(server_addr: &str) -> Result<RelayClient, ClientError> {
    let addr: SocketAddr = server_addr
        .parse()
        .map_err(|e| ClientError::Connection(format!("invalid address: {e}")))?;

    let bind_addr: SocketAddr = "0.0.0.0:0"
        .parse()
        .map_err(|e| ClientError::Connection(format!("invalid bind address: {e}")))?;
    let mut endpoint = Endpoint::client(bind_addr)
        .map_err(|e| ClientError::Connection(format!("endpoint creation failed: {e}")))?;
    endpoint.set_default_client_config(insecure_client_config()?);

    let connection = endpoint
        .connect(addr, "localhost")
        .map_err(|e| ClientError::Connection(format!("connect failed: {e}")))?
        .await
        .map_err(|e| ClientError::Connection(format!("handshake failed: {e}")))?;

    // The server opens its push stream right after accepting us.
    let push_stream = connection
        .accept_uni()
        .await
        .map_err(|e| ClientError::Stream(format!("no push stream from server: {e}")))?;

    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (update_tx, update_rx) = mpsc::channel(64);

    let reader =
        tokio::spawn(read_server_frames(push_stream, Arc::clone(&pending), update_tx));

    Ok(RelayClient {
        connection,
        pending,
        next_request_id: AtomicU32::new(1),
        updates: update_rx,
        reader: reader.abort_handle(),
    })
}

impl RelayClient {
    /// Greet the server, returning the assigned session ID.
    ///
    /// # Errors
    ///
    /// Transport or protocol failures, or an unexpected reply type.
    pub async fn hello(
        &self,
        client_name: &str,
    ) -> Result<waypost_proto::payloads::session::HelloReply, ClientError> {
        let reply = self
            .request(Payload::Hello(waypost_proto::payloads::session::Hello {
                client_name: client_name.to_string(),
            }))
            .await?;
        match reply {
            Payload::HelloReply(r) => Ok(r),
            other => Err(unexpected(&other)),
        }
    }

    /// Publish a driver position and wait for the acknowledgement.
    ///
    /// # Errors
    ///
    /// Transport or protocol failures, or an unexpected reply type.
    pub async fn set_location(
        &self,
        driver_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<waypost_proto::payloads::location::LocationSetReply, ClientError> {
        let reply = self.request(location_set(driver_id, latitude, longitude)).await?;
        match reply {
            Payload::LocationSetReply(r) => Ok(r),
            other => Err(unexpected(&other)),
        }
    }

    /// Publish a driver position without waiting for an acknowledgement.
    ///
    /// The update is still written and broadcast server-side; only the
    /// direct reply is skipped.
    ///
    /// # Errors
    ///
    /// Transport or encoding failures while sending.
    pub async fn publish_location(
        &self,
        driver_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), ClientError> {
        self.send_only(location_set(driver_id, latitude, longitude)).await
    }

    /// Fetch a driver's last known position.
    ///
    /// # Errors
    ///
    /// Transport or protocol failures, or an unexpected reply type.
    pub async fn get_locations(
        &self,
        driver_id: &str,
    ) -> Result<waypost_proto::payloads::location::LocationGetReply, ClientError> {
        let reply = self
            .request(Payload::LocationGet(waypost_proto::payloads::location::LocationGet {
                driver_id: Some(driver_id.to_string()),
            }))
            .await?;
        match reply {
            Payload::LocationGetReply(r) => Ok(r),
            other => Err(unexpected(&other)),
        }
    }

    /// Onboard a driver.
    ///
    /// # Errors
    ///
    /// Transport or protocol failures, or an unexpected reply type.
    pub async fn add_driver(
        &self,
        driver: waypost_proto::payloads::directory::NewDriver,
    ) -> Result<waypost_proto::payloads::directory::DriverAddReply, ClientError> {
        let reply = self.request(Payload::DriverAdd(driver)).await?;
        match reply {
            Payload::DriverAddReply(r) => Ok(r),
            other => Err(unexpected(&other)),
        }
    }

    /// List a logistics client's drivers.
    ///
    /// # Errors
    ///
    /// Transport or protocol failures, or an unexpected reply type.
    pub async fn list_drivers(
        &self,
        logistic_client_id: &str,
    ) -> Result<waypost_proto::payloads::directory::DriverListReply, ClientError> {
        let reply = self
            .request(Payload::DriverList(waypost_proto::payloads::directory::DriverList {
                logistic_client_id: Some(logistic_client_id.to_string()),
            }))
            .await?;
        match reply {
            Payload::DriverListReply(r) => Ok(r),
            other => Err(unexpected(&other)),
        }
    }

    /// Next pushed location update, or `None` once the connection closes.
    pub async fn next_update(&mut self) -> Option<LocationUpdate> {
        self.updates.recv().await
    }

    /// Say goodbye and close the connection.
    ///
    /// # Errors
    ///
    /// Transport or encoding failures while sending the goodbye.
    pub async fn goodbye(self, reason: &str) -> Result<(), ClientError> {
        self.send_only(Payload::Goodbye(waypost_proto::payloads::session::Goodbye {
            reason: reason.to_string(),
        }))
        .await?;
        self.close();
        Ok(())
    }

    /// Close the connection without a goodbye.
    pub fn close(&self) {
        self.reader.abort();
        self.connection.close(0u32.into(), b"client closed");
    }

    /// Send a request and wait for its correlated reply.
    async fn request(&self, payload: Payload) -> Result<Payload, ClientError> {
        let request_id = self.allocate_request_id();

        let (tx, rx) = oneshot::channel();
        self.lock_pending()?.insert(request_id, tx);

        if let Err(e) = self.send_frame(payload, request_id).await {
            self.lock_pending()?.remove(&request_id);
            return Err(e);
        }

        let frame = rx.await.map_err(|_| ClientError::Closed)?;
        let reply = Payload::from_frame(&frame)
            .map_err(|e| ClientError::Protocol(format!("reply decode failed: {e}")))?;

        if let Payload::Error(error) = reply {
            return Err(ClientError::Rejected { code: error.code, message: error.message });
        }
        Ok(reply)
    }

    /// Send a fire-and-forget request (request ID zero, no reply expected).
    async fn send_only(&self, payload: Payload) -> Result<(), ClientError> {
        self.send_frame(payload, 0).await
    }

    async fn send_frame(&self, payload: Payload, request_id: u32) -> Result<(), ClientError> {
        let mut header = FrameHeader::new(payload.opcode());
        header.set_request_id(request_id);
        let frame = payload
            .into_frame(header)
            .map_err(|e| ClientError::Protocol(format!("encode failed: {e}")))?;

        let (mut send, _recv) = self
            .connection
            .open_bi()
            .await
            .map_err(|e| ClientError::Stream(format!("open_bi failed: {e}")))?;

        send.write_all(&frame.encode())
            .await
            .map_err(|e| ClientError::Stream(format!("write failed: {e}")))?;
        send.finish().map_err(|e| ClientError::Stream(format!("finish failed: {e}")))?;

        Ok(())
    }

    /// Allocate a nonzero request ID; zero means fire-and-forget.
    fn allocate_request_id(&self) -> u32 {
        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    fn lock_pending(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<u32, oneshot::Sender<Frame>>>, ClientError> {
        self.pending
            .lock()
            .map_err(|_| ClientError::Protocol("pending reply map poisoned".to_string()))
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn location_set(driver_id: &str, latitude: f64, longitude: f64) -> Payload {
    Payload::LocationSet(waypost_proto::payloads::location::LocationSet {
        driver_id: Some(driver_id.to_string()),
        latitude: Some(latitude),
        longitude: Some(longitude),
    })
}

fn unexpected(payload: &Payload) -> ClientError {
    ClientError::UnexpectedReply(match payload {
        Payload::Hello(_) => "Hello",
        Payload::HelloReply(_) => "HelloReply",
        Payload::Goodbye(_) => "Goodbye",
        Payload::LocationSet(_) => "LocationSet",
        Payload::LocationSetReply(_) => "LocationSetReply",
        Payload::LocationGet(_) => "LocationGet",
        Payload::LocationGetReply(_) => "LocationGetReply",
        Payload::LocationUpdate(_) => "LocationUpdate",
        Payload::DriverAdd(_) => "DriverAdd",
        Payload::DriverAddReply(_) => "DriverAddReply",
        Payload::DriverList(_) => "DriverList",
        Payload::DriverListReply(_) => "DriverListReply",
        Payload::Error(_) => "Error",
    })
}

/// Read frames off the server's push stream and route them.
///
/// Frames answering a request go to the waiting caller; location updates
/// go to the update channel; anything else is dropped with a log line.
/// When the stream ends, pending callers are woken with [`ClientError::Closed`]
/// by dropping their senders.
async fn read_server_frames(
    mut recv: RecvStream,
    pending: PendingMap,
    updates: mpsc::Sender<LocationUpdate>,
) {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);

        if recv.read_exact(&mut buf[..FrameHeader::SIZE]).await.is_err() {
            break;
        }

        let payload_size = match FrameHeader::from_bytes(&buf[..FrameHeader::SIZE]) {
            Ok(header) => header.payload_size() as usize,
            Err(e) => {
                tracing::warn!("invalid frame header from server: {e}");
                break;
            },
        };

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if recv.read_exact(&mut buf[FrameHeader::SIZE..]).await.is_err() {
                break;
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("frame decode failed: {e}");
                break;
            },
        };

        let request_id = frame.header.request_id();
        if request_id != 0 {
            let waiter = match pending.lock() {
                Ok(mut map) => map.remove(&request_id),
                Err(_) => break,
            };
            match waiter {
                // Receiver may have been dropped by a timed-out caller.
                Some(tx) => drop(tx.send(frame)),
                None => tracing::debug!(request_id, "reply with no waiter"),
            }
            continue;
        }

        match Payload::from_frame(&frame) {
            Ok(Payload::LocationUpdate(update)) => {
                if updates.send(update).await.is_err() {
                    break;
                }
            },
            Ok(other) => {
                tracing::debug!("ignoring unrequested push: {other:?}");
            },
            Err(e) => {
                tracing::warn!("push decode failed: {e}");
            },
        }
    }

    // Wake pending callers with Closed.
    if let Ok(mut map) = pending.lock() {
        map.clear();
    }
}

/// Client config that accepts any server certificate. Development only.
fn insecure_client_config() -> Result<ClientConfig, ClientError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();

    // Must match the server's ALPN protocol
    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let mut config = ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| ClientError::Connection(format!("TLS config error: {e}")))?,
    ));

    let mut transport = quinn::TransportConfig::default();
    let idle = std::time::Duration::from_secs(30)
        .try_into()
        .map_err(|e| ClientError::Connection(format!("invalid idle timeout: {e}")))?;
    transport.max_idle_timeout(Some(idle));
    config.transport_config(Arc::new(transport));

    Ok(config)
}

/// Certificate verifier that accepts any certificate (insecure, for
/// development).
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
