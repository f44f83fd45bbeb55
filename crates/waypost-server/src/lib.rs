//! Waypost location relay server.
//!
//! Relays live driver GPS positions between fleet clients over QUIC. The
//! protocol logic lives in [`RelayDriver`], a sans-IO state machine that
//! turns events into actions; this crate's runtime ([`Server`]) executes
//! those actions with Quinn and Tokio.
//!
//! # Components
//!
//! - [`RelayDriver`]: event-to-action relay logic, no I/O
//! - [`Server`]: Tokio runtime that drives the relay over QUIC
//! - [`QuinnTransport`]: QUIC endpoint wrapper
//! - [`SystemEnv`]: production clock and RNG
//! - [`storage`]: pluggable persistence (in-memory, redb, fault-injecting)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod env;
mod error;
mod registry;
mod relay;
mod relay_error;
pub mod storage;
mod system_env;
mod transport;

use std::{collections::HashMap, sync::Arc};

use bytes::BytesMut;
pub use env::Environment;
pub use error::ServerError;
pub use registry::{ConnectionRegistry, SessionInfo};
pub use relay::{LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};
pub use relay_error::RelayError;
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError};
pub use system_env::SystemEnv;
use tokio::sync::RwLock;
pub use transport::{QuinnConnection, QuinnTransport};
use waypost_proto::{Frame, FrameHeader};

/// Shared per-connection state for action execution.
struct SharedState {
    /// Session ID to connection, for closing.
    connections: RwLock<HashMap<u64, QuinnConnection>>,
    /// Session ID to its persistent outbound stream. Every frame to a
    /// client goes through this one stream, which keeps push ordering.
    outbound_streams: RwLock<HashMap<u64, tokio::sync::Mutex<quinn::SendStream>>>,
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g. "0.0.0.0:4433").
    pub bind_address: String,
    /// Path to TLS certificate (PEM). `None` means self-signed dev cert.
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM).
    pub key_path: Option<String>,
    /// Relay limits.
    pub relay: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            relay: RelayConfig::default(),
        }
    }
}

/// Production relay server.
///
/// Generic over [`Storage`] so the binary can pick in-memory or redb
/// persistence at startup.
pub struct Server<S: Storage> {
    driver: RelayDriver<SystemEnv, S>,
    transport: QuinnTransport,
    env: SystemEnv,
}

impl<S: Storage> Server<S> {
    /// Create and bind a new server.
    ///
    /// # Errors
    ///
    /// Configuration or bind failures from the transport.
    pub fn bind(config: ServerRuntimeConfig, storage: S) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = RelayDriver::new(env.clone(), storage, config.relay);

        let transport = QuinnTransport::bind(
            &config.bind_address,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
        )?;

        Ok(Self { driver, transport, env })
    }

    /// Register a logistics client before serving.
    ///
    /// Driver onboarding requires the owning client to exist; deployments
    /// seed theirs at startup.
    ///
    /// # Errors
    ///
    /// Storage failures while writing the client record.
    pub fn register_logistic_client(
        &mut self,
        client_id: &str,
        name: &str,
    ) -> Result<(), ServerError> {
        let actions = self.driver.register_logistic_client(client_id, name)?;
        for action in actions {
            if let RelayAction::Log { level, message } = action {
                emit_log(level, &message);
            }
        }
        Ok(())
    }

    /// Run the accept loop until the endpoint fails.
    ///
    /// # Errors
    ///
    /// Propagates action execution failures; individual connection errors
    /// are logged and do not stop the server.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("relay listening on {}", self.transport.local_addr()?);

        let env = self.env;
        let driver = Arc::new(tokio::sync::Mutex::new(self.driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound_streams: RwLock::new(HashMap::new()),
        });

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let env = env.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, driver, shared, &env).await {
                            tracing::error!("connection error: {e}");
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            }
        }
    }

    /// Local address the server is bound to.
    ///
    /// # Errors
    ///
    /// Transport failures reading the socket address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Handle one QUIC connection for its whole lifetime.
async fn handle_connection<S: Storage>(
    conn: QuinnConnection,
    driver: Arc<tokio::sync::Mutex<RelayDriver<SystemEnv, S>>>,
    shared: Arc<SharedState>,
    env: &SystemEnv,
) -> Result<(), ServerError> {
    let session_id = env.random_u64();

    tracing::debug!(session_id, remote = %conn.remote_addr(), "new connection");

    let outbound_stream = conn
        .open_uni()
        .await
        .map_err(|e| ServerError::Internal(format!("failed to open outbound stream: {e}")))?;

    shared.connections.write().await.insert(session_id, conn.clone());
    shared
        .outbound_streams
        .write()
        .await
        .insert(session_id, tokio::sync::Mutex::new(outbound_stream));

    let ops = {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(RelayEvent::ConnectionAccepted { session_id })?;
        resolve_actions(&driver, actions)
    };
    perform_io(ops, &shared).await;

    loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                let driver = Arc::clone(&driver);
                let shared = Arc::clone(&shared);

                tokio::spawn(async move {
                    if let Err(e) = handle_stream(session_id, send, recv, driver, &shared).await {
                        tracing::debug!(session_id, "stream error: {e}");
                    }
                });
            },
            Err(e) => {
                tracing::debug!(session_id, "connection closed: {e}");
                break;
            },
        }
    }

    shared.connections.write().await.remove(&session_id);
    shared.outbound_streams.write().await.remove(&session_id);

    let ops = {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(RelayEvent::ConnectionClosed {
            session_id,
            reason: "connection closed".to_string(),
        })?;
        resolve_actions(&driver, actions)
    };
    perform_io(ops, &shared).await;

    Ok(())
}

/// Handle one request stream: read frames, feed the relay, run the actions.
async fn handle_stream<S: Storage>(
    session_id: u64,
    send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    driver: Arc<tokio::sync::Mutex<RelayDriver<SystemEnv, S>>>,
    shared: &Arc<SharedState>,
) -> Result<(), ServerError> {
    // Replies go over the session's outbound stream, not this one.
    drop(send);

    let mut buf = BytesMut::with_capacity(4096);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);

        if let Err(e) = recv.read_exact(&mut buf[..FrameHeader::SIZE]).await {
            tracing::debug!(session_id, "header read ended: {e}");
            break;
        }

        let payload_size = match FrameHeader::from_bytes(&buf[..FrameHeader::SIZE]) {
            Ok(header) => header.payload_size() as usize,
            Err(e) => {
                tracing::warn!(session_id, "invalid frame header: {e}");
                break;
            },
        };

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if let Err(e) = recv.read_exact(&mut buf[FrameHeader::SIZE..]).await {
                tracing::debug!(session_id, "payload read ended: {e}");
                break;
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(session_id, "frame decode error: {e}");
                break;
            },
        };

        let ops = {
            let mut driver = driver.lock().await;
            let actions =
                match driver.process_event(RelayEvent::FrameReceived { session_id, frame }) {
                    Ok(actions) => actions,
                    Err(e) => {
                        tracing::warn!(session_id, "frame processing error: {e}");
                        continue;
                    },
                };
            resolve_actions(&driver, actions)
        };
        perform_io(ops, shared).await;
    }

    Ok(())
}

/// Network work distilled from relay actions.
///
/// Resolved while the relay lock is held, executed after it is released: a
/// flow-control-stalled client blocks only its own stream writes, never
/// another session's request processing.
#[derive(Debug)]
enum IoOp {
    /// Write an encoded frame to one session's outbound stream.
    Send {
        session_id: u64,
        buf: bytes::Bytes,
    },
    /// Write an encoded frame to a resolved set of sessions.
    Fanout {
        targets: Vec<u64>,
        buf: bytes::Bytes,
    },
    /// Close a session's connection.
    Close {
        session_id: u64,
        reason: String,
    },
}

/// Turn relay actions into transport-ready work.
///
/// Logs are emitted here; everything touching the network comes back as an
/// [`IoOp`] that no longer needs the relay.
fn resolve_actions<E: Environment, S: Storage>(
    driver: &RelayDriver<E, S>,
    actions: Vec<RelayAction>,
) -> Vec<IoOp> {
    let mut ops = Vec::with_capacity(actions.len());

    for action in actions {
        match action {
            RelayAction::SendToSession { session_id, frame } => {
                ops.push(IoOp::Send { session_id, buf: frame.encode() });
            },

            RelayAction::BroadcastExceptSender { sender, frame } => {
                ops.push(IoOp::Fanout {
                    targets: driver.broadcast_targets(sender),
                    buf: frame.encode(),
                });
            },

            RelayAction::CloseConnection { session_id, reason } => {
                ops.push(IoOp::Close { session_id, reason });
            },

            RelayAction::Log { level, message } => emit_log(level, &message),
        }
    }

    ops
}

/// Execute resolved I/O against the real transport.
///
/// Write failures are logged per session; a broken stream never aborts the
/// rest of the batch.
async fn perform_io(ops: Vec<IoOp>, shared: &SharedState) {
    for op in ops {
        match op {
            IoOp::Send { session_id, buf } => {
                let streams = shared.outbound_streams.read().await;
                if let Some(stream_mutex) = streams.get(&session_id) {
                    let mut stream = stream_mutex.lock().await;
                    if let Err(e) = stream.write_all(&buf).await {
                        tracing::warn!(session_id, "send failed: {e}");
                    }
                } else {
                    tracing::warn!(session_id, "send to unknown session");
                }
            },

            IoOp::Fanout { targets, buf } => {
                let streams = shared.outbound_streams.read().await;
                for session_id in targets {
                    if let Some(stream_mutex) = streams.get(&session_id) {
                        let mut stream = stream_mutex.lock().await;
                        if let Err(e) = stream.write_all(&buf).await {
                            tracing::warn!(session_id, "broadcast write failed: {e}");
                        }
                    }
                }
            },

            IoOp::Close { session_id, reason } => {
                tracing::info!(session_id, "closing connection: {reason}");
                let mut connections = shared.connections.write().await;
                if let Some(conn) = connections.remove(&session_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },
        }
    }
}

fn emit_log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!("{message}"),
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Warn => tracing::warn!("{message}"),
        LogLevel::Error => tracing::error!("{message}"),
    }
}
