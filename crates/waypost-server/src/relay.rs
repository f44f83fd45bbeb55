//! Location relay driver - event-driven state machine.
//!
//! The relay is implemented sans-IO: [`RelayDriver::process_event`] consumes
//! protocol events and returns actions for the runtime to execute. No
//! sockets, no async, no side effects beyond storage and the session
//! registry. This keeps every protocol decision unit-testable without a
//! network.
//!
//! Ordering invariant: a position update is written to storage first, then
//! broadcast to subscribers, then acknowledged to the publisher. A failed
//! write produces an error reply and no broadcast.

use waypost_proto::{
    Frame, FrameHeader, Payload, ProtocolError,
    payloads::{
        ErrorPayload,
        location::{LocationGetReply, LocationSetReply, LocationUpdate},
    },
};

use crate::{
    directory,
    env::Environment,
    registry::{ConnectionRegistry, SessionInfo},
    relay_error::RelayError,
    storage::{Storage, StoredClient},
};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum concurrent sessions before new connections are refused.
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events fed into the relay by the runtime.
#[derive(Debug)]
pub enum RelayEvent {
    /// A transport connection was accepted and assigned a session ID.
    ConnectionAccepted {
        /// Runtime-assigned session ID, unique for the server's lifetime.
        session_id: u64,
    },
    /// A complete frame arrived on a session's stream.
    FrameReceived {
        /// Session the frame arrived on.
        session_id: u64,
        /// The decoded frame (header validated, payload still CBOR bytes).
        frame: Frame,
    },
    /// A connection closed (client goodbye, transport error, or timeout).
    ConnectionClosed {
        /// Session that closed.
        session_id: u64,
        /// Human-readable close reason for logging.
        reason: String,
    },
}

/// Actions the runtime must execute after processing an event.
#[derive(Debug)]
pub enum RelayAction {
    /// Send a frame to one session.
    SendToSession {
        /// Destination session.
        session_id: u64,
        /// Frame to write.
        frame: Frame,
    },
    /// Send a frame to every session except the sender.
    BroadcastExceptSender {
        /// Session excluded from the fan-out.
        sender: u64,
        /// Frame to write to everyone else.
        frame: Frame,
    },
    /// Close a session's connection.
    CloseConnection {
        /// Session to close.
        session_id: u64,
        /// Close reason, also sent to the peer.
        reason: String,
    },
    /// Emit a log line.
    Log {
        /// Severity for the runtime's logger.
        level: LogLevel,
        /// Log message.
        message: String,
    },
}

/// Log severity carried on [`RelayAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal operation.
    Info,
    /// Recoverable problem.
    Warn,
    /// Operation failure.
    Error,
}

/// The relay state machine.
///
/// Generic over [`Environment`] (clock and randomness) and [`Storage`]
/// (position and directory persistence) so tests can run it with a fixed
/// clock and in-memory storage.
pub struct RelayDriver<E: Environment, S: Storage> {
    registry: ConnectionRegistry,
    storage: S,
    env: E,
    config: RelayConfig,
}

impl<E: Environment, S: Storage> RelayDriver<E, S> {
    /// Create a relay driver with the given environment, storage, and config.
    pub fn new(env: E, storage: S, config: RelayConfig) -> Self {
        Self { registry: ConnectionRegistry::new(), storage, env, config }
    }

    /// Process one event, returning the actions the runtime must execute.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] for session bookkeeping bugs (duplicate or
    /// unknown session IDs) and reply encoding failures. Operation-level
    /// failures are not errors; they become reply frames.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, RelayError> {
        match event {
            RelayEvent::ConnectionAccepted { session_id } => self.handle_accepted(session_id),
            RelayEvent::FrameReceived { session_id, frame } => self.handle_frame(session_id, &frame),
            RelayEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_closed(session_id, &reason))
            }
        }
    }

    /// Register a logistics client so its drivers can be onboarded.
    ///
    /// Idempotent; re-registering an existing client is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Storage`] if the write fails.
    pub fn register_logistic_client(
        &mut self,
        client_id: &str,
        name: &str,
    ) -> Result<Vec<RelayAction>, RelayError> {
        self.storage.create_logistic_client(&StoredClient {
            client_id: client_id.to_string(),
            name: name.to_string(),
            created_at_secs: self.env.wall_clock_secs(),
        })?;

        Ok(vec![RelayAction::Log {
            level: LogLevel::Info,
            message: format!("registered logistic client {client_id} ({name})"),
        }])
    }

    /// Sessions a broadcast from `sender` fans out to.
    pub fn broadcast_targets(&self, sender: u64) -> Vec<u64> {
        self.registry.sessions_except(sender).collect()
    }

    /// Number of live sessions.
    pub fn connection_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Access the underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn handle_accepted(&mut self, session_id: u64) -> Result<Vec<RelayAction>, RelayError> {
        if self.registry.session_count() >= self.config.max_connections {
            return Ok(vec![
                RelayAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "refusing session {session_id}: at connection limit ({})",
                        self.config.max_connections
                    ),
                },
                RelayAction::CloseConnection {
                    session_id,
                    reason: "server at connection limit".to_string(),
                },
            ]);
        }

        if !self.registry.register_session(session_id, SessionInfo::new()) {
            return Err(RelayError::SessionAlreadyExists(session_id));
        }

        Ok(vec![RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("session {session_id} connected"),
        }])
    }

    fn handle_closed(&mut self, session_id: u64, reason: &str) -> Vec<RelayAction> {
        // Tolerate double-close: the runtime may report a close for a
        // session the limit check already refused.
        if self.registry.unregister_session(session_id).is_none() {
            return vec![RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("close for unknown session {session_id}"),
            }];
        }

        vec![RelayAction::Log {
            level: LogLevel::Info,
            message: format!("session {session_id} disconnected: {reason}"),
        }]
    }

    fn handle_frame(&mut self, session_id: u64, frame: &Frame) -> Result<Vec<RelayAction>, RelayError> {
        if !self.registry.has_session(session_id) {
            return Err(RelayError::SessionNotFound(session_id));
        }

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(ProtocolError::UnknownOpcode(op)) => {
                return self.rejection(session_id, frame, ErrorPayload::unsupported_opcode(op));
            }
            Err(err) => {
                return self.rejection(session_id, frame, ErrorPayload::invalid_payload(err.to_string()));
            }
        };

        match payload {
            Payload::Hello(hello) => {
                self.registry
                    .update_session_info(session_id, SessionInfo::greeted(hello.client_name.clone()));

                let mut actions = vec![RelayAction::Log {
                    level: LogLevel::Info,
                    message: format!("session {session_id} greeted as {:?}", hello.client_name),
                }];
                self.push_reply(
                    &mut actions,
                    session_id,
                    frame,
                    Payload::HelloReply(waypost_proto::payloads::session::HelloReply { session_id }),
                )?;
                Ok(actions)
            }

            Payload::Goodbye(goodbye) => Ok(vec![
                RelayAction::Log {
                    level: LogLevel::Info,
                    message: format!("session {session_id} said goodbye: {}", goodbye.reason),
                },
                RelayAction::CloseConnection { session_id, reason: goodbye.reason },
            ]),

            Payload::LocationSet(set) => self.handle_location_set(session_id, frame, &set),

            Payload::LocationGet(get) => {
                let reply = match get.driver_id.as_deref() {
                    // An empty id is as absent as a missing field
                    None | Some("") => LocationGetReply::missing_driver_id(),
                    Some(driver_id) => match self.storage.query_positions(driver_id) {
                        Ok(positions) => LocationGetReply::fetched(positions),
                        Err(err) => {
                            let mut actions = vec![storage_failure_log(session_id, "location get", &err)];
                            self.push_reply(
                                &mut actions,
                                session_id,
                                frame,
                                Payload::LocationGetReply(LocationGetReply::internal_error()),
                            )?;
                            return Ok(actions);
                        }
                    },
                };

                let mut actions = Vec::new();
                self.push_reply(&mut actions, session_id, frame, Payload::LocationGetReply(reply))?;
                Ok(actions)
            }

            Payload::DriverAdd(request) => {
                let reply = match directory::onboard_driver(&self.env, &self.storage, &request) {
                    Ok(reply) => reply,
                    Err(err) => {
                        let mut actions = vec![storage_failure_log(session_id, "driver add", &err)];
                        self.push_reply(
                            &mut actions,
                            session_id,
                            frame,
                            Payload::DriverAddReply(
                                waypost_proto::payloads::directory::DriverAddReply::internal_error(),
                            ),
                        )?;
                        return Ok(actions);
                    }
                };

                let mut actions = Vec::new();
                self.push_reply(&mut actions, session_id, frame, Payload::DriverAddReply(reply))?;
                Ok(actions)
            }

            Payload::DriverList(request) => {
                let reply =
                    match directory::list_drivers(&self.storage, request.logistic_client_id.as_deref()) {
                        Ok(reply) => reply,
                        Err(err) => {
                            let mut actions = vec![storage_failure_log(session_id, "driver list", &err)];
                            self.push_reply(
                                &mut actions,
                                session_id,
                                frame,
                                Payload::DriverListReply(
                                    waypost_proto::payloads::directory::DriverListReply::internal_error(),
                                ),
                            )?;
                            return Ok(actions);
                        }
                    };

                let mut actions = Vec::new();
                self.push_reply(&mut actions, session_id, frame, Payload::DriverListReply(reply))?;
                Ok(actions)
            }

            // Server-to-client payloads are not valid requests.
            Payload::HelloReply(_)
            | Payload::LocationSetReply(_)
            | Payload::LocationGetReply(_)
            | Payload::LocationUpdate(_)
            | Payload::DriverAddReply(_)
            | Payload::DriverListReply(_)
            | Payload::Error(_) => {
                let op = frame.header.opcode();
                self.rejection(session_id, frame, ErrorPayload::unsupported_opcode(op))
            }
        }
    }

    fn handle_location_set(
        &mut self,
        session_id: u64,
        frame: &Frame,
        set: &waypost_proto::payloads::location::LocationSet,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let Some((driver_id, latitude, longitude)) = set.fields() else {
            let mut actions = Vec::new();
            self.push_reply(
                &mut actions,
                session_id,
                frame,
                Payload::LocationSetReply(LocationSetReply::missing_fields()),
            )?;
            return Ok(actions);
        };

        match self.storage.upsert_position(driver_id, latitude, longitude, self.env.wall_clock_secs()) {
            Ok(Some(position)) => {
                // Durable first. Broadcast goes out before the ack so
                // subscribers never lag the publisher's view.
                let update = LocationUpdate::from(&position);
                let mut actions = vec![RelayAction::BroadcastExceptSender {
                    sender: session_id,
                    frame: broadcast_frame(session_id, update)?,
                }];
                self.push_reply(
                    &mut actions,
                    session_id,
                    frame,
                    Payload::LocationSetReply(LocationSetReply::updated(position)),
                )?;
                Ok(actions)
            }
            Ok(None) => {
                let mut actions = Vec::new();
                self.push_reply(
                    &mut actions,
                    session_id,
                    frame,
                    Payload::LocationSetReply(LocationSetReply::driver_not_found()),
                )?;
                Ok(actions)
            }
            Err(err) => {
                let mut actions = vec![storage_failure_log(session_id, "location set", &err)];
                self.push_reply(
                    &mut actions,
                    session_id,
                    frame,
                    Payload::LocationSetReply(LocationSetReply::internal_error()),
                )?;
                Ok(actions)
            }
        }
    }

    /// Reject a frame the relay cannot act on.
    fn rejection(
        &self,
        session_id: u64,
        frame: &Frame,
        error: ErrorPayload,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let mut actions = vec![RelayAction::Log {
            level: LogLevel::Warn,
            message: format!("session {session_id}: rejected frame: {}", error.message),
        }];
        self.push_reply(&mut actions, session_id, frame, Payload::Error(error))?;
        Ok(actions)
    }

    /// Queue a reply, honoring fire-and-forget requests.
    ///
    /// Requests with `request_id == 0` expect no direct reply; their
    /// failures are logged instead so they don't vanish silently.
    fn push_reply(
        &self,
        actions: &mut Vec<RelayAction>,
        session_id: u64,
        request: &Frame,
        reply: Payload,
    ) -> Result<(), RelayError> {
        if request.header.expects_reply() {
            actions.push(RelayAction::SendToSession {
                session_id,
                frame: reply_frame(request, reply)?,
            });
        } else if let Some(message) = failure_message(&reply) {
            actions.push(RelayAction::Log {
                level: LogLevel::Warn,
                message: format!("session {session_id}: fire-and-forget request failed: {message}"),
            });
        }
        Ok(())
    }
}

/// Build a reply frame correlated to `request` by request ID.
fn reply_frame(request: &Frame, reply: Payload) -> Result<Frame, RelayError> {
    let mut header = FrameHeader::new(reply.opcode());
    header.set_request_id(request.header.request_id());
    Ok(reply.into_frame(header)?)
}

/// Build a broadcast frame stamped with the publishing session.
fn broadcast_frame(sender: u64, update: LocationUpdate) -> Result<Frame, RelayError> {
    let mut header = FrameHeader::new(waypost_proto::Opcode::LocationUpdate);
    header.set_sender_id(sender);
    Ok(Payload::LocationUpdate(update).into_frame(header)?)
}

/// Failure message of a reply payload, if it represents a failure.
fn failure_message(reply: &Payload) -> Option<&str> {
    match reply {
        Payload::LocationSetReply(r) if !r.success => Some(&r.message),
        Payload::LocationGetReply(r) if !r.success => Some(&r.message),
        Payload::DriverAddReply(r) if !r.success => Some(&r.message),
        Payload::DriverListReply(r) if !r.success => Some(&r.message),
        Payload::Error(e) => Some(&e.message),
        _ => None,
    }
}

fn storage_failure_log(session_id: u64, operation: &str, err: &crate::storage::StorageError) -> RelayAction {
    RelayAction::Log {
        level: LogLevel::Error,
        message: format!("session {session_id}: {operation} storage failure: {err}"),
    }
}
