//! Client library for the Waypost location relay.
//!
//! Connects to a relay server over QUIC and exposes typed operations:
//! publishing driver positions (acknowledged or fire-and-forget), querying
//! last known positions, onboarding drivers, and listing a logistics
//! client's fleet. Positions published by other sessions arrive as pushed
//! [`LocationUpdate`]s via [`RelayClient::next_update`].
//!
//! ```no_run
//! use waypost_client::connect;
//!
//! # async fn demo() -> Result<(), waypost_client::ClientError> {
//! let mut client = connect("127.0.0.1:4433").await?;
//! let session = client.hello("dispatch-board").await?;
//! println!("connected as session {}", session.session_id);
//!
//! while let Some(update) = client.next_update().await {
//!     println!("driver {} is at {}, {}", update.driver_id, update.latitude, update.longitude);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod transport;

pub use error::ClientError;
pub use transport::{RelayClient, connect};
pub use waypost_proto::payloads::location::LocationUpdate;
