//! Storage abstraction for the location relay and driver directory.
//!
//! Trait-based abstraction over the position store and directory records.
//! The trait is synchronous (no async): the relay must observe its own write
//! before emitting the corresponding broadcast, and a synchronous store makes
//! that ordering trivial to reason about.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};
use waypost_proto::payloads::{directory::DriverRecord, location::DriverPosition};

pub use self::redb::RedbStorage;

/// A logistics client as held by the directory.
///
/// Drivers can only be onboarded under a registered client. Clients are
/// provisioned out of band (see the `--seed-client` server flag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredClient {
    /// Client identifier.
    pub client_id: String,
    /// Display name.
    pub name: String,
    /// Unix timestamp (seconds) when the client was registered.
    pub created_at_secs: u64,
}

/// A driver as held by the directory.
///
/// Carries the wire-visible record plus server-only fields. The temporary
/// password itself is never stored, only its SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDriver {
    /// Wire-visible driver record.
    pub record: DriverRecord,
    /// SHA-256 digest of the issued temporary password.
    pub pwd_digest: Vec<u8>,
    /// Unix timestamp (seconds) when the driver was onboarded.
    pub created_at_secs: u64,
}

/// Storage abstraction for positions and directory records.
///
/// Must be Clone (shared between the relay and tests), Send + Sync
/// (thread-safe), and synchronous. Implementations typically share internal
/// state via Arc, so clones access the same underlying storage.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned (a thread panicked while holding a lock). Acceptable for test
/// code; the durable implementation has no such locks.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Register a logistics client. Idempotent: an existing client with the
    /// same id is left untouched.
    fn create_logistic_client(&self, client: &StoredClient) -> Result<(), StorageError>;

    /// Load a logistics client. `None` if unknown.
    fn load_logistic_client(&self, client_id: &str) -> Result<Option<StoredClient>, StorageError>;

    /// Insert a new driver.
    ///
    /// # Invariants
    ///
    /// - Pre: no driver with this `driver_id` exists (else
    ///   [`StorageError::DuplicateDriver`])
    fn create_driver(&self, driver: &StoredDriver) -> Result<(), StorageError>;

    /// Load a driver by id. `None` if unknown.
    fn load_driver(&self, driver_id: &str) -> Result<Option<StoredDriver>, StorageError>;

    /// Whether any existing driver shares an identity field with `record`.
    ///
    /// Identity fields are email, contact number, license number, vehicle
    /// number and chassis number. Scans the directory; acceptable at fleet
    /// scale.
    fn driver_identity_taken(&self, record: &DriverRecord) -> Result<bool, StorageError>;

    /// All drivers registered under a logistics client.
    ///
    /// An unknown client id yields an empty list. Order is not guaranteed.
    fn list_drivers(&self, logistic_client_id: &str) -> Result<Vec<StoredDriver>, StorageError>;

    /// Store a driver's position, replacing any previous fix.
    ///
    /// Returns the stored position with its assigned `seq`, or `None` if the
    /// driver is not in the directory.
    ///
    /// # Invariants
    ///
    /// - Update-only: an unknown driver id writes nothing
    /// - `seq` strictly increases per driver across accepted fixes
    /// - Post: a subsequent [`Self::query_positions`] returns this fix
    fn upsert_position(
        &self,
        driver_id: &str,
        latitude: f64,
        longitude: f64,
        updated_at_secs: u64,
    ) -> Result<Option<DriverPosition>, StorageError>;

    /// Last known position for a driver.
    ///
    /// Empty when the driver is unknown or has never reported a fix; both
    /// are successful lookups.
    fn query_positions(&self, driver_id: &str) -> Result<Vec<DriverPosition>, StorageError>;
}
