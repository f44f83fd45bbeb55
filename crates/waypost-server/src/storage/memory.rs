#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use waypost_proto::payloads::{directory::DriverRecord, location::DriverPosition};

use super::{Storage, StorageError, StoredClient, StoredDriver};

/// In-memory storage implementation for testing and single-node deployments.
///
/// Uses `HashMap` keyed by driver and client ids. All state is wrapped in
/// Arc<Mutex<>> to allow Clone and concurrent access. Thread-safe through
/// Mutex, but uses `lock().expect()` which will panic if the mutex is
/// poisoned - acceptable for an in-memory store.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

struct MemoryStorageInner {
    /// Logistics clients by client id
    clients: HashMap<String, StoredClient>,

    /// Drivers by driver id
    drivers: HashMap<String, StoredDriver>,

    /// Last known position per driver id
    positions: HashMap<String, DriverPosition>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStorageInner {
                clients: HashMap::new(),
                drivers: HashMap::new(),
                positions: HashMap::new(),
            })),
        }
    }

    /// Number of registered drivers.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn driver_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").drivers.len()
    }

    /// Number of drivers with a stored position.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn position_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").positions.len()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn identity_overlaps(a: &DriverRecord, b: &DriverRecord) -> bool {
    a.email == b.email
        || a.contact_number == b.contact_number
        || a.license_number == b.license_number
        || a.vehicle_number == b.vehicle_number
        || a.chassis_number == b.chassis_number
}

impl Storage for MemoryStorage {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn create_logistic_client(&self, client: &StoredClient) -> Result<(), StorageError> {
        self.inner
            .lock()
            .expect("Mutex poisoned")
            .clients
            .entry(client.client_id.clone())
            .or_insert_with(|| client.clone());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn load_logistic_client(&self, client_id: &str) -> Result<Option<StoredClient>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").clients.get(client_id).cloned())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn create_driver(&self, driver: &StoredDriver) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if inner.drivers.contains_key(&driver.record.driver_id) {
            return Err(StorageError::DuplicateDriver(driver.record.driver_id.clone()));
        }

        inner.drivers.insert(driver.record.driver_id.clone(), driver.clone());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn load_driver(&self, driver_id: &str) -> Result<Option<StoredDriver>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").drivers.get(driver_id).cloned())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn driver_identity_taken(&self, record: &DriverRecord) -> Result<bool, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.drivers.values().any(|d| identity_overlaps(&d.record, record)))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn list_drivers(&self, logistic_client_id: &str) -> Result<Vec<StoredDriver>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner
            .drivers
            .values()
            .filter(|d| d.record.logistic_client_id == logistic_client_id)
            .cloned()
            .collect())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn upsert_position(
        &self,
        driver_id: &str,
        latitude: f64,
        longitude: f64,
        updated_at_secs: u64,
    ) -> Result<Option<DriverPosition>, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if !inner.drivers.contains_key(driver_id) {
            return Ok(None);
        }

        let seq = inner.positions.get(driver_id).map_or(1, |p| p.seq + 1);
        let position = DriverPosition {
            driver_id: driver_id.to_string(),
            latitude,
            longitude,
            updated_at_secs,
            seq,
        };

        inner.positions.insert(driver_id.to_string(), position.clone());
        Ok(Some(position))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn query_positions(&self, driver_id: &str) -> Result<Vec<DriverPosition>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.positions.get(driver_id).cloned().into_iter().collect())
    }
}
