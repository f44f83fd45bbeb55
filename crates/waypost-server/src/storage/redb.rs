//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Directory records and positions survive server restarts.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use waypost_proto::payloads::{directory::DriverRecord, location::DriverPosition};

use super::{Storage, StorageError, StoredClient, StoredDriver};

/// Table: drivers
/// Key: driver id (UTF-8)
/// Value: CBOR-encoded StoredDriver
const DRIVERS: TableDefinition<&str, &[u8]> = TableDefinition::new("drivers");

/// Table: positions
/// Key: driver id (UTF-8)
/// Value: CBOR-encoded DriverPosition
const POSITIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("positions");

/// Table: clients
/// Key: logistics client id (UTF-8)
/// Value: CBOR-encoded StoredClient
const CLIENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("clients");

fn encode_cbor<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (DRIVERS, POSITIONS, CLIENTS).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(DRIVERS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(POSITIONS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(CLIENTS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn create_logistic_client(&self, client: &StoredClient) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(CLIENTS).map_err(|e| StorageError::Io(e.to_string()))?;

            if table
                .get(client.client_id.as_str())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .is_some()
            {
                return Ok(()); // Already exists, don't overwrite
            }

            let bytes = encode_cbor(client)?;
            table
                .insert(client.client_id.as_str(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn load_logistic_client(&self, client_id: &str) -> Result<Option<StoredClient>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(CLIENTS).map_err(|e| StorageError::Io(e.to_string()))?;

        match table.get(client_id).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => Ok(Some(decode_cbor(value.value())?)),
            None => Ok(None),
        }
    }

    fn create_driver(&self, driver: &StoredDriver) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(DRIVERS).map_err(|e| StorageError::Io(e.to_string()))?;

            let driver_id = driver.record.driver_id.as_str();
            if table.get(driver_id).map_err(|e| StorageError::Io(e.to_string()))?.is_some() {
                return Err(StorageError::DuplicateDriver(driver_id.to_string()));
            }

            let bytes = encode_cbor(driver)?;
            table
                .insert(driver_id, bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn load_driver(&self, driver_id: &str) -> Result<Option<StoredDriver>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(DRIVERS).map_err(|e| StorageError::Io(e.to_string()))?;

        match table.get(driver_id).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => Ok(Some(decode_cbor(value.value())?)),
            None => Ok(None),
        }
    }

    fn driver_identity_taken(&self, record: &DriverRecord) -> Result<bool, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(DRIVERS).map_err(|e| StorageError::Io(e.to_string()))?;

        // Full scan; the directory is fleet-sized, not internet-sized.
        for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (_, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            let stored: StoredDriver = decode_cbor(value.value())?;

            let existing = &stored.record;
            if existing.email == record.email
                || existing.contact_number == record.contact_number
                || existing.license_number == record.license_number
                || existing.vehicle_number == record.vehicle_number
                || existing.chassis_number == record.chassis_number
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn list_drivers(&self, logistic_client_id: &str) -> Result<Vec<StoredDriver>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(DRIVERS).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut drivers = Vec::new();
        for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (_, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            let stored: StoredDriver = decode_cbor(value.value())?;

            if stored.record.logistic_client_id == logistic_client_id {
                drivers.push(stored);
            }
        }

        Ok(drivers)
    }

    fn upsert_position(
        &self,
        driver_id: &str,
        latitude: f64,
        longitude: f64,
        updated_at_secs: u64,
    ) -> Result<Option<DriverPosition>, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        // Existence check and position write share one transaction so a
        // concurrent directory change cannot slip between them.
        let position = {
            let drivers = txn.open_table(DRIVERS).map_err(|e| StorageError::Io(e.to_string()))?;
            if drivers.get(driver_id).map_err(|e| StorageError::Io(e.to_string()))?.is_none() {
                return Ok(None);
            }

            let mut positions =
                txn.open_table(POSITIONS).map_err(|e| StorageError::Io(e.to_string()))?;

            let seq = match positions
                .get(driver_id)
                .map_err(|e| StorageError::Io(e.to_string()))?
            {
                Some(value) => {
                    let previous: DriverPosition = decode_cbor(value.value())?;
                    previous.seq + 1
                },
                None => 1,
            };

            let position = DriverPosition {
                driver_id: driver_id.to_string(),
                latitude,
                longitude,
                updated_at_secs,
                seq,
            };

            let bytes = encode_cbor(&position)?;
            positions
                .insert(driver_id, bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;

            position
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Some(position))
    }

    fn query_positions(&self, driver_id: &str) -> Result<Vec<DriverPosition>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(POSITIONS).map_err(|e| StorageError::Io(e.to_string()))?;

        match table.get(driver_id).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => Ok(vec![decode_cbor(value.value())?]),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn stored_driver(driver_id: &str, client_id: &str, suffix: &str) -> StoredDriver {
        StoredDriver {
            record: DriverRecord {
                driver_id: driver_id.to_string(),
                logistic_client_id: client_id.to_string(),
                name: format!("Driver {suffix}"),
                email: format!("{suffix}@example.com"),
                contact_number: format!("98000{suffix}"),
                license_number: format!("KA-{suffix}"),
                vehicle_number: format!("KA01-{suffix}"),
                chassis_number: format!("CH-{suffix}"),
            },
            pwd_digest: vec![0x42; 32],
            created_at_secs: 1_700_000_000,
        }
    }

    #[test]
    fn driver_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        let driver = stored_driver("D1", "LC1", "001");
        storage.create_driver(&driver).unwrap();

        let loaded = storage.load_driver("D1").unwrap().unwrap();
        assert_eq!(loaded, driver);

        assert!(storage.load_driver("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_driver_id_rejected() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        storage.create_driver(&stored_driver("D1", "LC1", "001")).unwrap();

        let result = storage.create_driver(&stored_driver("D1", "LC2", "002"));
        assert_eq!(result, Err(StorageError::DuplicateDriver("D1".to_string())));
    }

    #[test]
    fn identity_scan_finds_shared_field() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        storage.create_driver(&stored_driver("D1", "LC1", "001")).unwrap();

        let mut candidate = stored_driver("D2", "LC1", "002").record;
        candidate.email = "001@example.com".to_string();
        assert!(storage.driver_identity_taken(&candidate).unwrap());

        let fresh = stored_driver("D3", "LC1", "003").record;
        assert!(!storage.driver_identity_taken(&fresh).unwrap());
    }

    #[test]
    fn upsert_rejects_unknown_driver() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        assert_eq!(storage.upsert_position("ghost", 12.9, 77.6, 1000).unwrap(), None);
        assert!(storage.query_positions("ghost").unwrap().is_empty());
    }

    #[test]
    fn position_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");

        {
            let storage = RedbStorage::open(&path).unwrap();
            storage.create_driver(&stored_driver("D1", "LC1", "001")).unwrap();
            let stored = storage.upsert_position("D1", 12.9, 77.6, 1000).unwrap().unwrap();
            assert_eq!(stored.seq, 1);
        }

        // Reopen and verify the fix and its seq counter survived
        let storage = RedbStorage::open(&path).unwrap();
        let positions = storage.query_positions("D1").unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].latitude, 12.9);
        assert_eq!(positions[0].seq, 1);

        let next = storage.upsert_position("D1", 13.0, 77.7, 1001).unwrap().unwrap();
        assert_eq!(next.seq, 2);
    }

    #[test]
    fn list_drivers_filters_by_client() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        storage.create_driver(&stored_driver("D1", "LC1", "001")).unwrap();
        storage.create_driver(&stored_driver("D2", "LC2", "002")).unwrap();

        let drivers = storage.list_drivers("LC1").unwrap();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].record.driver_id, "D1");

        assert!(storage.list_drivers("LC9").unwrap().is_empty());
    }

    #[test]
    fn client_registration_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        let client =
            StoredClient { client_id: "LC1".to_string(), name: "Acme".to_string(), created_at_secs: 100 };
        let other =
            StoredClient { client_id: "LC1".to_string(), name: "Evil".to_string(), created_at_secs: 200 };

        storage.create_logistic_client(&client).unwrap();
        storage.create_logistic_client(&other).unwrap();

        let loaded = storage.load_logistic_client("LC1").unwrap().unwrap();
        assert_eq!(loaded.name, "Acme");
    }
}
