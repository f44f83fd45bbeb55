//! Driver directory operations.
//!
//! Onboarding and listing of drivers under logistics clients. The directory
//! is the relay's admission gate: position writes are only accepted for
//! drivers registered here.
//!
//! Onboarding issues one-time credentials: a 12-character hex temporary
//! password returned in the reply exactly once. The directory stores only
//! its SHA-256 digest.

use sha2::{Digest, Sha256};
use waypost_proto::payloads::directory::{
    DriverAddReply, DriverListReply, DriverRecord, IssuedCredentials, NewDriver,
};

use crate::{
    env::Environment,
    storage::{Storage, StorageError, StoredDriver},
};

/// Bytes of entropy in an issued temporary password (12 hex characters).
const TEMP_PASSWORD_BYTES: usize = 6;

/// Onboard a new driver.
///
/// Validation order matches the reply constructors: field presence, client
/// existence, identity uniqueness. Only then is a driver id assigned and
/// the record written.
///
/// # Errors
///
/// Propagates storage failures; the caller turns them into an
/// internal-error reply.
pub fn onboard_driver<E: Environment, S: Storage>(
    env: &E,
    storage: &S,
    request: &NewDriver,
) -> Result<DriverAddReply, StorageError> {
    if !request.is_complete() {
        return Ok(DriverAddReply::missing_fields());
    }

    // is_complete() verified every field above
    let (
        Some(logistic_client_id),
        Some(name),
        Some(email),
        Some(contact_number),
        Some(license_number),
        Some(vehicle_number),
        Some(chassis_number),
    ) = (
        request.logistic_client_id.clone(),
        request.name.clone(),
        request.email.clone(),
        request.contact_number.clone(),
        request.license_number.clone(),
        request.vehicle_number.clone(),
        request.chassis_number.clone(),
    )
    else {
        return Ok(DriverAddReply::missing_fields());
    };

    if storage.load_logistic_client(&logistic_client_id)?.is_none() {
        return Ok(DriverAddReply::client_not_found());
    }

    let record = DriverRecord {
        driver_id: format!("{:016x}", env.random_u64()),
        logistic_client_id,
        name,
        email,
        contact_number,
        license_number,
        vehicle_number,
        chassis_number,
    };

    if storage.driver_identity_taken(&record)? {
        return Ok(DriverAddReply::duplicate_driver());
    }

    let temp_password = env.random_hex(TEMP_PASSWORD_BYTES);
    let pwd_digest = Sha256::digest(temp_password.as_bytes()).to_vec();

    let stored = StoredDriver {
        record: record.clone(),
        pwd_digest,
        created_at_secs: env.wall_clock_secs(),
    };
    storage.create_driver(&stored)?;

    let credentials = IssuedCredentials { email: record.email.clone(), temp_password };
    Ok(DriverAddReply::added(record, credentials))
}

/// List drivers registered under a logistics client.
///
/// An absent client id queries nothing and yields an empty successful
/// listing, same as an unknown id.
///
/// # Errors
///
/// Propagates storage failures; the caller turns them into an
/// internal-error reply.
pub fn list_drivers<S: Storage>(
    storage: &S,
    logistic_client_id: Option<&str>,
) -> Result<DriverListReply, StorageError> {
    let drivers = match logistic_client_id {
        Some(client_id) => storage
            .list_drivers(client_id)?
            .into_iter()
            .map(|stored| stored.record)
            .collect(),
        None => Vec::new(),
    };

    Ok(DriverListReply::fetched(drivers))
}
