//! Driver directory payloads.
//!
//! The directory is how drivers enter the system: the location relay only
//! accepts position writes for drivers that exist here.

use serde::{Deserialize, Serialize};

/// Onboard a new driver under a logistics client.
///
/// All fields are required; any absent or empty one fails the request as a
/// whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDriver {
    /// Logistics client the driver belongs to.
    #[serde(default)]
    pub logistic_client_id: Option<String>,
    /// Driver's display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Contact email; credentials are issued against it.
    #[serde(default)]
    pub email: Option<String>,
    /// Contact phone number.
    #[serde(default)]
    pub contact_number: Option<String>,
    /// Driving license number.
    #[serde(default)]
    pub license_number: Option<String>,
    /// Vehicle registration number.
    #[serde(default)]
    pub vehicle_number: Option<String>,
    /// Vehicle chassis number.
    #[serde(default)]
    pub chassis_number: Option<String>,
}

impl NewDriver {
    /// Whether every required field is present and non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [
            &self.logistic_client_id,
            &self.name,
            &self.email,
            &self.contact_number,
            &self.license_number,
            &self.vehicle_number,
            &self.chassis_number,
        ]
        .into_iter()
        .all(|field| field.as_deref().is_some_and(|value| !value.is_empty()))
    }
}

/// A registered driver as held by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRecord {
    /// Server-assigned driver identifier.
    pub driver_id: String,
    /// Logistics client the driver belongs to.
    pub logistic_client_id: String,
    /// Driver's display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Contact phone number.
    pub contact_number: String,
    /// Driving license number.
    pub license_number: String,
    /// Vehicle registration number.
    pub vehicle_number: String,
    /// Vehicle chassis number.
    pub chassis_number: String,
}

/// One-time credentials issued when a driver is onboarded.
///
/// The temporary password is returned exactly once; the directory stores
/// only its digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCredentials {
    /// Login email.
    pub email: String,
    /// Temporary password (hex, 12 characters).
    pub temp_password: String,
}

/// Result of a [`NewDriver`] request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverAddReply {
    /// Whether the driver was registered.
    pub success: bool,
    /// Operator-facing status message.
    pub message: String,
    /// Issued credentials on success.
    pub credentials: Option<IssuedCredentials>,
    /// The stored driver record on success.
    pub driver: Option<DriverRecord>,
}

impl DriverAddReply {
    fn failure(message: &str) -> Self {
        Self { success: false, message: message.to_string(), credentials: None, driver: None }
    }

    /// One or more required fields were absent.
    #[must_use]
    pub fn missing_fields() -> Self {
        Self::failure("All fields are required!")
    }

    /// The named logistics client is not registered.
    #[must_use]
    pub fn client_not_found() -> Self {
        Self::failure("Logistic client not found!")
    }

    /// Email, contact, license, vehicle or chassis number is already taken.
    #[must_use]
    pub fn duplicate_driver() -> Self {
        Self::failure("Driver with provided details already exists!")
    }

    /// The directory store failed.
    #[must_use]
    pub fn internal_error() -> Self {
        Self::failure("Internal Server Error!")
    }

    /// The driver was registered and credentials issued.
    #[must_use]
    pub fn added(driver: DriverRecord, credentials: IssuedCredentials) -> Self {
        Self {
            success: true,
            message: "Driver added successfully!".to_string(),
            credentials: Some(credentials),
            driver: Some(driver),
        }
    }
}

/// List drivers belonging to a logistics client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverList {
    /// Logistics client to list; an absent or unknown id yields an empty
    /// list, not an error.
    #[serde(default)]
    pub logistic_client_id: Option<String>,
}

/// Result of a [`DriverList`] request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverListReply {
    /// Whether the listing ran.
    pub success: bool,
    /// Operator-facing status message.
    pub message: String,
    /// Drivers registered under the client.
    pub drivers: Vec<DriverRecord>,
}

impl DriverListReply {
    /// The directory store failed.
    #[must_use]
    pub fn internal_error() -> Self {
        Self {
            success: false,
            message: "Internal Server Error!".to_string(),
            drivers: Vec::new(),
        }
    }

    /// The listing ran; `drivers` may be empty.
    #[must_use]
    pub fn fetched(drivers: Vec<DriverRecord>) -> Self {
        Self { success: true, message: "Drivers fetched successfully!".to_string(), drivers }
    }
}
