//! Location relay payloads.
//!
//! Request fields are `Option` so an absent field reaches the relay intact
//! and is answered with the operation's validation message instead of a
//! decode error. Reply constructors own the exact message strings; callers
//! never assemble reply text by hand.

use serde::{Deserialize, Serialize};

/// A driver's last known position as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverPosition {
    /// Driver identifier the position belongs to.
    pub driver_id: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Wall-clock seconds when the store accepted this fix.
    pub updated_at_secs: u64,
    /// Per-driver write counter, incremented on every accepted fix.
    ///
    /// Lets subscribers order updates for one driver without trusting
    /// wall clocks.
    pub seq: u64,
}

/// Publish a driver's current position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSet {
    /// Driver whose position is being reported.
    #[serde(default)]
    pub driver_id: Option<String>,
    /// Latitude in decimal degrees.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl LocationSet {
    /// Extract the validated fields, if all are present.
    ///
    /// An empty driver id counts as absent.
    #[must_use]
    pub fn fields(&self) -> Option<(&str, f64, f64)> {
        match (self.driver_id.as_deref(), self.latitude, self.longitude) {
            (Some(id), Some(lat), Some(lon)) if !id.is_empty() => Some((id, lat, lon)),
            _ => None,
        }
    }
}

/// Result of a [`LocationSet`] request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSetReply {
    /// Whether the position was stored.
    pub success: bool,
    /// Operator-facing status message.
    pub message: String,
    /// The stored position on success, `None` otherwise.
    pub position: Option<DriverPosition>,
}

impl LocationSetReply {
    /// One or more required fields were absent.
    #[must_use]
    pub fn missing_fields() -> Self {
        Self {
            success: false,
            message: "Driver ID, Latitude and Longitude are required!".to_string(),
            position: None,
        }
    }

    /// The driver has not been onboarded; nothing was written.
    #[must_use]
    pub fn driver_not_found() -> Self {
        Self { success: false, message: "Driver not found!".to_string(), position: None }
    }

    /// The store failed; nothing was written.
    #[must_use]
    pub fn internal_error() -> Self {
        Self { success: false, message: "Internal Server Error!".to_string(), position: None }
    }

    /// The position was stored and broadcast.
    #[must_use]
    pub fn updated(position: DriverPosition) -> Self {
        Self {
            success: true,
            message: "Driver location updated successfully!".to_string(),
            position: Some(position),
        }
    }
}

/// Query a driver's last known position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationGet {
    /// Driver to look up.
    #[serde(default)]
    pub driver_id: Option<String>,
}

/// Result of a [`LocationGet`] request.
///
/// `positions` is empty when the driver exists but has never reported a
/// fix, or when the driver is unknown; both are successful lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationGetReply {
    /// Whether the query ran.
    pub success: bool,
    /// Operator-facing status message.
    pub message: String,
    /// Matching positions, most recent fix per driver.
    pub positions: Vec<DriverPosition>,
}

impl LocationGetReply {
    /// The driver id field was absent or empty.
    #[must_use]
    pub fn missing_driver_id() -> Self {
        Self {
            success: false,
            message: "Driver ID is required!".to_string(),
            positions: Vec::new(),
        }
    }

    /// The store failed.
    #[must_use]
    pub fn internal_error() -> Self {
        Self {
            success: false,
            message: "Internal Server Error!".to_string(),
            positions: Vec::new(),
        }
    }

    /// The query ran; `positions` may be empty.
    #[must_use]
    pub fn fetched(positions: Vec<DriverPosition>) -> Self {
        Self {
            success: true,
            message: "Driver locations fetched successfully!".to_string(),
            positions,
        }
    }
}

/// Position pushed to every session except the publisher.
///
/// Only emitted after the store accepted the write, so a subscriber never
/// sees a position that a follow-up query would not return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    /// Driver whose position changed.
    pub driver_id: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Per-driver write counter for this fix.
    pub seq: u64,
}

impl From<&DriverPosition> for LocationUpdate {
    fn from(position: &DriverPosition) -> Self {
        Self {
            driver_id: position.driver_id.clone(),
            latitude: position.latitude,
            longitude: position.longitude,
            seq: position.seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_require_full_triple() {
        let complete = LocationSet {
            driver_id: Some("D1".to_string()),
            latitude: Some(12.9),
            longitude: Some(77.6),
        };
        assert_eq!(complete.fields(), Some(("D1", 12.9, 77.6)));

        let missing_longitude = LocationSet {
            driver_id: Some("D1".to_string()),
            latitude: Some(12.9),
            longitude: None,
        };
        assert_eq!(missing_longitude.fields(), None);

        let blank_id = LocationSet {
            driver_id: Some(String::new()),
            latitude: Some(12.9),
            longitude: Some(77.6),
        };
        assert_eq!(blank_id.fields(), None);
    }

    #[test]
    fn reply_messages_are_exact() {
        assert_eq!(
            LocationSetReply::missing_fields().message,
            "Driver ID, Latitude and Longitude are required!"
        );
        assert_eq!(LocationSetReply::driver_not_found().message, "Driver not found!");
        assert_eq!(LocationGetReply::missing_driver_id().message, "Driver ID is required!");
        assert_eq!(LocationGetReply::internal_error().message, "Internal Server Error!");
    }
}
