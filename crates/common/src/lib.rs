// ============================
// common/src/lib.rs
// ============================
//! Common types and structures
//! shared by the Headpat location-sharing components.
//! Field names follow the JSON shapes of the document store and the device
//! location API, so every type here round-trips through `serde_json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an authenticated user; also the id of their location record
pub type UserId = String;

/// The single live-location document owned by a sharing user.
///
/// A record exists exactly while its owner is sharing. `lat`/`long` are
/// `None` between registration and the first fix.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    /// Owner user id, also the document id
    #[serde(rename = "$id")]
    pub id: UserId,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub long: Option<f64>,
    /// User-supplied status line, never written by the background task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_color: Option<String>,
    #[serde(rename = "$updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LocationRecord {
    /// A freshly registered record with no fix yet
    pub fn unplaced(user_id: impl Into<UserId>) -> Self {
        Self {
            id: user_id.into(),
            lat: None,
            long: None,
            status: None,
            status_color: None,
            updated_at: None,
        }
    }

    /// Both coordinates, if a fix has been written
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.long) {
            (Some(lat), Some(long)) => Some((lat, long)),
            _ => None,
        }
    }
}

/// Coordinate fields of a [`LocationRecord`], as written on create and update.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CoordinatesPatch {
    pub lat: Option<f64>,
    pub long: Option<f64>,
}

impl CoordinatesPatch {
    pub fn empty() -> Self {
        Self { lat: None, long: None }
    }

    pub fn at(lat: f64, long: f64) -> Self {
        Self {
            lat: Some(lat),
            long: Some(long),
        }
    }
}

/// Display data for the owner of a location record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "$id")]
    pub user_id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_id: Option<String>,
}

/// The authenticated identity behind the current client session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: UserId,
    #[serde(rename = "$id", default)]
    pub session_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────
// Device location API
// ─────────────────────────────────────────────────────────────────────

/// OS permission state for one location permission scope
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

/// Whether the OS lets this app run background tasks at all.
///
/// This is a device capability, not a permission grant.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskAvailability {
    Available,
    Restricted,
    Unavailable,
}

/// Requested positioning accuracy
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Accuracy {
    Lowest,
    Low,
    #[default]
    Balanced,
    High,
    Highest,
    BestForNavigation,
}

/// Options handed to the scheduler when the location task is registered
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingOptions {
    pub accuracy: Accuracy,
    /// Minimum movement in meters between fixes
    pub distance_interval: f64,
    /// Minimum time in milliseconds between fixes
    pub time_interval: u64,
    #[serde(rename = "showsBackgroundLocationIndicator")]
    pub shows_indicator: bool,
    #[serde(rename = "pausesUpdatesAutomatically")]
    pub pauses_automatically: bool,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::Balanced,
            distance_interval: 10.0,
            time_interval: 10_000,
            shows_indicator: false,
            pauses_automatically: true,
        }
    }
}

/// Coordinates of a single position fix
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Coords {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
}

/// One position fix delivered by the OS
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub coords: Coords,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            coords: Coords {
                latitude,
                longitude,
                accuracy: None,
                altitude: None,
                heading: None,
                speed: None,
            },
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Error reported by the OS to a background task callback
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TaskError {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TaskData {
    #[serde(default)]
    pub locations: Vec<LocationFix>,
}

/// Payload of one background task invocation: `{ data: { locations }, error }`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TaskInvocation {
    #[serde(default)]
    pub data: Option<TaskData>,
    #[serde(default)]
    pub error: Option<TaskError>,
}

impl TaskInvocation {
    pub fn with_fixes(locations: Vec<LocationFix>) -> Self {
        Self {
            data: Some(TaskData { locations }),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(TaskError {
                code: None,
                message: message.into(),
            }),
        }
    }

    /// The fix the handler acts on; later fixes in a batch are ignored
    pub fn first_fix(&self) -> Option<&LocationFix> {
        self.data.as_ref().and_then(|data| data.locations.first())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Realtime feed
// ─────────────────────────────────────────────────────────────────────

/// A change notification as delivered by the realtime feed, before decoding.
///
/// `events` holds dotted event names such as
/// `databases.hp_db.collections.locations.documents.abc.update`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawRealtimeEvent {
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Severity of a user-facing alert
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
}
