// ============================
// location-core/src/error.rs
// ============================
//! Error types for every collaborator seam plus the user-facing taxonomy.
use headpat_common::AlertSeverity;
use thiserror::Error;

/// Failure of a document store operation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Document already exists: {collection}/{id}")]
    Conflict { collection: String, id: String },

    /// Session expired or revoked, or the caller may not touch the document
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Network or server trouble; the same call may succeed later
    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, StoreError::Unauthorized(_))
    }
}

/// Failure reported by the OS location or task API
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Platform capability unavailable: {0}")]
    Unavailable(String),

    #[error("Platform request rejected: {0}")]
    Rejected(String),
}

/// Failure of the realtime transport
#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Realtime connection failed: {0}")]
    Connect(String),

    #[error("Realtime protocol error: {0}")]
    Protocol(String),

    #[error("Realtime subscription closed")]
    Closed,
}

/// A realtime event that cannot be decoded into a location change
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Realtime event carries no event names")]
    MissingEvents,

    #[error("Unrecognized realtime event type: {0}")]
    UnknownKind(String),

    #[error("Malformed realtime payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// Failure to bring the live location feed online
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    #[error("Resync failed: {0}")]
    Store(#[from] StoreError),
}

/// Configuration loading or validation failure
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Outcome of a user-initiated sharing action that did not succeed.
///
/// Every variant has already been surfaced through the alert collaborator by
/// the time a caller sees it.
#[derive(Error, Debug)]
pub enum SharingError {
    #[error("Location sharing is already active")]
    AlreadySharing,

    #[error("Location sharing is not active")]
    NotSharing,

    #[error("No authenticated user")]
    NotLoggedIn,

    #[error("Foreground location permission denied")]
    ForegroundPermissionDenied,

    #[error("Background location permission denied")]
    BackgroundPermissionDenied,

    #[error("Location permissions not granted (foreground: {foreground}, background: {background})")]
    PermissionsNotGranted { foreground: bool, background: bool },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

impl SharingError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            SharingError::AlreadySharing => "SHARE_001",
            SharingError::NotSharing => "SHARE_002",
            SharingError::NotLoggedIn => "AUTH_001",
            SharingError::ForegroundPermissionDenied => "PERM_001",
            SharingError::BackgroundPermissionDenied => "PERM_002",
            SharingError::PermissionsNotGranted { .. } => "PERM_003",
            SharingError::Store(StoreError::Unauthorized(_)) => "AUTH_002",
            SharingError::Store(_) => "STORE_001",
            SharingError::Platform(_) => "PLATFORM_001",
        }
    }

    /// Short, actionable message shown to the user
    pub fn user_message(&self) -> String {
        match self {
            SharingError::AlreadySharing => "You are already sharing your location.".to_string(),
            SharingError::NotSharing => "You are not sharing your location.".to_string(),
            SharingError::NotLoggedIn => {
                "You need to be logged in to share your location.".to_string()
            },
            SharingError::ForegroundPermissionDenied => {
                "Location permission was denied. Allow location access in your settings."
                    .to_string()
            },
            SharingError::BackgroundPermissionDenied => {
                "Background location permission was denied. Allow location access \"Always\" in your settings."
                    .to_string()
            },
            SharingError::PermissionsNotGranted { .. } => {
                "Location sharing needs both foreground and background location access."
                    .to_string()
            },
            SharingError::Store(StoreError::Unauthorized(_)) => {
                "Your session has expired. Please log in again.".to_string()
            },
            SharingError::Store(_) => {
                "Could not reach the server. Please try again later.".to_string()
            },
            SharingError::Platform(_) => {
                "Location sharing could not be started on this device.".to_string()
            },
        }
    }

    /// Redundant start/stop requests are expected user flow, not failures
    pub fn is_guard(&self) -> bool {
        matches!(self, SharingError::AlreadySharing | SharingError::NotSharing)
    }

    /// Alert severity used when surfacing this error
    pub fn severity(&self) -> AlertSeverity {
        match self {
            SharingError::AlreadySharing | SharingError::NotSharing => AlertSeverity::Info,
            SharingError::NotLoggedIn
            | SharingError::ForegroundPermissionDenied
            | SharingError::BackgroundPermissionDenied
            | SharingError::PermissionsNotGranted { .. } => AlertSeverity::Warning,
            SharingError::Store(_) | SharingError::Platform(_) => AlertSeverity::Error,
        }
    }
}
