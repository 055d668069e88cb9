// ============================
// location-core/src/platform.rs
// ============================
//! Device, session and UI collaborators.
//!
//! The OS owns permissions and the background scheduler; the backend owns the
//! session. This crate only sees them through these traits.
use async_trait::async_trait;
use headpat_common::{
    AlertSeverity, PermissionStatus, Session, TaskAvailability, TaskInvocation, TrackingOptions,
};
use tracing::{error, info, warn};

use crate::error::{PlatformError, StoreError};

/// Foreground/background location permission API
#[async_trait]
pub trait LocationPermissions: Send + Sync {
    async fn request_foreground(&self) -> Result<PermissionStatus, PlatformError>;
    async fn request_background(&self) -> Result<PermissionStatus, PlatformError>;
    async fn foreground_status(&self) -> Result<PermissionStatus, PlatformError>;
    async fn background_status(&self) -> Result<PermissionStatus, PlatformError>;
}

/// OS background task registry for location updates.
///
/// Registration state is global and outside this app's control; callers
/// query it instead of caching it.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Whether background tasks may run on this device at all
    async fn availability(&self) -> Result<TaskAvailability, PlatformError>;

    async fn is_registered(&self, task_name: &str) -> Result<bool, PlatformError>;

    /// Start delivering location fixes to the callback defined for `task_name`
    async fn start_location_updates(
        &self,
        task_name: &str,
        options: &TrackingOptions,
    ) -> Result<(), PlatformError>;

    /// Stop delivery; an in-flight invocation is not cancelled
    async fn stop_location_updates(&self, task_name: &str) -> Result<(), PlatformError>;
}

/// Body the scheduler runs for each batch of fixes
#[async_trait]
pub trait TaskCallback: Send + Sync {
    async fn run(&self, invocation: TaskInvocation);
}

/// Current authenticated session
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// `Ok(None)` when nobody is logged in
    async fn current_session(&self) -> Result<Option<Session>, StoreError>;
}

/// User-facing modal/toast presentation
pub trait Alerter: Send + Sync {
    fn alert(&self, severity: AlertSeverity, message: &str);
}

/// Alerter that only logs; used by headless hosts
#[derive(Debug, Default, Clone)]
pub struct LogAlerter;

impl Alerter for LogAlerter {
    fn alert(&self, severity: AlertSeverity, message: &str) {
        match severity {
            AlertSeverity::Info => info!(alert = message),
            AlertSeverity::Warning => warn!(alert = message),
            AlertSeverity::Error => error!(alert = message),
        }
    }
}
