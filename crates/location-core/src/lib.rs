// ============================
// location-core/src/lib.rs
// ============================
//! Location sharing core for the Headpat client.
//!
//! Three components live here:
//! - [`controller::SharingController`] starts and stops sharing and owns the
//!   lifecycle of the user's location record.
//! - [`handler::LocationUpdateHandler`] runs in the background task and writes
//!   each fix to the record.
//! - [`reconciler::LiveLocationFeed`] merges realtime changes from other users
//!   into the collection behind the live map.
//!
//! Everything else (document store, OS permissions and scheduler, session,
//! alerts, error reporting) is reached through traits.

pub mod config;
pub mod controller;
pub mod error;
pub mod handler;
pub mod platform;
pub mod profiles;
pub mod realtime;
pub mod reconciler;
pub mod store;
pub mod telemetry;

use std::sync::Arc;

use headpat_common::UserId;
use tracing::warn;

use crate::config::Settings;
use crate::platform::{Alerter, LocationPermissions, LogAlerter, SessionProvider, TaskScheduler};
use crate::store::{DocumentStore, WriterLocks};
use crate::telemetry::{Reporter, TracingReporter};

pub use controller::{SharingController, SharingSession};
pub use error::{SharingError, StoreError};
pub use handler::{HandlerOutcome, LocationUpdateHandler, StopReason};
pub use reconciler::{FeedSnapshot, LiveLocationFeed, LocationEntry};

/// Collaborators shared by the controller and the update handler
#[derive(Clone)]
pub struct LocationServices {
    /// Document store holding location records
    pub store: Arc<dyn DocumentStore>,
    /// OS background task registry
    pub scheduler: Arc<dyn TaskScheduler>,
    /// OS location permission API
    pub permissions: Arc<dyn LocationPermissions>,
    /// Current authenticated session
    pub sessions: Arc<dyn SessionProvider>,
    /// Error reporting
    pub reporter: Arc<dyn Reporter>,
    /// User-facing alerts
    pub alerts: Arc<dyn Alerter>,
    /// Settings
    pub settings: Arc<Settings>,
    /// Per-user record write serialisation
    pub locks: WriterLocks,
}

impl LocationServices {
    /// Create services with log-only alerts and tracing-backed reporting
    pub fn new(
        settings: Settings,
        store: Arc<dyn DocumentStore>,
        scheduler: Arc<dyn TaskScheduler>,
        permissions: Arc<dyn LocationPermissions>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            store,
            scheduler,
            permissions,
            sessions,
            reporter: Arc::new(TracingReporter),
            alerts: Arc::new(LogAlerter),
            settings: Arc::new(settings),
            locks: WriterLocks::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_alerter(mut self, alerts: Arc<dyn Alerter>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Share write locks with another set of services in the same process
    pub fn with_locks(mut self, locks: WriterLocks) -> Self {
        self.locks = locks;
        self
    }

    /// User id of the current session, if one can be resolved
    pub async fn current_user_id(&self) -> Option<UserId> {
        match self.sessions.current_session().await {
            Ok(session) => session.map(|s| s.user_id).filter(|id| !id.is_empty()),
            Err(e) => {
                warn!(error = %e, "could not resolve current session");
                None
            },
        }
    }
}
