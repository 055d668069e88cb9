// ============================
// location-core/src/handler.rs
// ============================
//! Location Update Handler
//!
//! Body of the background location task. Runs in the scheduler's execution
//! context, possibly while the app is suspended, and keeps no state between
//! invocations. It only ever updates the user's existing record; creating and
//! deleting it is the controller's job.
use async_trait::async_trait;
use headpat_common::{TaskInvocation, UserId};
use metrics::counter;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::platform::TaskCallback;
use crate::telemetry::{FIX_REJECTED, FIX_WRITTEN, TASK_STOPPED};
use crate::LocationServices;

/// Why the handler stopped its own task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The OS reported an error instead of fixes
    TaskError,
    /// No owner could be resolved for the running task
    NoSession,
    /// The store rejected the write as unauthorized
    Unauthorized,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::TaskError => "task_error",
            StopReason::NoSession => "no_session",
            StopReason::Unauthorized => "unauthorized",
        }
    }
}

/// Result of one invocation
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// The first fix was written to the user's record
    Written { user_id: UserId, lat: f64, long: f64 },
    /// Nothing to write
    Skipped,
    /// The write failed; the next fix retries implicitly
    Failed,
    /// The task registration was stopped
    Stopped(StopReason),
}

/// Writes incoming fixes to the owner's location record
pub struct LocationUpdateHandler {
    services: LocationServices,
}

impl LocationUpdateHandler {
    pub fn new(services: LocationServices) -> Self {
        Self { services }
    }

    /// Handle one batch of fixes, or the error delivered in its place
    pub async fn handle(&self, invocation: TaskInvocation) -> HandlerOutcome {
        if let Some(task_error) = &invocation.error {
            error!(error = %task_error, "background location task reported an error");
            self.services.reporter.capture_exception(task_error);
            return self.stop(StopReason::TaskError).await;
        }

        let Some(user_id) = self.services.current_user_id().await else {
            warn!("background location update without a session");
            return self.stop(StopReason::NoSession).await;
        };

        let Some(fix) = invocation.first_fix() else {
            debug!(%user_id, "background location task delivered no fixes");
            return HandlerOutcome::Skipped;
        };

        let lat = fix.coords.latitude;
        let long = fix.coords.longitude;
        let collection = &self.services.settings.locations_collection;

        let guard = self.services.locks.acquire(&user_id).await;
        let result = self
            .services
            .store
            .update(collection, &user_id, json!({ "lat": lat, "long": long }))
            .await;
        drop(guard);

        match result {
            Ok(_) => {
                debug!(%user_id, lat, long, "location fix written");
                counter!(FIX_WRITTEN).increment(1);
                HandlerOutcome::Written { user_id, lat, long }
            },
            Err(e) if e.is_unauthorized() => {
                warn!(%user_id, error = %e, "session rejected, stopping location task");
                self.services.reporter.capture_exception(&e);
                counter!(FIX_REJECTED).increment(1);
                self.stop(StopReason::Unauthorized).await
            },
            Err(e) if e.is_not_found() => {
                // Sharing was stopped between this fix and the write.
                debug!(%user_id, "location record gone, fix dropped");
                self.services
                    .reporter
                    .add_breadcrumb(&format!("location fix for missing record {user_id}"));
                counter!(FIX_REJECTED).increment(1);
                HandlerOutcome::Failed
            },
            Err(e) => {
                warn!(%user_id, error = %e, "location fix write failed");
                self.services.reporter.capture_exception(&e);
                counter!(FIX_REJECTED).increment(1);
                HandlerOutcome::Failed
            },
        }
    }

    async fn stop(&self, reason: StopReason) -> HandlerOutcome {
        let task_name = &self.services.settings.task_name;
        if let Err(e) = self.services.scheduler.stop_location_updates(task_name).await {
            error!(task = %task_name, error = %e, "failed to stop location task");
            self.services.reporter.capture_exception(&e);
        }
        counter!(TASK_STOPPED, "reason" => reason.as_str()).increment(1);
        HandlerOutcome::Stopped(reason)
    }
}

#[async_trait]
impl TaskCallback for LocationUpdateHandler {
    async fn run(&self, invocation: TaskInvocation) {
        let outcome = self.handle(invocation).await;
        debug!(?outcome, "background location task finished");
    }
}
