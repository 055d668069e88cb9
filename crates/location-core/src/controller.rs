// ============================
// location-core/src/controller.rs
// ============================
//! Sharing Session Controller
//!
//! Starts and stops location sharing for the logged-in user. It provides:
//! - Task runtime and registration status, always re-read from the scheduler
//! - Foreground-then-background permission negotiation
//! - The location record lifecycle: created before the task is registered,
//!   deleted after it is stopped
//!
//! The record is the authoritative "sharing" signal for other clients, so it
//! must exist exactly while the background task is registered. Creating it
//! before registering means the first fix never races a missing record.
//!
//! # Failures
//! Every failed action is alerted and reported once, then returned to the
//! caller as a [`SharingError`]. Nothing is retried automatically.
use headpat_common::{CoordinatesPatch, TaskAvailability, UserId};
use metrics::counter;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{SharingError, StoreError};
use crate::telemetry::{RECORD_CLEANUP, SHARING_FAILED, SHARING_STARTED, SHARING_STOPPED};
use crate::LocationServices;

/// Client-local view of the sharing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingSession {
    /// Background task runtime availability; `None` until first queried
    pub status: Option<TaskAvailability>,
    /// Whether the location task is registered with the scheduler
    pub is_registered: bool,
}

/// Orchestrates start/stop of location sharing
pub struct SharingController {
    services: LocationServices,
    state: RwLock<SharingSession>,
}

impl SharingController {
    pub fn new(services: LocationServices) -> Self {
        Self {
            services,
            state: RwLock::new(SharingSession::default()),
        }
    }

    /// Last known state; call [`check_status`](Self::check_status) to refresh
    pub fn session(&self) -> SharingSession {
        *self.state.read()
    }

    pub fn is_registered(&self) -> bool {
        self.state.read().is_registered
    }

    /// Refresh status from the scheduler and clean up an orphaned record.
    ///
    /// When the task is not registered, the user's location record is deleted
    /// on a best-effort basis so a previous session cannot leave a stale pin
    /// behind. With no session the delete targets an empty id and is a no-op.
    /// Registration is re-read under the writer lock before deleting, so a
    /// concurrent registration keeps its record.
    pub async fn check_status(&self) -> SharingSession {
        let session = self.sync_status().await;
        if !session.is_registered {
            self.remove_orphaned_record().await;
            self.services.locks.prune();
        }
        session
    }

    /// Ask for foreground, then background location permission.
    ///
    /// Background permission is never requested once foreground is denied.
    /// Does not register the task.
    pub async fn request_permissions(&self) -> Result<(), SharingError> {
        let permissions = &self.services.permissions;

        let foreground = permissions
            .request_foreground()
            .await
            .map_err(|e| self.fail(e.into()))?;
        if !foreground.is_granted() {
            return Err(self.fail(SharingError::ForegroundPermissionDenied));
        }

        let background = permissions
            .request_background()
            .await
            .map_err(|e| self.fail(e.into()))?;
        if !background.is_granted() {
            return Err(self.fail(SharingError::BackgroundPermissionDenied));
        }

        Ok(())
    }

    /// Start sharing: permissions, record, then task registration
    pub async fn register_background_fetch(&self) -> Result<SharingSession, SharingError> {
        if self.sync_status().await.is_registered {
            return Err(self.fail(SharingError::AlreadySharing));
        }

        let Some(user_id) = self.services.current_user_id().await else {
            self.state.write().is_registered = false;
            return Err(self.fail(SharingError::NotLoggedIn));
        };

        self.request_permissions().await?;

        // The request outcome is not trusted; permissions can change out-of-band.
        let permissions = &self.services.permissions;
        let foreground = permissions
            .foreground_status()
            .await
            .map_err(|e| self.fail(e.into()))?
            .is_granted();
        let background = permissions
            .background_status()
            .await
            .map_err(|e| self.fail(e.into()))?
            .is_granted();
        if !foreground || !background {
            return Err(self.fail(SharingError::PermissionsNotGranted {
                foreground,
                background,
            }));
        }

        let settings = &self.services.settings;
        let guard = self.services.locks.acquire(&user_id).await;

        let created = self
            .ensure_record(&user_id)
            .await
            .map_err(|e| self.fail(e.into()))?;

        if let Err(e) = self
            .services
            .scheduler
            .start_location_updates(&settings.task_name, &settings.tracking)
            .await
        {
            if created {
                self.rollback_record(&user_id).await;
            }
            drop(guard);
            return Err(self.fail(e.into()));
        }
        drop(guard);

        self.state.write().is_registered = true;
        counter!(SHARING_STARTED).increment(1);
        info!(%user_id, task = %settings.task_name, "location sharing started");

        Ok(self.sync_status().await)
    }

    /// Stop sharing: stop the task, then delete the record
    pub async fn unregister_background_fetch(&self) -> Result<SharingSession, SharingError> {
        if !self.sync_status().await.is_registered {
            return Err(self.fail(SharingError::NotSharing));
        }

        let settings = &self.services.settings;
        let user_id = self.services.current_user_id().await.unwrap_or_default();
        let guard = self.services.locks.acquire(&user_id).await;

        if let Err(e) = self
            .services
            .scheduler
            .stop_location_updates(&settings.task_name)
            .await
        {
            drop(guard);
            return Err(self.fail(e.into()));
        }

        if let Err(e) = self
            .services
            .store
            .delete(&settings.locations_collection, &user_id)
            .await
        {
            warn!(%user_id, error = %e, "location record cleanup failed");
            self.services
                .reporter
                .add_breadcrumb(&format!("location record cleanup failed: {e}"));
        }
        drop(guard);
        self.services.locks.prune();

        self.state.write().is_registered = false;
        counter!(SHARING_STOPPED).increment(1);
        info!(%user_id, task = %settings.task_name, "location sharing stopped");

        Ok(self.sync_status().await)
    }

    /// Re-read availability and registration from the scheduler.
    ///
    /// A failed query keeps the previous value for that field.
    async fn sync_status(&self) -> SharingSession {
        let scheduler = &self.services.scheduler;
        let task_name = &self.services.settings.task_name;

        let status = match scheduler.availability().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(error = %e, "background task availability query failed");
                self.services.reporter.capture_exception(&e);
                None
            },
        };

        let registered = match scheduler.is_registered(task_name).await {
            Ok(registered) => Some(registered),
            Err(e) => {
                warn!(error = %e, "task registration query failed");
                self.services.reporter.capture_exception(&e);
                None
            },
        };

        let mut state = self.state.write();
        if status.is_some() {
            state.status = status;
        }
        if let Some(registered) = registered {
            state.is_registered = registered;
        }
        *state
    }

    /// Make sure the user's record exists; `Ok(true)` if this call created it
    async fn ensure_record(&self, user_id: &str) -> Result<bool, StoreError> {
        let store = &self.services.store;
        let collection = &self.services.settings.locations_collection;

        match store.get(collection, user_id).await {
            Ok(_) => Ok(false),
            Err(e) => {
                debug!(%user_id, error = %e, "no location record yet, creating one");
                let empty = serde_json::to_value(CoordinatesPatch::empty())?;
                match store.create(collection, user_id, empty).await {
                    Ok(_) => Ok(true),
                    Err(e) if e.is_conflict() => Ok(false),
                    Err(e) => Err(e),
                }
            },
        }
    }

    async fn rollback_record(&self, user_id: &str) {
        let collection = &self.services.settings.locations_collection;
        if let Err(e) = self.services.store.delete(collection, user_id).await {
            warn!(%user_id, error = %e, "could not roll back location record");
        }
    }

    async fn remove_orphaned_record(&self) {
        let user_id: UserId = self.services.current_user_id().await.unwrap_or_default();
        let collection = &self.services.settings.locations_collection;

        let _guard = self.services.locks.acquire(&user_id).await;

        // A registration may have finished while this call waited on the lock.
        let task_name = &self.services.settings.task_name;
        match self.services.scheduler.is_registered(task_name).await {
            Ok(false) => {},
            Ok(true) => {
                debug!(%user_id, "task registered meanwhile, keeping location record");
                return;
            },
            Err(e) => {
                debug!(%user_id, error = %e, "orphaned record cleanup skipped");
                return;
            },
        }

        match self.services.store.delete(collection, &user_id).await {
            Ok(()) => {
                info!(%user_id, "removed location record left by an inactive task");
                counter!(RECORD_CLEANUP).increment(1);
            },
            Err(e) if e.is_not_found() || e.is_unauthorized() => {
                debug!(%user_id, "no orphaned location record");
            },
            Err(e) => debug!(%user_id, error = %e, "orphaned record cleanup skipped"),
        }
    }

    /// Alert and report a failed action, then hand the error back
    fn fail(&self, err: SharingError) -> SharingError {
        if err.is_guard() {
            self.services.reporter.add_breadcrumb(&err.to_string());
        } else {
            self.services.reporter.capture_exception(&err);
        }
        warn!(code = err.error_code(), error = %err, "location sharing action failed");
        counter!(SHARING_FAILED, "code" => err.error_code()).increment(1);
        self.services.alerts.alert(err.severity(), &err.user_message());
        err
    }
}
