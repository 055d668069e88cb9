// ============================
// location-core/tests/support/mod.rs
// ============================
//! Recording fakes for the location sharing collaborators.
//!
//! Each fake counts the calls it receives so tests can assert on exactly
//! which side effects an operation produced.
#![allow(dead_code)]

use async_trait::async_trait;
use headpat_common::{
    AlertSeverity, PermissionStatus, Session, TaskAvailability, TrackingOptions, UserProfile,
};
use location_core::config::Settings;
use location_core::error::{PlatformError, RealtimeError, StoreError};
use location_core::platform::{Alerter, LocationPermissions, SessionProvider, TaskScheduler};
use location_core::profiles::ProfileDirectory;
use location_core::realtime::{FeedMessage, RealtimeFeed, Subscription};
use location_core::store::{DocumentStore, MemoryDocumentStore};
use location_core::telemetry::Reporter;
use location_core::{LocationServices, LocationUpdateHandler, SharingController};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const LOCATIONS: &str = "locations";

// ─────────────────────────────────────────────────────────────────────
// Document store
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unauthorized,
    Transient,
}

impl Failure {
    fn into_error(self) -> StoreError {
        match self {
            Failure::Unauthorized => StoreError::Unauthorized("session expired".to_string()),
            Failure::Transient => StoreError::Transient("connection reset".to_string()),
        }
    }
}

/// Memory store that records every call and can be told to fail
pub struct RecordingStore {
    pub inner: MemoryDocumentStore,
    pub gets: AtomicUsize,
    pub creates: Mutex<Vec<(String, Value)>>,
    pub updates: Mutex<Vec<(String, Value)>>,
    pub deletes: Mutex<Vec<String>>,
    pub fail_updates: Mutex<Option<Failure>>,
    pub fail_deletes: Mutex<Option<Failure>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryDocumentStore::new("hp_db"),
            gets: AtomicUsize::new(0),
            creates: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            fail_updates: Mutex::new(None),
            fail_deletes: Mutex::new(None),
        }
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    pub fn fail_updates_with(&self, failure: Failure) {
        *self.fail_updates.lock().unwrap() = Some(failure);
    }

    pub fn fail_deletes_with(&self, failure: Failure) {
        *self.fail_deletes.lock().unwrap() = Some(failure);
    }

    pub fn has_record(&self, user_id: &str) -> bool {
        self.inner.contains(LOCATIONS, user_id)
    }

    pub fn record_count(&self) -> usize {
        self.inner.count(LOCATIONS)
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(collection, id).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        self.inner.list(collection).await
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<Value, StoreError> {
        self.creates.lock().unwrap().push((id.to_string(), data.clone()));
        self.inner.create(collection, id, data).await
    }

    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<Value, StoreError> {
        self.updates.lock().unwrap().push((id.to_string(), data.clone()));
        if let Some(failure) = *self.fail_updates.lock().unwrap() {
            return Err(failure.into_error());
        }
        self.inner.update(collection, id, data).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.deletes.lock().unwrap().push(id.to_string());
        if let Some(failure) = *self.fail_deletes.lock().unwrap() {
            return Err(failure.into_error());
        }
        self.inner.delete(collection, id).await
    }
}

// ─────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────

/// Permission API whose request answers are scripted
pub struct FakePermissions {
    pub foreground_answer: Mutex<PermissionStatus>,
    pub background_answer: Mutex<PermissionStatus>,
    foreground_current: Mutex<PermissionStatus>,
    background_current: Mutex<PermissionStatus>,
    /// Background status reads as denied regardless of what was granted
    pub revoke_background: AtomicBool,
    pub foreground_requests: AtomicUsize,
    pub background_requests: AtomicUsize,
}

impl FakePermissions {
    pub fn answering(foreground: PermissionStatus, background: PermissionStatus) -> Self {
        Self {
            foreground_answer: Mutex::new(foreground),
            background_answer: Mutex::new(background),
            foreground_current: Mutex::new(PermissionStatus::Undetermined),
            background_current: Mutex::new(PermissionStatus::Undetermined),
            revoke_background: AtomicBool::new(false),
            foreground_requests: AtomicUsize::new(0),
            background_requests: AtomicUsize::new(0),
        }
    }

    pub fn granting() -> Self {
        Self::answering(PermissionStatus::Granted, PermissionStatus::Granted)
    }

    pub fn foreground_requests(&self) -> usize {
        self.foreground_requests.load(Ordering::SeqCst)
    }

    pub fn background_requests(&self) -> usize {
        self.background_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationPermissions for FakePermissions {
    async fn request_foreground(&self) -> Result<PermissionStatus, PlatformError> {
        self.foreground_requests.fetch_add(1, Ordering::SeqCst);
        let answer = *self.foreground_answer.lock().unwrap();
        *self.foreground_current.lock().unwrap() = answer;
        Ok(answer)
    }

    async fn request_background(&self) -> Result<PermissionStatus, PlatformError> {
        self.background_requests.fetch_add(1, Ordering::SeqCst);
        let answer = *self.background_answer.lock().unwrap();
        *self.background_current.lock().unwrap() = answer;
        Ok(answer)
    }

    async fn foreground_status(&self) -> Result<PermissionStatus, PlatformError> {
        Ok(*self.foreground_current.lock().unwrap())
    }

    async fn background_status(&self) -> Result<PermissionStatus, PlatformError> {
        if self.revoke_background.load(Ordering::SeqCst) {
            return Ok(PermissionStatus::Denied);
        }
        Ok(*self.background_current.lock().unwrap())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────

/// Task registry holding one registration flag
pub struct FakeScheduler {
    pub registered: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    /// Milliseconds `start_location_updates` takes before registering
    pub start_delay_ms: AtomicU64,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub last_options: Mutex<Option<(String, TrackingOptions)>>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self {
            registered: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            start_delay_ms: AtomicU64::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            last_options: Mutex::new(None),
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskScheduler for FakeScheduler {
    async fn availability(&self) -> Result<TaskAvailability, PlatformError> {
        Ok(TaskAvailability::Available)
    }

    async fn is_registered(&self, _task_name: &str) -> Result<bool, PlatformError> {
        Ok(self.registered.load(Ordering::SeqCst))
    }

    async fn start_location_updates(
        &self,
        task_name: &str,
        options: &TrackingOptions,
    ) -> Result<(), PlatformError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let delay = self.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(PlatformError::Rejected("task manager refused".to_string()));
        }
        *self.last_options.lock().unwrap() = Some((task_name.to_string(), options.clone()));
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_location_updates(&self, _task_name: &str) -> Result<(), PlatformError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(PlatformError::Rejected("task manager refused".to_string()));
        }
        self.registered.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Session, alerts, reporting, profiles
// ─────────────────────────────────────────────────────────────────────

pub struct FixedSession {
    pub session: Mutex<Option<Session>>,
}

impl FixedSession {
    pub fn new(user_id: Option<&str>) -> Self {
        Self {
            session: Mutex::new(user_id.map(|id| Session {
                user_id: id.to_string(),
                session_id: Some(format!("session-{id}")),
            })),
        }
    }

    pub fn log_out(&self) {
        *self.session.lock().unwrap() = None;
    }
}

#[async_trait]
impl SessionProvider for FixedSession {
    async fn current_session(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.session.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct RecordingAlerter {
    pub alerts: Mutex<Vec<(AlertSeverity, String)>>,
}

impl RecordingAlerter {
    pub fn messages(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

impl Alerter for RecordingAlerter {
    fn alert(&self, severity: AlertSeverity, message: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub exceptions: Mutex<Vec<String>>,
    pub breadcrumbs: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn exception_count(&self) -> usize {
        self.exceptions.lock().unwrap().len()
    }
}

impl Reporter for RecordingReporter {
    fn capture_exception(&self, error: &(dyn std::error::Error + 'static)) {
        self.exceptions.lock().unwrap().push(error.to_string());
    }

    fn add_breadcrumb(&self, message: &str) {
        self.breadcrumbs.lock().unwrap().push(message.to_string());
    }
}

/// Profile lookup backed by a fixed map
#[derive(Default)]
pub struct MapProfiles {
    pub profiles: HashMap<String, UserProfile>,
    pub lookups: AtomicUsize,
}

impl MapProfiles {
    pub fn with(names: &[(&str, &str)]) -> Self {
        let profiles = names
            .iter()
            .map(|(id, name)| {
                (
                    id.to_string(),
                    UserProfile {
                        user_id: id.to_string(),
                        display_name: Some(name.to_string()),
                        username: None,
                        avatar_id: None,
                    },
                )
            })
            .collect();
        Self {
            profiles,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileDirectory for MapProfiles {
    async fn profile(&self, user_id: &str) -> Result<UserProfile, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("userdata", user_id))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Realtime
// ─────────────────────────────────────────────────────────────────────

/// Realtime feed driven by the test through a sender
pub struct ScriptedFeed {
    pending: Mutex<Option<mpsc::Receiver<FeedMessage>>>,
}

impl ScriptedFeed {
    /// Feed that hands out one subscription fed by the returned sender
    pub fn new() -> (Self, mpsc::Sender<FeedMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let feed = Self {
            pending: Mutex::new(Some(rx)),
        };
        (feed, tx)
    }
}

#[async_trait]
impl RealtimeFeed for ScriptedFeed {
    async fn subscribe(&self, _channels: Vec<String>) -> Result<Subscription, RealtimeError> {
        let messages = self
            .pending
            .lock()
            .unwrap()
            .take()
            .ok_or(RealtimeError::Closed)?;
        let idle = tokio::spawn(std::future::pending::<()>());
        Ok(Subscription::new(messages, idle))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────

/// One client's worth of collaborators
pub struct Harness {
    pub store: Arc<RecordingStore>,
    pub scheduler: Arc<FakeScheduler>,
    pub permissions: Arc<FakePermissions>,
    pub session: Arc<FixedSession>,
    pub alerts: Arc<RecordingAlerter>,
    pub reporter: Arc<RecordingReporter>,
    pub services: LocationServices,
}

impl Harness {
    pub fn new(user_id: Option<&str>) -> Self {
        Self::with_permissions(user_id, FakePermissions::granting())
    }

    pub fn with_permissions(user_id: Option<&str>, permissions: FakePermissions) -> Self {
        let store = Arc::new(RecordingStore::new());
        let scheduler = Arc::new(FakeScheduler::new());
        let permissions = Arc::new(permissions);
        let session = Arc::new(FixedSession::new(user_id));
        let alerts = Arc::new(RecordingAlerter::default());
        let reporter = Arc::new(RecordingReporter::default());

        let services = LocationServices::new(
            Settings::default(),
            store.clone(),
            scheduler.clone(),
            permissions.clone(),
            session.clone(),
        )
        .with_alerter(alerts.clone())
        .with_reporter(reporter.clone());

        Self {
            store,
            scheduler,
            permissions,
            session,
            alerts,
            reporter,
            services,
        }
    }

    pub fn controller(&self) -> SharingController {
        SharingController::new(self.services.clone())
    }

    pub fn handler(&self) -> LocationUpdateHandler {
        LocationUpdateHandler::new(self.services.clone())
    }
}
