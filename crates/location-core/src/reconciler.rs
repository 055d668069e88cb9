// ============================
// location-core/src/reconciler.rs
// ============================
//! Live Location Feed Reconciler
//!
//! Keeps the collection behind the live map in step with the location
//! collection. A full resync establishes the baseline; realtime create,
//! update and delete events are then merged by record id, one at a time in
//! arrival order. Merging by id makes repeated or reordered create/update
//! events for the same user converge on the same entry.
use futures_util::future::join_all;
use headpat_common::{LocationRecord, RawRealtimeEvent, UserId, UserProfile};
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{FeedError, RealtimeError, StoreError};
use crate::profiles::ProfileDirectory;
use crate::realtime::{parse_location_event, FeedMessage, LocationEvent, RealtimeFeed};
use crate::store::{fetch_all, DocumentStore};
use crate::telemetry::{
    Reporter, TracingReporter, FEED_EVENT_APPLIED, FEED_EVENT_REJECTED, FEED_RESYNC,
};

/// A location record together with its owner's display data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationEntry {
    #[serde(flatten)]
    pub record: LocationRecord,
    /// `None` until resolved, or if the lookup failed
    pub profile: Option<UserProfile>,
}

impl LocationEntry {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Map position, if the owner has sent a fix
    pub fn position(&self) -> Option<(f64, f64)> {
        self.record.position()
    }
}

/// Point-in-time copy of the feed state for rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub entries: Vec<LocationEntry>,
    /// The local user's own record, if they are sharing
    pub my_status: Option<LocationRecord>,
}

impl FeedSnapshot {
    pub fn entry(&self, id: &str) -> Option<&LocationEntry> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    /// Entries that can be drawn on the map
    pub fn plottable(&self) -> impl Iterator<Item = &LocationEntry> {
        self.entries.iter().filter(|entry| entry.position().is_some())
    }
}

#[derive(Default)]
struct FeedState {
    entries: Vec<LocationEntry>,
    my_status: Option<LocationRecord>,
}

/// Realtime-backed collection of everyone's shared location
pub struct LiveLocationFeed {
    store: Arc<dyn DocumentStore>,
    feed: Arc<dyn RealtimeFeed>,
    profiles: Arc<dyn ProfileDirectory>,
    reporter: Arc<dyn Reporter>,
    collection: String,
    channel: String,
    local_user: Option<UserId>,
    state: RwLock<FeedState>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl LiveLocationFeed {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn DocumentStore>,
        feed: Arc<dyn RealtimeFeed>,
        profiles: Arc<dyn ProfileDirectory>,
        local_user: Option<UserId>,
    ) -> Self {
        Self {
            store,
            feed,
            profiles,
            reporter: Arc::new(TracingReporter),
            collection: settings.locations_collection.clone(),
            channel: settings.locations_channel(),
            local_user,
            state: RwLock::new(FeedState::default()),
            listener: Mutex::new(None),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.read();
        FeedSnapshot {
            entries: state.entries.clone(),
            my_status: state.my_status.clone(),
        }
    }

    pub fn my_status(&self) -> Option<LocationRecord> {
        self.state.read().my_status.clone()
    }

    pub fn is_focused(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(|listener| !listener.is_finished())
    }

    /// Subscribe, resync, then apply incremental events until [`blur`](Self::blur).
    ///
    /// The subscription is opened before the resync so nothing that changes
    /// during the resync is lost; buffered events are merged afterwards. A
    /// [`FeedMessage::Gap`] triggers another resync.
    pub async fn focus(self: &Arc<Self>) -> Result<(), FeedError> {
        self.blur();

        let mut subscription = self.feed.subscribe(vec![self.channel.clone()]).await?;
        self.resync().await?;

        let weak: Weak<Self> = Arc::downgrade(self);
        let listener = tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                let Some(feed) = weak.upgrade() else { return };
                match message {
                    FeedMessage::Event(raw) => feed.handle_raw(raw).await,
                    FeedMessage::Gap => feed.recover().await,
                }
            }
            if let Some(feed) = weak.upgrade() {
                feed.subscription_closed();
            }
        });

        *self.listener.lock() = Some(listener);
        info!(channel = %self.channel, "location feed focused");
        Ok(())
    }

    /// Unsubscribe and forget the local user's own status
    pub fn blur(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
            debug!(channel = %self.channel, "location feed unsubscribed");
        }
        self.state.write().my_status = None;
    }

    /// Replace the collection with the store's current records
    pub async fn resync(&self) -> Result<(), StoreError> {
        let records: Vec<LocationRecord> =
            fetch_all(self.store.as_ref(), &self.collection).await?;

        let profiles = join_all(records.iter().map(|record| self.lookup_profile(&record.id))).await;

        let my_status = records
            .iter()
            .find(|record| self.is_local(&record.id))
            .cloned();
        let entries: Vec<LocationEntry> = records
            .into_iter()
            .zip(profiles)
            .map(|(record, profile)| LocationEntry { record, profile })
            .collect();

        debug!(entries = entries.len(), "location feed resynced");
        counter!(FEED_RESYNC).increment(1);

        let mut state = self.state.write();
        state.entries = entries;
        state.my_status = my_status;
        Ok(())
    }

    /// Rebuild state after the feed reported missed events
    async fn recover(&self) {
        info!(channel = %self.channel, "location feed missed events, resyncing");
        if let Err(e) = self.resync().await {
            warn!(error = %e, "location feed resync failed");
            self.reporter.capture_exception(&e);
        }
    }

    /// The feed gave up; entries stay as last seen until the next focus
    fn subscription_closed(&self) {
        let err = RealtimeError::Closed;
        warn!(channel = %self.channel, error = %err, "location feed stopped receiving updates");
        self.reporter.capture_exception(&err);
    }

    /// Decode and apply one raw event; undecodable events leave state untouched
    pub async fn handle_raw(&self, raw: RawRealtimeEvent) {
        match parse_location_event(&raw) {
            Ok(event) => self.apply(event).await,
            Err(e) => {
                warn!(error = %e, events = ?raw.events, "rejected realtime location event");
                self.reporter.capture_exception(&e);
                counter!(FEED_EVENT_REJECTED).increment(1);
            },
        }
    }

    /// Merge one decoded change into the collection
    pub async fn apply(&self, event: LocationEvent) {
        let kind = event.kind();
        let is_self = self.is_local(event.subject());

        match event {
            LocationEvent::Updated(record) => {
                let id = record.id.clone();
                let needs_profile = {
                    let mut state = self.state.write();
                    if is_self {
                        state.my_status = Some(record.clone());
                    }
                    match state.entries.iter_mut().find(|entry| entry.record.id == id) {
                        Some(entry) => {
                            entry.record = record;
                            entry.profile.is_none()
                        },
                        None => {
                            state.entries.push(LocationEntry {
                                record,
                                profile: None,
                            });
                            true
                        },
                    }
                };
                if needs_profile {
                    self.fill_profile(&id).await;
                }
            },
            LocationEvent::Created(record) => {
                if is_self {
                    self.state.write().my_status = Some(record.clone());
                }
                let profile = self.lookup_profile(&record.id).await;

                let mut state = self.state.write();
                match state.entries.iter_mut().find(|entry| entry.record.id == record.id) {
                    Some(entry) => {
                        let profile = profile.or_else(|| entry.profile.take());
                        *entry = LocationEntry { record, profile };
                    },
                    None => state.entries.push(LocationEntry { record, profile }),
                }
            },
            LocationEvent::Deleted { id } => {
                let mut state = self.state.write();
                if is_self {
                    state.my_status = None;
                }
                state.entries.retain(|entry| entry.record.id != id);
            },
        }

        counter!(FEED_EVENT_APPLIED, "kind" => kind.as_str()).increment(1);
    }

    fn is_local(&self, id: &str) -> bool {
        self.local_user.as_deref() == Some(id)
    }

    async fn lookup_profile(&self, user_id: &str) -> Option<UserProfile> {
        match self.profiles.profile(user_id).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                debug!(%user_id, error = %e, "no display data for location owner");
                None
            },
        }
    }

    /// Resolve display data for an entry appended without it
    async fn fill_profile(&self, user_id: &str) {
        let Some(profile) = self.lookup_profile(user_id).await else {
            return;
        };
        let mut state = self.state.write();
        if let Some(entry) = state
            .entries
            .iter_mut()
            .find(|entry| entry.record.id == user_id && entry.profile.is_none())
        {
            entry.profile = Some(profile);
        }
    }
}

impl Drop for LiveLocationFeed {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}
