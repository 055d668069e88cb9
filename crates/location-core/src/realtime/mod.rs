// ============================
// location-core/src/realtime/mod.rs
// ============================
//! Realtime change feed: subscription handles and event decoding.
//!
//! Raw events name their type in the last segment of a dotted event string
//! (`...documents.<id>.update`). They are decoded exactly once, here, into a
//! closed [`LocationEvent`]; nothing downstream branches on strings.
use async_trait::async_trait;
use headpat_common::{LocationRecord, RawRealtimeEvent, UserId};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{EventError, RealtimeError};

mod appwrite;

pub use appwrite::AppwriteRealtime;

/// Push-based change feed
#[async_trait]
pub trait RealtimeFeed: Send + Sync {
    /// Subscribe to `channels`; events arrive in delivery order
    async fn subscribe(&self, channels: Vec<String>) -> Result<Subscription, RealtimeError>;
}

/// One item delivered on a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Event(RawRealtimeEvent),
    /// Events may have been missed (reconnect or lag); consumers rebuild
    /// their state before trusting further events
    Gap,
}

/// Live subscription; dropping it unsubscribes.
pub struct Subscription {
    messages: mpsc::Receiver<FeedMessage>,
    pump: Option<JoinHandle<()>>,
}

impl Subscription {
    /// `pump` is the task feeding `messages`; it is aborted on unsubscribe
    pub fn new(messages: mpsc::Receiver<FeedMessage>, pump: JoinHandle<()>) -> Self {
        Self {
            messages,
            pump: Some(pump),
        }
    }

    /// Next message, or `None` once the feed has given up
    pub async fn next(&mut self) -> Option<FeedMessage> {
        self.messages.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Change type carried in the event name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "create" => Some(EventKind::Create),
            "update" => Some(EventKind::Update),
            "delete" => Some(EventKind::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

/// A decoded change to the location collection
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Created(LocationRecord),
    Updated(LocationRecord),
    Deleted { id: UserId },
}

impl LocationEvent {
    /// Owner of the affected record
    pub fn subject(&self) -> &str {
        match self {
            LocationEvent::Created(record) | LocationEvent::Updated(record) => &record.id,
            LocationEvent::Deleted { id } => id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            LocationEvent::Created(_) => EventKind::Create,
            LocationEvent::Updated(_) => EventKind::Update,
            LocationEvent::Deleted { .. } => EventKind::Delete,
        }
    }
}

#[derive(Deserialize)]
struct DeletedDocument {
    #[serde(rename = "$id")]
    id: UserId,
}

/// Extract the change type from an event's names.
///
/// The first name with a recognised suffix wins; wildcard names such as
/// `databases.*.collections.*.documents.*` carry no type and are skipped.
pub fn event_kind(raw: &RawRealtimeEvent) -> Result<EventKind, EventError> {
    let first = raw.events.first().ok_or(EventError::MissingEvents)?;

    raw.events
        .iter()
        .filter_map(|name| name.rsplit('.').next())
        .find_map(EventKind::from_suffix)
        .ok_or_else(|| {
            let suffix = first.rsplit('.').next().unwrap_or(first.as_str());
            EventError::UnknownKind(suffix.to_string())
        })
}

/// Decode a raw event into a location change
pub fn parse_location_event(raw: &RawRealtimeEvent) -> Result<LocationEvent, EventError> {
    let kind = event_kind(raw)?;
    let event = match kind {
        EventKind::Create => LocationEvent::Created(serde_json::from_value(raw.payload.clone())?),
        EventKind::Update => LocationEvent::Updated(serde_json::from_value(raw.payload.clone())?),
        EventKind::Delete => {
            let deleted: DeletedDocument = serde_json::from_value(raw.payload.clone())?;
            LocationEvent::Deleted { id: deleted.id }
        },
    };
    Ok(event)
}
