// ============================
// location-core/src/store/memory.rs
// ============================
//! In-process document store that also serves as its own realtime feed.
//!
//! Every successful write is broadcast as an event shaped like the hosted
//! backend's: names `databases.<db>.collections.<coll>.documents.<id>.<kind>`
//! on channel `databases.<db>.collections.<coll>.documents`.
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use headpat_common::RawRealtimeEvent;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::DocumentStore;
use crate::error::{RealtimeError, StoreError};
use crate::realtime::{EventKind, FeedMessage, RealtimeFeed, Subscription};

const EVENT_BUFFER: usize = 256;
const SUBSCRIPTION_BUFFER: usize = 64;

struct StoredDocument {
    seq: u64,
    body: Map<String, Value>,
}

struct Inner {
    database_id: String,
    documents: DashMap<(String, String), StoredDocument>,
    next_seq: AtomicU64,
    events: broadcast::Sender<RawRealtimeEvent>,
}

/// Shared, cloneable in-memory store
#[derive(Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<Inner>,
}

impl MemoryDocumentStore {
    pub fn new(database_id: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                database_id: database_id.into(),
                documents: DashMap::new(),
                next_seq: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Number of documents in `collection`
    pub fn count(&self, collection: &str) -> usize {
        self.inner
            .documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .count()
    }

    pub fn contains(&self, collection: &str, id: &str) -> bool {
        self.inner
            .documents
            .contains_key(&(collection.to_string(), id.to_string()))
    }

    fn channel(&self, collection: &str) -> String {
        format!(
            "databases.{}.collections.{}.documents",
            self.inner.database_id, collection
        )
    }

    fn publish(&self, collection: &str, id: &str, kind: EventKind, payload: Value) {
        let channel = self.channel(collection);
        let event = RawRealtimeEvent {
            events: vec![
                format!("{channel}.{id}.{}", kind.as_str()),
                format!("{channel}.{id}"),
                format!("{channel}.*.{}", kind.as_str()),
            ],
            channels: vec![
                "documents".to_string(),
                channel.clone(),
                format!("{channel}.{id}"),
            ],
            timestamp: Some(Utc::now().to_rfc3339()),
            payload,
        };
        // No receivers simply means nobody is watching.
        let _ = self.inner.events.send(event);
    }

    fn into_object(data: Value) -> Result<Map<String, Value>, StoreError> {
        Ok(serde_json::from_value::<Map<String, Value>>(data)?)
    }

    fn strip_system_fields(data: &mut Map<String, Value>) {
        data.retain(|key, _| !key.starts_with('$'));
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
        self.inner
            .documents
            .get(&(collection.to_string(), id.to_string()))
            .map(|doc| Value::Object(doc.body.clone()))
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let mut documents: Vec<(u64, Value)> = self
            .inner
            .documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .map(|entry| (entry.seq, Value::Object(entry.body.clone())))
            .collect();
        documents.sort_by_key(|(seq, _)| *seq);
        Ok(documents.into_iter().map(|(_, doc)| doc).collect())
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<Value, StoreError> {
        let mut body = Self::into_object(data)?;
        Self::strip_system_fields(&mut body);

        let now = Utc::now().to_rfc3339();
        body.insert("$id".to_string(), Value::String(id.to_string()));
        body.insert("$collectionId".to_string(), Value::String(collection.to_string()));
        body.insert(
            "$databaseId".to_string(),
            Value::String(self.inner.database_id.clone()),
        );
        body.insert("$createdAt".to_string(), Value::String(now.clone()));
        body.insert("$updatedAt".to_string(), Value::String(now));

        let created = {
            let key = (collection.to_string(), id.to_string());
            match self.inner.documents.entry(key) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    return Err(StoreError::Conflict {
                        collection: collection.to_string(),
                        id: id.to_string(),
                    });
                },
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
                    slot.insert(StoredDocument {
                        seq,
                        body: body.clone(),
                    });
                    Value::Object(body)
                },
            }
        };

        debug!(collection, id, "document created");
        self.publish(collection, id, EventKind::Create, created.clone());
        Ok(created)
    }

    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<Value, StoreError> {
        let mut patch = Self::into_object(data)?;
        Self::strip_system_fields(&mut patch);

        let updated = {
            let mut doc = self
                .inner
                .documents
                .get_mut(&(collection.to_string(), id.to_string()))
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            for (key, value) in patch {
                doc.body.insert(key, value);
            }
            doc.body.insert(
                "$updatedAt".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
            Value::Object(doc.body.clone())
        };

        debug!(collection, id, "document updated");
        self.publish(collection, id, EventKind::Update, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let (_, removed) = self
            .inner
            .documents
            .remove(&(collection.to_string(), id.to_string()))
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        debug!(collection, id, "document deleted");
        self.publish(collection, id, EventKind::Delete, Value::Object(removed.body));
        Ok(())
    }
}

#[async_trait]
impl RealtimeFeed for MemoryDocumentStore {
    async fn subscribe(&self, channels: Vec<String>) -> Result<Subscription, RealtimeError> {
        let mut source = self.inner.events.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let pump = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) => {
                        if !event.channels.iter().any(|c| channels.contains(c)) {
                            continue;
                        }
                        if tx.send(FeedMessage::Event(event)).await.is_err() {
                            break;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "realtime subscriber lagged, events dropped");
                        if tx.send(FeedMessage::Gap).await.is_err() {
                            break;
                        }
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(rx, pump))
    }
}
