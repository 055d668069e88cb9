// ============================
// location-core/src/profiles.rs
// ============================
//! Display data lookup for location owners.
use async_trait::async_trait;
use headpat_common::UserProfile;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{fetch, DocumentStore};

/// Resolves the display data shown next to a user's pin
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<UserProfile, StoreError>;
}

/// Profiles read from the profile collection of a document store
#[derive(Clone)]
pub struct StoreProfiles {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl StoreProfiles {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl ProfileDirectory for StoreProfiles {
    async fn profile(&self, user_id: &str) -> Result<UserProfile, StoreError> {
        fetch(self.store.as_ref(), &self.collection, user_id).await
    }
}
