// ============================
// location-core/src/store/mod.rs
// ============================
//! Document store abstraction with an in-memory implementation.
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;

mod locks;
mod memory;

pub use locks::WriterLocks;
pub use memory::MemoryDocumentStore;

/// Trait for document store backends.
///
/// Documents are JSON objects carrying system fields (`$id`, `$updatedAt`, ...)
/// next to their data.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document
    async fn get(&self, collection: &str, id: &str) -> Result<Value, StoreError>;

    /// Fetch every document of a collection in creation order
    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError>;

    /// Create a document; fails with `Conflict` if the id is taken
    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<Value, StoreError>;

    /// Merge `data` into an existing document; fails with `NotFound` if absent
    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<Value, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

/// Fetch one document and decode it
pub async fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<T, StoreError> {
    let document = store.get(collection, id).await?;
    Ok(serde_json::from_value(document)?)
}

/// Fetch every document of a collection and decode it
pub async fn fetch_all<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<T>, StoreError> {
    store
        .list(collection)
        .await?
        .into_iter()
        .map(|document| serde_json::from_value(document).map_err(StoreError::from))
        .collect()
}
