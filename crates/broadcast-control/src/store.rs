//! Keyed document store boundary.
//!
//! The core treats persistence as a generic keyed document store with
//! simple equality-filter queries; engine internals are out of scope.
//! Documents cross this boundary as JSON and are migrated to the
//! canonical schema exactly once, on read, via
//! [`crate::models::normalize_resource`].

use crate::errors::BroadcastError;
use crate::models::{BroadcastResource, MemorialDoc};
use common::types::{MemorialId, StreamId};

/// Keyed document store for memorials and broadcast resources.
///
/// Implementations wrap whatever backend the deployment uses; the
/// in-memory implementation in [`memory`] backs tests.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one broadcast resource.
    async fn get_stream(&self, id: StreamId) -> Result<Option<BroadcastResource>, BroadcastError>;

    /// Create or replace a broadcast resource.
    async fn put_stream(&self, resource: &BroadcastResource) -> Result<(), BroadcastError>;

    /// Delete a broadcast resource. Deleting an absent id is an error.
    async fn delete_stream(&self, id: StreamId) -> Result<(), BroadcastError>;

    /// All broadcast resources belonging to a memorial.
    async fn streams_by_memorial(
        &self,
        memorial_id: MemorialId,
    ) -> Result<Vec<BroadcastResource>, BroadcastError>;

    /// Fetch one memorial document. The core never writes memorials.
    async fn get_memorial(&self, id: MemorialId) -> Result<Option<MemorialDoc>, BroadcastError>;
}

/// In-memory document store.
///
/// Stores raw JSON documents, so reads exercise the same normalization
/// path a real backend would.
pub mod memory {
    use super::*;
    use crate::models::normalize_resource;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    /// In-memory `DocumentStore` backed by JSON documents.
    #[derive(Default)]
    pub struct InMemoryStore {
        streams: RwLock<HashMap<StreamId, serde_json::Value>>,
        memorials: RwLock<HashMap<MemorialId, MemorialDoc>>,
    }

    impl InMemoryStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a memorial document.
        pub async fn insert_memorial(&self, memorial: MemorialDoc) {
            self.memorials.write().await.insert(memorial.id, memorial);
        }

        /// Seed a raw stream document, bypassing the canonical schema.
        /// Lets tests stage legacy-shaped documents.
        pub async fn insert_raw_stream(&self, id: StreamId, doc: serde_json::Value) {
            self.streams.write().await.insert(id, doc);
        }

        /// Number of stored stream documents.
        pub async fn stream_count(&self) -> usize {
            self.streams.read().await.len()
        }
    }

    #[async_trait::async_trait]
    impl DocumentStore for InMemoryStore {
        async fn get_stream(
            &self,
            id: StreamId,
        ) -> Result<Option<BroadcastResource>, BroadcastError> {
            let streams = self.streams.read().await;
            streams
                .get(&id)
                .cloned()
                .map(normalize_resource)
                .transpose()
        }

        async fn put_stream(&self, resource: &BroadcastResource) -> Result<(), BroadcastError> {
            let doc = serde_json::to_value(resource)
                .map_err(|e| BroadcastError::Storage(format!("serialize failed: {e}")))?;
            self.streams.write().await.insert(resource.id, doc);
            Ok(())
        }

        async fn delete_stream(&self, id: StreamId) -> Result<(), BroadcastError> {
            match self.streams.write().await.remove(&id) {
                Some(_) => Ok(()),
                None => Err(BroadcastError::NotFound(format!("stream {id}"))),
            }
        }

        async fn streams_by_memorial(
            &self,
            memorial_id: MemorialId,
        ) -> Result<Vec<BroadcastResource>, BroadcastError> {
            let streams = self.streams.read().await;
            let mut matches = Vec::new();
            for doc in streams.values() {
                let resource = normalize_resource(doc.clone())?;
                if resource.memorial_id == Some(memorial_id) {
                    matches.push(resource);
                }
            }
            // Stable order for callers and tests.
            matches.sort_by_key(|r| (r.created_at, r.id.0));
            Ok(matches)
        }

        async fn get_memorial(
            &self,
            id: MemorialId,
        ) -> Result<Option<MemorialDoc>, BroadcastError> {
            Ok(self.memorials.read().await.get(&id).cloned())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::memory::InMemoryStore;
    use super::*;
    use crate::models::StreamStatus;
    use chrono::Utc;
    use serde_json::json;

    fn resource(memorial_id: MemorialId) -> BroadcastResource {
        BroadcastResource {
            id: StreamId::new(),
            title: "Rose Hill Service".to_string(),
            description: None,
            memorial_id: Some(memorial_id),
            external_media_id: None,
            stream_key: None,
            playback_url: None,
            status: StreamStatus::Scheduled,
            scheduled_start: None,
            actual_start: None,
            end_time: None,
            recording_ready: false,
            recording_url: None,
            recording_sessions: Vec::new(),
            is_visible: true,
            is_public: true,
            created_by: None,
            allowed_users: None,
            service_key: None,
            service_hash: None,
            last_synced_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_raw_documents() {
        let store = InMemoryStore::new();
        let memorial_id = MemorialId::new();
        let original = resource(memorial_id);

        store.put_stream(&original).await.unwrap();

        let loaded = store.get_stream(original.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, original.id);
        assert_eq!(loaded.title, original.title);
        assert_eq!(loaded.status, StreamStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_legacy_document_normalized_on_read() {
        let store = InMemoryStore::new();
        let id = StreamId::new();
        store
            .insert_raw_stream(
                id,
                json!({
                    "id": id,
                    "title": "Legacy",
                    "state": "idle",
                    "mediaId": "cf-9",
                    "createdAt": "2026-01-01T00:00:00Z",
                    "updatedAt": "2026-01-01T00:00:00Z",
                }),
            )
            .await;

        let loaded = store.get_stream(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StreamStatus::Scheduled);
        assert_eq!(loaded.external_media_id.as_deref(), Some("cf-9"));
    }

    #[tokio::test]
    async fn test_memorial_filter_query() {
        let store = InMemoryStore::new();
        let mine = MemorialId::new();
        let other = MemorialId::new();

        store.put_stream(&resource(mine)).await.unwrap();
        store.put_stream(&resource(mine)).await.unwrap();
        store.put_stream(&resource(other)).await.unwrap();

        let found = store.streams_by_memorial(mine).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r.memorial_id == Some(mine)));
    }

    #[tokio::test]
    async fn test_delete_absent_stream_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.delete_stream(StreamId::new()).await.unwrap_err();
        assert!(matches!(err, BroadcastError::NotFound(_)));
    }
}
