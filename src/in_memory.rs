//! HashMap-backed implementations of both backend ports. Selected with
//! `DATA_BACKEND=memory` for credential-free local runs, and used by
//! the test suite in place of DynamoDB/S3.

use crate::{
    domain::{FileStorage, WallRepository},
    errors::{RepoError, StorageError},
    models::{Memory, NewMemory, UserProfile, now_ms},
};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct WallState {
    memories: HashMap<(String, String), Memory>,
    totals: HashMap<String, u64>,
}

#[derive(Default, Clone)]
pub struct InMemoryWallRepository {
    state: Arc<RwLock<WallState>>,
}

impl InMemoryWallRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WallRepository for InMemoryWallRepository {
    async fn create_memory(&self, new: &NewMemory) -> Result<Memory, RepoError> {
        let mut state = self.state.write().await;
        let key = (new.event_id.clone(), new.user_id.clone());
        if state.memories.contains_key(&key) {
            return Err(RepoError::DuplicateSubmission {
                event_id: new.event_id.clone(),
                user_id: new.user_id.clone(),
            });
        }
        let now = now_ms();
        let memory = Memory {
            event_id: new.event_id.clone(),
            user_id: new.user_id.clone(),
            description: new.description.clone(),
            image_url: new.image_url.clone(),
            upvote_count: 0,
            upvoted_by: Vec::new(),
            created_at_ms: now,
            updated_at_ms: now,
        };
        state.memories.insert(key, memory.clone());
        Ok(memory)
    }

    async fn get_memory(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<Memory>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .memories
            .get(&(event_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn list_memories(&self, event_id: &str) -> Result<Vec<Memory>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .memories
            .values()
            .filter(|m| m.event_id == event_id)
            .cloned()
            .collect())
    }

    /// The whole flip happens under one write guard, so the membership
    /// check, both counters, and the timestamp commit as a unit.
    async fn toggle_upvote(
        &self,
        event_id: &str,
        owner_id: &str,
        voter_id: &str,
    ) -> Result<Memory, RepoError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let key = (event_id.to_string(), owner_id.to_string());
        let Some(memory) = state.memories.get_mut(&key) else {
            return Err(RepoError::NotFound {
                event_id: event_id.to_string(),
                user_id: owner_id.to_string(),
            });
        };
        let total = state.totals.entry(owner_id.to_string()).or_insert(0);

        if let Some(pos) = memory.upvoted_by.iter().position(|v| v == voter_id) {
            memory.upvoted_by.remove(pos);
            memory.upvote_count -= 1;
            *total -= 1;
        } else {
            memory.upvoted_by.push(voter_id.to_string());
            memory.upvote_count += 1;
            *total += 1;
        }
        memory.updated_at_ms = now_ms();

        Ok(memory.clone())
    }

    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, RepoError> {
        let state = self.state.read().await;
        Ok(UserProfile {
            user_id: user_id.to_string(),
            total_upvotes_received: state.totals.get(user_id).copied().unwrap_or(0),
        })
    }

    async fn top_profiles(&self, limit: usize) -> Result<Vec<UserProfile>, RepoError> {
        let state = self.state.read().await;
        let mut profiles: Vec<UserProfile> = state
            .totals
            .iter()
            .map(|(user_id, total)| UserProfile {
                user_id: user_id.clone(),
                total_upvotes_received: *total,
            })
            .collect();
        profiles.sort_by(|a, b| {
            b.total_upvotes_received
                .cmp(&a.total_upvotes_received)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        profiles.truncate(limit);
        Ok(profiles)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryFileStorage {
    objects: Arc<RwLock<HashMap<String, (Vec<u8>, Option<String>)>>>,
    public_base_url: String,
}

impl InMemoryFileStorage {
    pub fn new(public_base_url: String) -> Self {
        Self {
            objects: Arc::default(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Raw stored bytes, for assertions in tests.
    pub async fn stored_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).map(|(data, _)| data.clone())
    }
}

#[async_trait]
impl FileStorage for InMemoryFileStorage {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<(), StorageError> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(StorageError::DuplicateSubmission(key.to_string()));
        }
        objects.insert(key.to_string(), (data, content_type));
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<(ByteStream, Option<String>), StorageError> {
        let objects = self.objects.read().await;
        let (data, content_type) = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok((ByteStream::from(data.clone()), content_type.clone()))
    }

    fn url(&self, key: &str) -> String {
        format!("{}/images/{}", self.public_base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_memory(event_id: &str, user_id: &str) -> NewMemory {
        NewMemory {
            event_id: event_id.to_string(),
            user_id: user_id.to_string(),
            description: "what a night".to_string(),
            image_url: format!("http://localhost/images/memory_wall/{event_id}/{user_id}.jpg"),
        }
    }

    #[tokio::test]
    async fn in_memory_wall_create_get_list_roundtrip() {
        let repo = InMemoryWallRepository::new();
        let created = repo.create_memory(&new_memory("ev-1", "alice")).await.unwrap();
        assert_eq!(created.upvote_count, 0);
        assert!(created.upvoted_by.is_empty());

        let fetched = repo.get_memory("ev-1", "alice").await.unwrap().unwrap();
        assert_eq!(fetched, created);

        repo.create_memory(&new_memory("ev-2", "alice")).await.unwrap();
        let listed = repo.list_memories("ev-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].event_id, "ev-1");
    }

    #[tokio::test]
    async fn in_memory_wall_create_conflict() {
        let repo = InMemoryWallRepository::new();
        repo.create_memory(&new_memory("ev-1", "alice")).await.unwrap();
        let err = repo.create_memory(&new_memory("ev-1", "alice")).await.unwrap_err();
        assert!(matches!(err, RepoError::DuplicateSubmission { .. }));
    }

    #[tokio::test]
    async fn in_memory_wall_toggle_missing_memory() {
        let repo = InMemoryWallRepository::new();
        let err = repo.toggle_upvote("ev-1", "ghost", "bob").await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound { .. }));
    }

    #[tokio::test]
    async fn in_memory_storage_is_write_once() {
        let storage = InMemoryFileStorage::new("http://localhost:3000".to_string());
        storage
            .upload("memory_wall/ev-1/alice.jpg", vec![1, 2, 3], None)
            .await
            .unwrap();
        assert!(storage.exists("memory_wall/ev-1/alice.jpg").await.unwrap());

        let err = storage
            .upload("memory_wall/ev-1/alice.jpg", vec![9, 9], None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateSubmission(_)));
        assert_eq!(
            storage.stored_bytes("memory_wall/ev-1/alice.jpg").await,
            Some(vec![1, 2, 3])
        );
    }

    #[tokio::test]
    async fn in_memory_storage_download_missing() {
        let storage = InMemoryFileStorage::new("http://localhost:3000".to_string());
        let err = storage.download("memory_wall/ev-1/alice.jpg").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
