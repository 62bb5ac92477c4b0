use crate::errors::{RepoError, StorageError};
use crate::models::{Memory, NewMemory, UserProfile};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

/// Trait defining operations on the memory-wall documents and the
/// per-user upvote aggregate.
#[async_trait]
pub trait WallRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Creates the memory with zero upvotes, failing with
    /// `RepoError::DuplicateSubmission` if a memory already exists for
    /// the same (event_id, user_id). Returns the stored record with
    /// repository-assigned timestamps.
    async fn create_memory(&self, new: &NewMemory) -> Result<Memory, RepoError>;

    /// Retrieves one memory. Returns Ok(None) if absent.
    async fn get_memory(&self, event_id: &str, user_id: &str)
    -> Result<Option<Memory>, RepoError>;

    /// Lists every memory on one event's wall, order unspecified.
    async fn list_memories(&self, event_id: &str) -> Result<Vec<Memory>, RepoError>;

    /// Flips `voter_id`'s vote on the memory owned by `owner_id`,
    /// adjusting `upvote_count` and the owner's
    /// `total_upvotes_received` in the same atomic unit. Returns the
    /// updated memory.
    async fn toggle_upvote(
        &self,
        event_id: &str,
        owner_id: &str,
        voter_id: &str,
    ) -> Result<Memory, RepoError>;

    /// Reads a user's aggregate counter; users with no upvotes yet get
    /// a zero-valued profile.
    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, RepoError>;

    /// Top users by total upvotes received, descending.
    async fn top_profiles(&self, limit: usize) -> Result<Vec<UserProfile>, RepoError>;
}

/// Trait defining operations for storing and retrieving image data.
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Whether an object already exists at the key.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Writes the object. Keys are write-once: uploading to an
    /// occupied key fails with `StorageError::DuplicateSubmission`.
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<(), StorageError>;

    /// Reads the object data and its stored content type.
    async fn download(&self, key: &str) -> Result<(ByteStream, Option<String>), StorageError>;

    /// Durable retrieval URL for the key.
    fn url(&self, key: &str) -> String;
}
