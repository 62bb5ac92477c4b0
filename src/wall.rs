use crate::{
    domain::{FileStorage, WallRepository},
    errors::{RepoError, StorageError, WallError},
    models::{Memory, NewMemory, UserProfile},
};
use std::sync::Arc;
use tracing;

const MAX_ID_LENGTH: usize = 128;
const MAX_DESCRIPTION_LENGTH: usize = 2_000;

/// Deterministic object key for the one image a user may attach to an
/// event's wall. Same key on every retry, so a partially completed
/// submission resumes instead of duplicating.
pub fn image_key(event_id: &str, user_id: &str) -> String {
    format!("memory_wall/{event_id}/{user_id}.jpg")
}

/// The memory wall service: one photo memory per user per event, with
/// a single-vote upvote toggle kept consistent with the owner's
/// aggregate total by the repository's transaction.
#[derive(Clone)]
pub struct MemoryWall {
    repo: Arc<dyn WallRepository>,
    storage: Arc<dyn FileStorage>,
}

impl MemoryWall {
    pub fn new(repo: Arc<dyn WallRepository>, storage: Arc<dyn FileStorage>) -> Self {
        Self { repo, storage }
    }

    /// Stores the image for (event, user) and returns its durable URL.
    ///
    /// The key is occupied forever once written: a second upload for
    /// the same pair fails with `DuplicateSubmission`. The existence
    /// probe runs first so an obvious duplicate fails before any bytes
    /// are shipped; the storage layer's conditional write enforces the
    /// same rule when two first-time uploads race.
    pub async fn upload_memory_image(
        &self,
        event_id: &str,
        user_id: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String, WallError> {
        validate_id("event_id", event_id)?;
        validate_id("user_id", user_id)?;
        if data.is_empty() {
            return Err(WallError::InvalidArgument(
                "image data cannot be empty".to_string(),
            ));
        }

        let key = image_key(event_id, user_id);
        if self.storage.exists(&key).await? {
            return Err(WallError::Storage(StorageError::DuplicateSubmission(key)));
        }
        self.storage.upload(&key, data, content_type).await?;

        let url = self.storage.url(&key);
        tracing::info!(%event_id, %user_id, %url, "Memory image uploaded");
        Ok(url)
    }

    /// Creates the memory document with zero upvotes. At most one
    /// memory per (event, user); a second submission fails with
    /// `DuplicateSubmission` and leaves the first untouched.
    pub async fn create_memory(
        &self,
        event_id: &str,
        user_id: &str,
        description: &str,
        image_url: &str,
    ) -> Result<Memory, WallError> {
        validate_id("event_id", event_id)?;
        validate_id("user_id", user_id)?;
        let description = validate_description(description)?;
        if image_url.trim().is_empty() {
            return Err(WallError::InvalidArgument(
                "image_url is required".to_string(),
            ));
        }

        let memory = self
            .repo
            .create_memory(&NewMemory {
                event_id: event_id.to_string(),
                user_id: user_id.to_string(),
                description,
                image_url: image_url.to_string(),
            })
            .await?;
        tracing::info!(%event_id, %user_id, "Memory created");
        Ok(memory)
    }

    /// All memories on one event's wall, order unspecified.
    pub async fn list_memories(&self, event_id: &str) -> Result<Vec<Memory>, WallError> {
        validate_id("event_id", event_id)?;
        Ok(self.repo.list_memories(event_id).await?)
    }

    /// The single memory `user_id` posted to the event, if any.
    pub async fn get_memory(&self, event_id: &str, user_id: &str) -> Result<Memory, WallError> {
        validate_id("event_id", event_id)?;
        validate_id("user_id", user_id)?;
        self.repo
            .get_memory(event_id, user_id)
            .await?
            .ok_or_else(|| {
                WallError::Repo(RepoError::NotFound {
                    event_id: event_id.to_string(),
                    user_id: user_id.to_string(),
                })
            })
    }

    /// Flips `voter_id`'s vote on the memory `owner_id` posted to the
    /// event. A second call by the same voter undoes the first. The
    /// memory's counter and the owner's aggregate total move together
    /// in one atomic transaction.
    pub async fn toggle_upvote(
        &self,
        event_id: &str,
        owner_id: &str,
        voter_id: &str,
    ) -> Result<Memory, WallError> {
        validate_id("event_id", event_id)?;
        validate_id("owner_id", owner_id)?;
        validate_id("voter_id", voter_id)?;

        let memory = self.repo.toggle_upvote(event_id, owner_id, voter_id).await?;
        tracing::info!(%event_id, %owner_id, %voter_id, upvote_count = memory.upvote_count, "Upvote toggled");
        Ok(memory)
    }

    pub async fn user_profile(&self, user_id: &str) -> Result<UserProfile, WallError> {
        validate_id("user_id", user_id)?;
        Ok(self.repo.get_profile(user_id).await?)
    }

    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<UserProfile>, WallError> {
        Ok(self.repo.top_profiles(limit).await?)
    }

    /// The image bytes behind a wall URL, for the serving route.
    pub async fn fetch_image(
        &self,
        key: &str,
    ) -> Result<(aws_sdk_s3::primitives::ByteStream, Option<String>), WallError> {
        Ok(self.storage.download(key).await?)
    }
}

/// Ids end up inside document keys and object keys, so they must be
/// non-empty, bounded, and free of path separators and whitespace.
fn validate_id(field: &str, value: &str) -> Result<(), WallError> {
    if value.is_empty() {
        return Err(WallError::InvalidArgument(format!("{field} is required")));
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(WallError::InvalidArgument(format!(
            "{field} exceeds max length of {MAX_ID_LENGTH}"
        )));
    }
    if value
        .chars()
        .any(|ch| ch == '/' || ch.is_whitespace() || ch.is_control())
    {
        return Err(WallError::InvalidArgument(format!(
            "{field} contains invalid characters"
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<String, WallError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(WallError::InvalidArgument(
            "description is required".to_string(),
        ));
    }
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(WallError::InvalidArgument(format!(
            "description exceeds max length of {MAX_DESCRIPTION_LENGTH}"
        )));
    }
    Ok(description.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RepoError;
    use crate::in_memory::{InMemoryFileStorage, InMemoryWallRepository};

    fn test_wall() -> (MemoryWall, InMemoryFileStorage) {
        let storage = InMemoryFileStorage::new("http://localhost:3000".to_string());
        let wall = MemoryWall::new(
            Arc::new(InMemoryWallRepository::new()),
            Arc::new(storage.clone()),
        );
        (wall, storage)
    }

    async fn post_memory(wall: &MemoryWall, event_id: &str, user_id: &str) -> Memory {
        let url = wall
            .upload_memory_image(event_id, user_id, vec![0xFF, 0xD8, 0xFF], None)
            .await
            .expect("upload");
        wall.create_memory(event_id, user_id, "Great show", &url)
            .await
            .expect("create")
    }

    #[test]
    fn image_key_is_deterministic() {
        assert_eq!(image_key("E1", "U1"), "memory_wall/E1/U1.jpg");
        assert_eq!(image_key("E1", "U1"), image_key("E1", "U1"));
    }

    #[test]
    fn validate_id_rejects_empty_and_path_characters() {
        assert!(validate_id("event_id", "ev-1").is_ok());
        assert!(validate_id("event_id", "").is_err());
        assert!(validate_id("event_id", "ev/1").is_err());
        assert!(validate_id("event_id", "ev 1").is_err());
        assert!(validate_id("event_id", &"x".repeat(200)).is_err());
    }

    #[test]
    fn validate_description_trims_and_bounds() {
        assert_eq!(validate_description("  hi  ").unwrap(), "hi");
        assert!(validate_description("   ").is_err());
        assert!(validate_description(&"x".repeat(2_001)).is_err());
    }

    #[tokio::test]
    async fn toggle_twice_restores_prior_state() {
        let (wall, _) = test_wall();
        post_memory(&wall, "E1", "U1").await;

        let after_on = wall.toggle_upvote("E1", "U1", "U2").await.unwrap();
        assert_eq!(after_on.upvote_count, 1);
        assert_eq!(after_on.upvoted_by, vec!["U2".to_string()]);

        let after_off = wall.toggle_upvote("E1", "U1", "U2").await.unwrap();
        assert_eq!(after_off.upvote_count, 0);
        assert!(after_off.upvoted_by.is_empty());
        assert_eq!(
            wall.user_profile("U1").await.unwrap().total_upvotes_received,
            0
        );
    }

    #[tokio::test]
    async fn upvote_count_matches_voter_set() {
        let (wall, _) = test_wall();
        post_memory(&wall, "E1", "U1").await;

        for voter in ["U2", "U3", "U4"] {
            wall.toggle_upvote("E1", "U1", voter).await.unwrap();
        }
        // U3 changes their mind.
        wall.toggle_upvote("E1", "U1", "U3").await.unwrap();

        let memory = wall
            .list_memories("E1")
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(memory.upvote_count as usize, memory.upvoted_by.len());
        assert_eq!(memory.upvote_count, 2);
        assert!(!memory.upvoted_by.contains(&"U3".to_string()));
    }

    #[tokio::test]
    async fn aggregate_total_tracks_owned_memories() {
        let (wall, _) = test_wall();
        post_memory(&wall, "E1", "U1").await;
        post_memory(&wall, "E2", "U1").await;

        wall.toggle_upvote("E1", "U1", "U2").await.unwrap();
        wall.toggle_upvote("E1", "U1", "U3").await.unwrap();
        wall.toggle_upvote("E2", "U1", "U2").await.unwrap();
        wall.toggle_upvote("E1", "U1", "U3").await.unwrap(); // undo

        let m1 = wall.list_memories("E1").await.unwrap().remove(0);
        let m2 = wall.list_memories("E2").await.unwrap().remove(0);
        let profile = wall.user_profile("U1").await.unwrap();
        assert_eq!(
            profile.total_upvotes_received,
            (m1.upvote_count + m2.upvote_count) as u64
        );
        assert_eq!(profile.total_upvotes_received, 2);
    }

    #[tokio::test]
    async fn duplicate_create_rejected_and_first_unmodified() {
        let (wall, _) = test_wall();
        let first = post_memory(&wall, "E1", "U1").await;

        let err = wall
            .create_memory("E1", "U1", "second attempt", &first.image_url)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WallError::Repo(RepoError::DuplicateSubmission { .. })
        ));

        let stored = wall.list_memories("E1").await.unwrap().remove(0);
        assert_eq!(stored.description, first.description);
        assert_eq!(stored.created_at_ms, first.created_at_ms);
    }

    #[tokio::test]
    async fn duplicate_upload_rejected_and_bytes_unchanged() {
        let (wall, storage) = test_wall();
        wall.upload_memory_image("E1", "U1", vec![1, 2, 3], None)
            .await
            .unwrap();

        let err = wall
            .upload_memory_image("E1", "U1", vec![4, 5, 6], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WallError::Storage(StorageError::DuplicateSubmission(_))
        ));
        assert_eq!(
            storage.stored_bytes(&image_key("E1", "U1")).await,
            Some(vec![1, 2, 3])
        );
    }

    #[tokio::test]
    async fn concurrent_toggles_from_distinct_voters() {
        let (wall, _) = test_wall();
        post_memory(&wall, "E1", "U1").await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let wall = wall.clone();
            handles.push(tokio::spawn(async move {
                wall.toggle_upvote("E1", "U1", &format!("voter-{i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let memory = wall.list_memories("E1").await.unwrap().remove(0);
        assert_eq!(memory.upvote_count, 10);
        let mut voters = memory.upvoted_by.clone();
        voters.sort();
        let mut expected: Vec<String> = (0..10).map(|i| format!("voter-{i}")).collect();
        expected.sort();
        assert_eq!(voters, expected);
        assert_eq!(
            wall.user_profile("U1").await.unwrap().total_upvotes_received,
            10
        );
    }

    #[tokio::test]
    async fn toggle_on_missing_memory_is_not_found() {
        let (wall, _) = test_wall();
        let err = wall.toggle_upvote("E1", "nobody", "U2").await.unwrap_err();
        assert!(matches!(err, WallError::Repo(RepoError::NotFound { .. })));
    }

    #[tokio::test]
    async fn create_rejects_empty_description() {
        let (wall, _) = test_wall();
        let err = wall
            .create_memory("E1", "U1", "   ", "http://localhost/img.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, WallError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn wall_end_to_end() {
        let (wall, _) = test_wall();

        let url = wall
            .upload_memory_image("E1", "U1", vec![0xFF, 0xD8, 0xFF, 0xE0], None)
            .await
            .unwrap();
        wall.create_memory("E1", "U1", "Great show", &url)
            .await
            .unwrap();

        let listed = wall.list_memories("E1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].upvote_count, 0);
        assert_eq!(listed[0].image_url, url);
        let baseline = wall.user_profile("U1").await.unwrap().total_upvotes_received;

        let after_on = wall.toggle_upvote("E1", "U1", "U2").await.unwrap();
        assert_eq!(after_on.upvote_count, 1);
        assert_eq!(after_on.upvoted_by, vec!["U2".to_string()]);
        assert_eq!(
            wall.user_profile("U1").await.unwrap().total_upvotes_received,
            baseline + 1
        );

        let after_off = wall.toggle_upvote("E1", "U1", "U2").await.unwrap();
        assert_eq!(after_off.upvote_count, 0);
        assert!(after_off.upvoted_by.is_empty());
        assert_eq!(
            wall.user_profile("U1").await.unwrap().total_upvotes_received,
            baseline
        );
    }
}
