use crate::{
    domain::WallRepository,
    errors::RepoError,
    models::{Memory, NewMemory, UserProfile, now_ms},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client as DynamoDbClient,
    error::SdkError,
    operation::transact_write_items::TransactWriteItemsError,
    types::{AttributeValue, TransactWriteItem, Update},
};
use backoff::ExponentialBackoffBuilder;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{self, info};

/// Initial delay between optimistic toggle retries.
const TOGGLE_RETRY_INITIAL: Duration = Duration::from_millis(25);
/// Total time budget for one toggle before giving up with `Unavailable`.
const TOGGLE_RETRY_BUDGET: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct DynamoDbWallRepository {
    client: DynamoDbClient,
    memories_table: String,
    profiles_table: String,
}

impl DynamoDbWallRepository {
    /// Creates a new repository instance configured for specific tables.
    pub fn new(client: DynamoDbClient, memories_table: String, profiles_table: String) -> Self {
        info!(%memories_table, %profiles_table, "Initializing DynamoDbWallRepository");
        Self {
            client,
            memories_table,
            profiles_table,
        }
    }

    async fn read_memory(
        &self,
        event_id: &str,
        user_id: &str,
        consistent: bool,
    ) -> Result<Option<Memory>, RepoError> {
        let resp = self.client
            .get_item()
            .table_name(&self.memories_table)
            .key("event_id", AttributeValue::S(event_id.to_string()))
            .key("user_id", AttributeValue::S(user_id.to_string()))
            .consistent_read(consistent)
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to get memory (event: {}, user: {})",
                self.memories_table, event_id, user_id
            ))
            .map_err(RepoError::Unavailable)?;

        match resp.item {
            Some(item) => match item_to_memory(&item) {
                Some(memory) => Ok(Some(memory)),
                None => {
                    tracing::error!(%event_id, %user_id, table_name = %self.memories_table, "DynamoDB: Retrieved item but failed to parse into Memory");
                    Err(RepoError::DataCorruption(format!(
                        "Failed to parse memory retrieved from DynamoDB table '{}' for ({}, {})",
                        self.memories_table, event_id, user_id
                    )))
                }
            },
            None => Ok(None), // Item not found is not an error
        }
    }

    /// One optimistic attempt: strongly-consistent read, then a
    /// TransactWriteItems whose memory update is conditioned on the
    /// membership state the read observed. The profile ADD rides in the
    /// same transaction so the aggregate can never drift from the
    /// per-memory counter.
    async fn try_toggle(
        &self,
        event_id: &str,
        owner_id: &str,
        voter_id: &str,
    ) -> Result<(), backoff::Error<RepoError>> {
        let current = self
            .read_memory(event_id, owner_id, true)
            .await
            .map_err(backoff::Error::permanent)?
            .ok_or_else(|| {
                backoff::Error::permanent(RepoError::NotFound {
                    event_id: event_id.to_string(),
                    user_id: owner_id.to_string(),
                })
            })?;

        let is_upvoted = current.upvoted_by.iter().any(|v| v == voter_id);
        let now = now_ms();

        let (update_expression, condition_expression, delta) = if is_upvoted {
            (
                "SET upvote_count = upvote_count - :one, updated_at = :now \
                 DELETE upvoted_by :voter_set",
                "contains(upvoted_by, :voter)",
                "-1",
            )
        } else {
            (
                "SET upvote_count = upvote_count + :one, updated_at = :now \
                 ADD upvoted_by :voter_set",
                "attribute_exists(event_id) AND NOT contains(upvoted_by, :voter)",
                "1",
            )
        };

        let memory_update = Update::builder()
            .table_name(&self.memories_table)
            .key("event_id", AttributeValue::S(event_id.to_string()))
            .key("user_id", AttributeValue::S(owner_id.to_string()))
            .update_expression(update_expression)
            .condition_expression(condition_expression)
            .expression_attribute_values(
                ":voter_set",
                AttributeValue::Ss(vec![voter_id.to_string()]),
            )
            .expression_attribute_values(":voter", AttributeValue::S(voter_id.to_string()))
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .expression_attribute_values(":now", AttributeValue::N(now.to_string()))
            .build()
            .map_err(|e| backoff::Error::permanent(RepoError::Request(e)))?;

        let profile_update = Update::builder()
            .table_name(&self.profiles_table)
            .key("user_id", AttributeValue::S(owner_id.to_string()))
            .update_expression("ADD total_upvotes_received :delta")
            .expression_attribute_values(":delta", AttributeValue::N(delta.to_string()))
            .build()
            .map_err(|e| backoff::Error::permanent(RepoError::Request(e)))?;

        let result = self.client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().update(memory_update).build())
            .transact_items(TransactWriteItem::builder().update(profile_update).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sdk_err) => {
                let retriable = if let SdkError::ServiceError(service_err) = &sdk_err {
                    match service_err.err() {
                        TransactWriteItemsError::TransactionCanceledException(cancel) => cancel
                            .cancellation_reasons()
                            .iter()
                            .any(|reason| {
                                matches!(
                                    reason.code(),
                                    Some("ConditionalCheckFailed") | Some("TransactionConflict")
                                )
                            }),
                        _ => false,
                    }
                } else {
                    false
                };

                let err = RepoError::Unavailable(anyhow::Error::new(sdk_err).context(format!(
                    "DynamoDB (table: {}): Toggle transaction failed (event: {}, owner: {}, voter: {})",
                    self.memories_table, event_id, owner_id, voter_id
                )));

                if retriable {
                    tracing::debug!(%event_id, %owner_id, %voter_id, "DynamoDB: Toggle transaction conflicted, retrying");
                    Err(backoff::Error::transient(err))
                } else {
                    Err(backoff::Error::permanent(err))
                }
            }
        }
    }
}

#[async_trait]
impl WallRepository for DynamoDbWallRepository {
    /// Stores a new `Memory` using a conditional PutItem. The
    /// `attribute_not_exists` guard makes creation atomic: the second
    /// of two racing first-time submissions loses.
    async fn create_memory(&self, new: &NewMemory) -> Result<Memory, RepoError> {
        let now = now_ms();
        // DynamoDB string sets cannot be empty, so upvoted_by is simply
        // absent until the first vote lands.
        let result = self.client
            .put_item()
            .table_name(&self.memories_table)
            .item("event_id", AttributeValue::S(new.event_id.clone()))
            .item("user_id", AttributeValue::S(new.user_id.clone()))
            .item("description", AttributeValue::S(new.description.clone()))
            .item("image_url", AttributeValue::S(new.image_url.clone()))
            .item("upvote_count", AttributeValue::N("0".to_string()))
            .item("created_at", AttributeValue::N(now.to_string()))
            .item("updated_at", AttributeValue::N(now.to_string()))
            .condition_expression("attribute_not_exists(event_id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(Memory {
                event_id: new.event_id.clone(),
                user_id: new.user_id.clone(),
                description: new.description.clone(),
                image_url: new.image_url.clone(),
                upvote_count: 0,
                upvoted_by: Vec::new(),
                created_at_ms: now,
                updated_at_ms: now,
            }),
            Err(sdk_err) => {
                if let SdkError::ServiceError(service_err) = &sdk_err {
                    if service_err.err().is_conditional_check_failed_exception() {
                        tracing::warn!(event_id = %new.event_id, user_id = %new.user_id, "DynamoDB: Memory already exists, create rejected");
                        return Err(RepoError::DuplicateSubmission {
                            event_id: new.event_id.clone(),
                            user_id: new.user_id.clone(),
                        });
                    }
                }
                Err(RepoError::Unavailable(
                    anyhow::Error::new(sdk_err).context(format!(
                        "DynamoDB (table: {}): Failed to put memory (event: {}, user: {})",
                        self.memories_table, new.event_id, new.user_id
                    )),
                ))
            }
        }
    }

    async fn get_memory(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<Memory>, RepoError> {
        self.read_memory(event_id, user_id, false).await
    }

    /// Lists one event's wall with a partition Query. Handles pagination.
    async fn list_memories(&self, event_id: &str) -> Result<Vec<Memory>, RepoError> {
        tracing::debug!("DynamoDB: Querying table '{}' for event '{}'", self.memories_table, event_id);
        let mut memories: Vec<Memory> = Vec::new();
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut request_builder = self.client
                .query()
                .table_name(&self.memories_table)
                .key_condition_expression("event_id = :event_id")
                .expression_attribute_values(":event_id", AttributeValue::S(event_id.to_string()));

            // Apply ExclusiveStartKey if paginating from previous response
            if let Some(lek) = last_evaluated_key {
                request_builder = request_builder.set_exclusive_start_key(Some(lek));
            }

            let resp = request_builder
                .send()
                .await
                .context(format!(
                    "DynamoDB: Failed to query table '{}' for event '{}'",
                    self.memories_table, event_id
                ))
                .map_err(RepoError::Unavailable)?;

            if let Some(items) = resp.items {
                tracing::debug!("DynamoDB Query (table: {}): Returned {} items", self.memories_table, items.len());
                for item in items {
                    match item_to_memory(&item) {
                        Some(memory) => memories.push(memory),
                        None => {
                            let owner = item.get("user_id").and_then(|v| v.as_s().ok());
                            tracing::error!(item.owner = ?owner, table_name = %self.memories_table, "DynamoDB: Failed to parse item from query into Memory");
                            // Fail fast if data in the table is corrupt
                            return Err(RepoError::DataCorruption(format!(
                                "DynamoDB: Failed to parse item {:?} during query of table '{}'",
                                owner, self.memories_table
                            )));
                        }
                    }
                }
            }

            // Check for next page
            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
            tracing::debug!("DynamoDB Query (table: {}): Continuing with LastEvaluatedKey...", self.memories_table);
        }

        tracing::info!("DynamoDB (table: {}): Listed {} memories for event '{}'", self.memories_table, memories.len(), event_id);
        Ok(memories)
    }

    async fn toggle_upvote(
        &self,
        event_id: &str,
        owner_id: &str,
        voter_id: &str,
    ) -> Result<Memory, RepoError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(TOGGLE_RETRY_INITIAL)
            .with_max_elapsed_time(Some(TOGGLE_RETRY_BUDGET))
            .build();

        backoff::future::retry(policy, || self.try_toggle(event_id, owner_id, voter_id)).await?;

        // Re-read the committed state rather than guessing at it; other
        // voters may have landed between our read and commit.
        self.read_memory(event_id, owner_id, true)
            .await?
            .ok_or_else(|| RepoError::NotFound {
                event_id: event_id.to_string(),
                user_id: owner_id.to_string(),
            })
    }

    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, RepoError> {
        let resp = self.client
            .get_item()
            .table_name(&self.profiles_table)
            .key("user_id", AttributeValue::S(user_id.to_string()))
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to get profile (user: {})",
                self.profiles_table, user_id
            ))
            .map_err(RepoError::Unavailable)?;

        match resp.item {
            Some(item) => item_to_profile(&item).ok_or_else(|| {
                tracing::error!(%user_id, table_name = %self.profiles_table, "DynamoDB: Retrieved item but failed to parse into UserProfile");
                RepoError::DataCorruption(format!(
                    "Failed to parse profile retrieved from DynamoDB table '{}' for user {}",
                    self.profiles_table, user_id
                ))
            }),
            // The profile item is created lazily by the first toggle.
            None => Ok(UserProfile {
                user_id: user_id.to_string(),
                total_upvotes_received: 0,
            }),
        }
    }

    /// Top users by received upvotes, via a paginated Scan of the
    /// profiles table.
    async fn top_profiles(&self, limit: usize) -> Result<Vec<UserProfile>, RepoError> {
        let mut profiles: Vec<UserProfile> = Vec::new();
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut request_builder = self.client.scan().table_name(&self.profiles_table);

            if let Some(lek) = last_evaluated_key {
                request_builder = request_builder.set_exclusive_start_key(Some(lek));
            }

            let resp = request_builder
                .send()
                .await
                .context(format!(
                    "DynamoDB: Failed to scan table '{}'",
                    self.profiles_table
                ))
                .map_err(RepoError::Unavailable)?;

            if let Some(items) = resp.items {
                for item in items {
                    match item_to_profile(&item) {
                        Some(profile) => profiles.push(profile),
                        None => {
                            let user = item.get("user_id").and_then(|v| v.as_s().ok());
                            tracing::error!(item.user = ?user, table_name = %self.profiles_table, "DynamoDB: Failed to parse item from scan into UserProfile");
                            return Err(RepoError::DataCorruption(format!(
                                "DynamoDB: Failed to parse item {:?} during scan of table '{}'",
                                user, self.profiles_table
                            )));
                        }
                    }
                }
            }

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }

        profiles.sort_by(|a, b| b.total_upvotes_received.cmp(&a.total_upvotes_received));
        profiles.truncate(limit);
        Ok(profiles)
    }
}

// Helper function to convert a DynamoDB item map to a Memory struct.
// Remains internal to this module.
fn item_to_memory(item: &HashMap<String, AttributeValue>) -> Option<Memory> {
    let event_id = item.get("event_id")?.as_s().ok()?.to_string();
    let user_id = item.get("user_id")?.as_s().ok()?.to_string();
    let description = item.get("description")?.as_s().ok()?.to_string();
    let image_url = item.get("image_url")?.as_s().ok()?.to_string();
    let upvote_count = item.get("upvote_count")?.as_n().ok()?.parse::<u32>().ok()?;
    // The set attribute is absent until the first vote lands.
    let mut upvoted_by: Vec<String> = item
        .get("upvoted_by")
        .and_then(|v| v.as_ss().ok())
        .cloned()
        .unwrap_or_default();
    upvoted_by.sort();
    let created_at_ms = item.get("created_at")?.as_n().ok()?.parse::<i64>().ok()?;
    let updated_at_ms = item.get("updated_at")?.as_n().ok()?.parse::<i64>().ok()?;

    Some(Memory {
        event_id,
        user_id,
        description,
        image_url,
        upvote_count,
        upvoted_by,
        created_at_ms,
        updated_at_ms,
    })
}

fn item_to_profile(item: &HashMap<String, AttributeValue>) -> Option<UserProfile> {
    let user_id = item.get("user_id")?.as_s().ok()?.to_string();
    let total_upvotes_received = item
        .get("total_upvotes_received")?
        .as_n()
        .ok()?
        .parse::<u64>()
        .ok()?;

    Some(UserProfile {
        user_id,
        total_upvotes_received,
    })
}
