use crate::{
    AppState,
    errors::{AppError, StorageError},
    wall::image_key,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use mime_guess;
use serde::Deserialize;
use std::sync::Arc;
use tracing;

const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
const MAX_LEADERBOARD_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct CreateMemoryRequest {
    pub user_id: String,
    pub description: String,
    pub image_url: String,
}

#[derive(Deserialize)]
pub struct ToggleUpvoteRequest {
    pub voter_id: String,
}

#[derive(Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<usize>,
}

/// Handler for POST /events/{event_id}/memories/image
///
/// Multipart form: `user_id` text field plus the `image` file. Returns
/// the durable image URL the client must echo back to create_memory.
pub async fn upload_memory_image(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut user_id = None;
    let mut image_data: Option<Vec<u8>> = None;
    let mut image_content_type: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        match field_name.as_str() {
            "user_id" => {
                user_id = Some(field.text().await.map_err(|e| {
                    AppError::InvalidInput(format!("Failed to read user_id: {}", e))
                })?)
            }
            "image" => {
                image_content_type = field.content_type().map(|m| m.to_string());
                image_data = Some(field.bytes().await?.to_vec());
            }
            _ => tracing::debug!("Ignoring unknown multipart field: {}", field_name),
        }
    }

    let user_id = user_id.ok_or_else(|| AppError::MissingFormField("user_id".to_string()))?;
    let image_data = image_data.ok_or_else(|| AppError::MissingFormField("image".to_string()))?;

    // Guess content type from the deterministic key if the part didn't carry one
    let final_content_type = image_content_type
        .or_else(|| {
            mime_guess::from_path(image_key(&event_id, &user_id))
                .first_raw()
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let image_url = state
        .wall
        .upload_memory_image(&event_id, &user_id, image_data, Some(final_content_type))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "image_url": image_url })),
    ))
}

/// Handler for POST /events/{event_id}/memories
pub async fn create_memory(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(req): Json<CreateMemoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let memory = state
        .wall
        .create_memory(&event_id, &req.user_id, &req.description, &req.image_url)
        .await?;
    Ok((StatusCode::CREATED, Json(memory)))
}

/// Handler for GET /events/{event_id}/memories
pub async fn list_memories(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let memories = state.wall.list_memories(&event_id).await?;
    tracing::debug!(%event_id, count = memories.len(), "Listed memories via handler");
    Ok(Json(memories))
}

/// Handler for GET /events/{event_id}/memories/{user_id}
pub async fn get_memory(
    State(state): State<Arc<AppState>>,
    Path((event_id, user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let memory = state.wall.get_memory(&event_id, &user_id).await?;
    Ok(Json(memory))
}

/// Handler for POST /events/{event_id}/memories/{user_id}/upvote
///
/// A flip, not a one-way action: the same voter calling twice is back
/// where they started.
pub async fn toggle_upvote(
    State(state): State<Arc<AppState>>,
    Path((event_id, owner_id)): Path<(String, String)>,
    Json(req): Json<ToggleUpvoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let memory = state
        .wall
        .toggle_upvote(&event_id, &owner_id, &req.voter_id)
        .await?;
    Ok(Json(memory))
}

/// Handler for GET /users/{user_id}
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.wall.user_profile(&user_id).await?;
    Ok(Json(profile))
}

/// Handler for GET /leaderboard
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .min(MAX_LEADERBOARD_LIMIT);
    let profiles = state.wall.leaderboard(limit).await?;
    Ok(Json(profiles))
}

/// Handler for GET /images/{*key}
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    tracing::debug!(image_key = %key, "Fetching image file via handler");

    let (byte_stream, content_type) = state.wall.fetch_image(&key).await?;

    let content_type_header = content_type
        .as_deref()
        .unwrap_or("application/octet-stream");

    // Collect the stream into memory; wall images are capped well below
    // the request body limit.
    let data = byte_stream.collect().await.map_err(|e| {
        AppError::from(StorageError::Unavailable(
            anyhow::Error::new(e).context("Failed to collect image bytes from storage"),
        ))
    })?;
    let bytes = data.into_bytes();

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_header)
        .body(Body::from(bytes))
        .map_err(|e| {
            AppError::InternalServerError(format!("Failed to build image response: {}", e))
        })?;

    Ok(response)
}
