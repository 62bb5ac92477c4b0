use crate::{
    AppState,
    handlers, // Import handlers module
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/events/{event_id}/memories/image",
            post(handlers::upload_memory_image),
        )
        .route(
            "/events/{event_id}/memories",
            post(handlers::create_memory).get(handlers::list_memories),
        )
        .route(
            "/events/{event_id}/memories/{user_id}",
            get(handlers::get_memory),
        )
        .route(
            "/events/{event_id}/memories/{user_id}/upvote",
            post(handlers::toggle_upvote),
        )
        .route("/users/{user_id}", get(handlers::get_profile))
        .route("/leaderboard", get(handlers::leaderboard))
        .route("/images/{*key}", get(handlers::get_image))
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(state) // Pass the application state
}
