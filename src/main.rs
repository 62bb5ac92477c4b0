use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aws_clients;
mod config;
mod domain;
mod errors;
mod handlers;
mod in_memory;
mod models;
mod repositories;
mod routes;
mod startup;
mod storage;
mod wall;
#[cfg(test)]
mod tests;

use crate::aws_clients::{create_dynamodb_client, create_s3_client, create_sdk_config};
use crate::config::{Config, DataBackend};
use crate::domain::{FileStorage, WallRepository};
use crate::errors::AppError;
use crate::in_memory::{InMemoryFileStorage, InMemoryWallRepository};
use crate::repositories::DynamoDbWallRepository;
use crate::storage::S3FileStorage;
use crate::wall::MemoryWall;

/// AppState holds shared resources for the web server.
pub struct AppState {
    pub wall: MemoryWall,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "eventecho_wall=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    let (repo, file_storage): (Arc<dyn WallRepository>, Arc<dyn FileStorage>) =
        match config.data_backend {
            DataBackend::DynamoDb => {
                tracing::info!("Initializing AWS clients...");
                let sdk_config = create_sdk_config(&config).await;
                let db_client = create_dynamodb_client(&sdk_config);
                let s3_client = create_s3_client(&sdk_config);

                startup::init_resources(
                    &db_client,
                    &s3_client,
                    &config.memory_wall_table,
                    &config.user_profiles_table,
                    &config.wall_bucket_name,
                    &config.aws_region,
                )
                .await?;

                (
                    Arc::new(DynamoDbWallRepository::new(
                        db_client,
                        config.memory_wall_table.clone(),
                        config.user_profiles_table.clone(),
                    )),
                    Arc::new(S3FileStorage::new(
                        s3_client,
                        config.wall_bucket_name.clone(),
                        config.public_base_url.clone(),
                    )),
                )
            }
            DataBackend::Memory => {
                tracing::info!("Using in-memory backends (DATA_BACKEND=memory)");
                (
                    Arc::new(InMemoryWallRepository::new()),
                    Arc::new(InMemoryFileStorage::new(config.public_base_url.clone())),
                )
            }
        };

    let state = Arc::new(AppState {
        wall: MemoryWall::new(repo, file_storage),
    });

    let app = routes::create_router(state);

    tracing::info!("Server listening on http://{}", config.bind_address);

    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
