use std::{env, net::SocketAddr, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
}

/// Which persistence stack backs the wall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataBackend {
    DynamoDb,
    /// In-process HashMap-backed stores; used by tests and local runs
    /// without AWS credentials.
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub data_backend: DataBackend,
    pub wall_bucket_name: String,
    pub memory_wall_table: String,
    pub user_profiles_table: String,
    // Store region as string for simplicity here, aws_clients can convert
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    /// Prefix of the image URLs handed back to the mobile client.
    pub public_base_url: String,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();

        let bind_address_str =
            env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let data_backend = match env::var("DATA_BACKEND")
            .unwrap_or_else(|_| "dynamodb".to_string())
            .as_str()
        {
            "dynamodb" => DataBackend::DynamoDb,
            "memory" => DataBackend::Memory,
            other => {
                return Err(ConfigError::InvalidVar(
                    "DATA_BACKEND".into(),
                    format!("expected 'dynamodb' or 'memory', got '{other}'"),
                ));
            }
        };

        // The bucket is only reachable on the DynamoDB/S3 stack; the
        // in-memory backend ignores it.
        let wall_bucket_name = match data_backend {
            DataBackend::DynamoDb => env::var("WALL_BUCKET_NAME")
                .map_err(|_| ConfigError::MissingVar("WALL_BUCKET_NAME".into()))?,
            DataBackend::Memory => {
                env::var("WALL_BUCKET_NAME").unwrap_or_else(|_| "memory-wall-dev".to_string())
            }
        };

        let memory_wall_table =
            env::var("MEMORY_WALL_TABLE").unwrap_or_else(|_| "memory_wall".to_string());
        let user_profiles_table =
            env::var("USER_PROFILES_TABLE").unwrap_or_else(|_| "user_profiles".to_string());

        let aws_region =
            env::var("AWS_DEFAULT_REGION").unwrap_or_else(|_| "ca-central-1".to_string());

        // Allow overriding endpoint for localstack/testing
        let localstack_endpoint = env::var("AWS_ENDPOINT_URL").ok(); // Optional

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{bind_address}"))
            .trim_end_matches('/')
            .to_string();

        Ok(Config {
            bind_address,
            data_backend,
            wall_bucket_name,
            memory_wall_table,
            user_profiles_table,
            aws_region,
            localstack_endpoint,
            public_base_url,
        })
    }
}
