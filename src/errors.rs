use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Memory not found for event '{event_id}', user '{user_id}'")]
    NotFound { event_id: String, user_id: String },

    #[error("Memory already exists for event '{event_id}', user '{user_id}'")]
    DuplicateSubmission { event_id: String, user_id: String },

    #[error("Stored item could not be parsed: {0}")]
    DataCorruption(String),

    #[error("Failed to build backend request: {0}")]
    Request(#[from] aws_smithy_types::error::operation::BuildError),

    #[error("Document backend unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object already exists at key: {0}")]
    DuplicateSubmission(String),

    #[error("Object not found with key: {0}")]
    NotFound(String),

    #[error("Blob store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

// --- Service Layer Error ---

#[derive(Error, Debug)]
pub enum WallError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Missing form field: {0}")]
    MissingFormField(String),
    #[error("Error processing multipart form data: {0}")]
    MultipartError(#[from] axum::extract::multipart::MultipartError),

    // Domain/Service level errors (mapped from WallError)
    #[error("Memory not found for event '{event_id}', user '{user_id}'")]
    MemoryNotFound { event_id: String, user_id: String },
    #[error("A memory was already posted for this event")]
    DuplicateSubmission(String),
    #[error("Image not found with key: {0}")]
    ImageNotFound(String),
    #[error("Backend temporarily unavailable")]
    Unavailable(#[source] anyhow::Error),
    #[error("Could not complete the wall operation")]
    WallOperationFailed(#[source] WallError),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Initialization error: {0}")]
    InitError(String),

    // Generic Internal Server Error
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

// --- Conversions from Domain Errors to AppError ---

impl From<WallError> for AppError {
    fn from(err: WallError) -> Self {
        match err {
            WallError::InvalidArgument(msg) => AppError::InvalidInput(msg),
            WallError::Repo(RepoError::NotFound { event_id, user_id }) => {
                AppError::MemoryNotFound { event_id, user_id }
            }
            WallError::Repo(RepoError::DuplicateSubmission { event_id, user_id }) => {
                AppError::DuplicateSubmission(format!(
                    "memory already exists for event '{event_id}', user '{user_id}'"
                ))
            }
            WallError::Repo(RepoError::Unavailable(e)) => AppError::Unavailable(e),
            WallError::Storage(StorageError::DuplicateSubmission(key)) => {
                AppError::DuplicateSubmission(format!("image already uploaded at '{key}'"))
            }
            WallError::Storage(StorageError::NotFound(key)) => AppError::ImageNotFound(key),
            WallError::Storage(StorageError::Unavailable(e)) => AppError::Unavailable(e),
            e @ WallError::Repo(RepoError::DataCorruption(_) | RepoError::Request(_)) => {
                AppError::WallOperationFailed(e)
            }
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::from(WallError::Storage(err))
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(format!("IO error: {err}"))
    }
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // 4xx Client Errors
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::MissingFormField(field) => (
                StatusCode::BAD_REQUEST,
                format!("Missing form field: {}", field),
            ),
            AppError::MultipartError(e) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid multipart form data: {}", e),
            ),
            AppError::MemoryNotFound { event_id, user_id } => (
                StatusCode::NOT_FOUND,
                format!("Memory not found for event '{event_id}', user '{user_id}'"),
            ),
            AppError::ImageNotFound(key) => {
                (StatusCode::NOT_FOUND, format!("Image not found: {key}"))
            }
            AppError::DuplicateSubmission(detail) => {
                (StatusCode::CONFLICT, format!("Already posted: {detail}"))
            }

            // 5xx Server Errors
            AppError::Unavailable(e) => {
                tracing::error!(error.source = ?e, "Backend unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Backend temporarily unavailable, please retry".to_string(),
                )
            }
            AppError::WallOperationFailed(e) => {
                tracing::error!(error.source = ?e, "Wall operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Wall operation failed".to_string(),
                )
            }
            AppError::ConfigError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server configuration error".to_string(),
                )
            }
            AppError::InitError(msg) => {
                tracing::error!("Initialization error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server initialization error".to_string(),
                )
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        tracing::error!(error.message = %error_message, error.detail = %self, "Responding with error");

        let body = Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}
