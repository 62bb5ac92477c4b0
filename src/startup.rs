use crate::errors::AppError;
use aws_sdk_dynamodb::{
    Client as DynamoDbClient, error::SdkError as DynamoSdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
};
use aws_sdk_s3::{
    Client as S3Client, error::SdkError as S3SdkError,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
};
use tracing;

/// Creates the memory wall table if it doesn't exist. Composite key:
/// event_id partitions one wall, user_id keys the single memory a user
/// may post to it.
async fn create_memory_wall_table_if_not_exists(
    client: &DynamoDbClient,
    table_name: &str,
) -> Result<(), AppError> {
    let result = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("event_id")
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|e| {
                    AppError::InitError(format!("Failed to build attribute definition: {}", e))
                })?,
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("user_id")
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|e| {
                    AppError::InitError(format!("Failed to build attribute definition: {}", e))
                })?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("event_id")
                .key_type(KeyType::Hash)
                .build()
                .map_err(|e| AppError::InitError(format!("Failed to build key schema: {}", e)))?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("user_id")
                .key_type(KeyType::Range)
                .build()
                .map_err(|e| AppError::InitError(format!("Failed to build key schema: {}", e)))?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;
    handle_table_result(result, table_name)
}

/// Creates the user profiles table if it doesn't exist.
async fn create_profiles_table_if_not_exists(
    client: &DynamoDbClient,
    table_name: &str,
) -> Result<(), AppError> {
    let result = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("user_id")
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|e| {
                    AppError::InitError(format!("Failed to build attribute definition: {}", e))
                })?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("user_id")
                .key_type(KeyType::Hash)
                .build()
                .map_err(|e| AppError::InitError(format!("Failed to build key schema: {}", e)))?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;
    handle_table_result(result, table_name)
}

fn handle_table_result<T>(
    result: Result<T, DynamoSdkError<aws_sdk_dynamodb::operation::create_table::CreateTableError>>,
    table_name: &str,
) -> Result<(), AppError> {
    match result {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Err(e) => {
            if let DynamoSdkError::ServiceError(service_err) = &e {
                if service_err.err().is_resource_in_use_exception() {
                    tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
                    return Ok(());
                }
            }
            let context = format!("Startup: Error creating DynamoDB table '{}'", table_name);
            tracing::error!("{}: {}", context, e);
            Err(AppError::InitError(format!("{}: {}", context, e)))
        }
    }
}

/// Ensures the S3 bucket exists, creating it with the correct location constraint if needed.
async fn ensure_s3_bucket_exists(
    client: &S3Client,
    bucket_name: &str,
    region_str: &str,
) -> Result<(), AppError> {
    let bucket_config = if region_str != "us-east-1" {
        Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        )
    } else {
        None
    };

    let mut create_bucket_req_builder = client.create_bucket().bucket(bucket_name);
    if let Some(config) = bucket_config {
        create_bucket_req_builder = create_bucket_req_builder.create_bucket_configuration(config);
    }

    match create_bucket_req_builder.send().await {
        Ok(_) => {
            tracing::info!("Startup: S3 bucket '{}' created or already exists.", bucket_name);
            Ok(())
        }
        Err(sdk_err) => {
            if let S3SdkError::ServiceError(service_err) = &sdk_err {
                let code = service_err.err().meta().code();
                if code == Some("BucketAlreadyOwnedByYou") || code == Some("BucketAlreadyExists") {
                    tracing::info!("Startup: S3 bucket '{}' already exists.", bucket_name);
                    return Ok(());
                }
            }
            let context = format!("Startup: Error creating S3 bucket '{}'", bucket_name);
            tracing::error!("{}: {}", context, sdk_err);
            Err(AppError::InitError(format!("{}: {}", context, sdk_err)))
        }
    }
}

/// Initializes required AWS resources (DynamoDB tables, S3 bucket).
pub async fn init_resources(
    db_client: &DynamoDbClient,
    s3_client: &S3Client,
    memories_table: &str,
    profiles_table: &str,
    bucket_name: &str,
    region_str: &str,
) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing AWS resources...");
    create_memory_wall_table_if_not_exists(db_client, memories_table).await?;
    create_profiles_table_if_not_exists(db_client, profiles_table).await?;
    ensure_s3_bucket_exists(s3_client, bucket_name, region_str).await?;
    tracing::info!("Startup: AWS resource initialization complete.");
    Ok(())
}
