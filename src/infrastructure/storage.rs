use crate::config::ConnectionSettings;
use crate::services::storage::S3ObjectStore;
use aws_config::SdkConfig;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::info;

/// Shared AWS configuration for the object store and queue clients.
pub async fn load_sdk_config(settings: &ConnectionSettings) -> SdkConfig {
    let mut loader = aws_config::from_env()
        .region(Region::new(settings.region.clone()))
        .credentials_provider(Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "static",
        ));
    if let Some(endpoint_url) = &settings.endpoint {
        loader = loader.endpoint_url(endpoint_url);
    }
    loader.load().await
}

pub fn setup_storage(sdk_config: &SdkConfig, settings: &ConnectionSettings) -> Arc<S3ObjectStore> {
    info!(
        "☁️  S3 Storage: {} (Region: {})",
        settings.endpoint.as_deref().unwrap_or("default endpoint"),
        settings.region
    );

    // Custom endpoints (MinIO and friends) need path-style addressing.
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(settings.endpoint.is_some())
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);
    Arc::new(S3ObjectStore::new(s3_client, settings.region.clone()))
}
