use crate::config::ConnectionSettings;
use crate::services::queue::SqsQueueService;
use aws_config::SdkConfig;
use std::sync::Arc;
use tracing::info;

pub fn setup_queue(sdk_config: &SdkConfig, settings: &ConnectionSettings) -> Arc<SqsQueueService> {
    info!(
        "📬 SQS Queue: {} (Region: {})",
        settings.endpoint.as_deref().unwrap_or("default endpoint"),
        settings.region
    );

    let sqs_client = aws_sdk_sqs::Client::new(sdk_config);
    Arc::new(SqsQueueService::new(sqs_client))
}
