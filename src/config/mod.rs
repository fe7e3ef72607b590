use crate::error::ConfigError;
use std::env;

/// Largest batch a single receive may request.
pub const MAX_BATCH_SIZE: i32 = 32;

/// Pipeline configuration shared by the producer and consumer sweeps
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Opaque connection string for the object store and queue (default: empty)
    pub connection: String,

    /// Queue carrying reference records (default: "image-jobs")
    pub queue_name: String,

    /// Container holding staged uploads (default: "image-staging")
    pub staging_container: String,

    /// Container receiving resized results (default: "image-results")
    pub result_container: String,

    /// Smallest accepted file in bytes (default: 1)
    pub min_file_size: u64,

    /// Largest accepted file in bytes (default: 50 MB)
    pub max_file_size: u64,

    /// Messages requested per receive (default: 32)
    pub batch_size: i32,

    /// Lease duration for received messages in seconds (default: 300)
    pub lease_seconds: i32,

    /// Deliveries after which an unparseable message is discarded (default: 5)
    pub max_delivery_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            connection: String::new(),
            queue_name: "image-jobs".to_string(),
            staging_container: "image-staging".to_string(),
            result_container: "image-results".to_string(),
            min_file_size: 1,
            max_file_size: 50 * 1024 * 1024, // 50 MB
            batch_size: MAX_BATCH_SIZE,
            lease_seconds: 300,
            max_delivery_attempts: 5,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            connection: env::var("PIPELINE_CONNECTION").unwrap_or(default.connection),

            queue_name: env::var("PIPELINE_QUEUE_NAME").unwrap_or(default.queue_name),

            staging_container: env::var("PIPELINE_STAGING_CONTAINER")
                .unwrap_or(default.staging_container),

            result_container: env::var("PIPELINE_RESULT_CONTAINER")
                .unwrap_or(default.result_container),

            min_file_size: env::var("PIPELINE_MIN_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.min_file_size),

            max_file_size: env::var("PIPELINE_MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            batch_size: env::var("PIPELINE_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse::<i32>().ok())
                .map(|v| v.clamp(1, MAX_BATCH_SIZE))
                .unwrap_or(default.batch_size),

            lease_seconds: env::var("PIPELINE_LEASE_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.lease_seconds),

            max_delivery_attempts: env::var("PIPELINE_MAX_DELIVERY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_delivery_attempts),
        }
    }

    /// Config for tests and local runs against in-memory collaborators
    pub fn development() -> Self {
        Self {
            connection: "AccessKey=dev;SecretKey=dev".to_string(),
            ..Self::default()
        }
    }

    /// Checks everything a sweep relies on before any item is touched.
    pub fn validate(&self) -> Result<ConnectionSettings, ConfigError> {
        if self.connection.trim().is_empty() {
            return Err(ConfigError::Missing("PIPELINE_CONNECTION"));
        }
        if self.queue_name.trim().is_empty() {
            return Err(ConfigError::Missing("PIPELINE_QUEUE_NAME"));
        }
        if self.staging_container.trim().is_empty() {
            return Err(ConfigError::Missing("PIPELINE_STAGING_CONTAINER"));
        }
        if self.result_container.trim().is_empty() {
            return Err(ConfigError::Missing("PIPELINE_RESULT_CONTAINER"));
        }
        if self.min_file_size > self.max_file_size {
            return Err(ConfigError::Invalid(format!(
                "min file size {} exceeds max file size {}",
                self.min_file_size, self.max_file_size
            )));
        }
        if self.lease_seconds <= 0 {
            return Err(ConfigError::Invalid(
                "lease seconds must be positive".to_string(),
            ));
        }
        if self.max_delivery_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max delivery attempts must be at least 1".to_string(),
            ));
        }
        ConnectionSettings::parse(&self.connection)
    }
}

/// Parsed form of the `Key=Value;` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl ConnectionSettings {
    pub fn parse(connection: &str) -> Result<Self, ConfigError> {
        let mut endpoint = None;
        let mut access_key = None;
        let mut secret_key = None;
        let mut region = None;

        for part in connection.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                ConfigError::Invalid(format!("connection segment '{}' is not Key=Value", part))
            })?;
            let value = value.trim().to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value),
                "accesskey" => access_key = Some(value),
                "secretkey" => secret_key = Some(value),
                "region" => region = Some(value),
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "unknown connection key '{}'",
                        other
                    )));
                }
            }
        }

        Ok(Self {
            endpoint: endpoint.filter(|e| !e.is_empty()),
            access_key: access_key
                .filter(|k| !k.is_empty())
                .ok_or(ConfigError::Missing("AccessKey"))?,
            secret_key: secret_key
                .filter(|k| !k.is_empty())
                .ok_or(ConfigError::Missing("SecretKey"))?,
            region: region
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "us-east-1".to_string()),
        })
    }
}
