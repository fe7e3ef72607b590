use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeMap;

/// Named binary blobs in named containers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates the container if missing. Must tolerate it already existing.
    async fn ensure_container(&self, container: &str) -> Result<()>;
    async fn put(&self, container: &str, name: &str, data: Bytes, content_type: &str)
    -> Result<()>;
    async fn get(&self, container: &str, name: &str) -> Result<Bytes>;
    async fn exists(&self, container: &str, name: &str) -> Result<bool>;
    async fn delete(&self, container: &str, name: &str) -> Result<()>;
}

pub struct S3ObjectStore {
    client: Client,
    region: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, region: String) -> Self {
        Self { client, region }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_container(&self, container: &str) -> Result<()> {
        if self.client.head_bucket().bucket(container).send().await.is_ok() {
            return Ok(());
        }

        tracing::info!("🪣 Bucket '{}' not found, creating...", container);
        let mut request = self.client.create_bucket().bucket(container);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                tracing::info!("✅ Bucket '{}' created successfully", container);
                Ok(())
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_bucket_already_owned_by_you()
                    || service_error.is_bucket_already_exists()
                {
                    Ok(())
                } else {
                    Err(anyhow!(service_error))
                }
            }
        }
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(container)
            .key(name)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await?;
        Ok(())
    }

    async fn get(&self, container: &str, name: &str) -> Result<Bytes> {
        let res = self
            .client
            .get_object()
            .bucket(container)
            .key(name)
            .send()
            .await?;
        let data = res.body.collect().await?.into_bytes();
        Ok(data)
    }

    async fn exists(&self, container: &str, name: &str) -> Result<bool> {
        let res = self
            .client
            .head_object()
            .bucket(container)
            .key(name)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow!(service_error))
                }
            }
        }
    }

    async fn delete(&self, container: &str, name: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(container)
            .key(name)
            .send()
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
}

/// Process-local object store for tests and local runs.
///
/// Operations can be made to fail per container with [`MemoryObjectStore::fail_on`].
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    containers: DashMap<String, BTreeMap<String, StoredObject>>,
    failing: DashSet<String>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `op` ("put", "get", "exists", "delete") fail for `container`.
    pub fn fail_on(&self, op: &str, container: &str) {
        self.failing.insert(format!("{}:{}", op, container));
    }

    pub fn clear_failures(&self) {
        self.failing.clear();
    }

    pub fn container_exists(&self, container: &str) -> bool {
        self.containers.contains_key(container)
    }

    /// Object names in `container`, sorted.
    pub fn list(&self, container: &str) -> Vec<String> {
        self.containers
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(&self, container: &str, name: &str) -> Option<StoredObject> {
        self.containers
            .get(container)
            .and_then(|objects| objects.get(name).cloned())
    }

    /// Full copy of every container, for before/after comparisons.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, StoredObject>> {
        self.containers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn check(&self, op: &str, container: &str) -> Result<()> {
        if self.failing.contains(&format!("{}:{}", op, container)) {
            return Err(anyhow!("injected {} failure for container '{}'", op, container));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn ensure_container(&self, container: &str) -> Result<()> {
        self.containers.entry(container.to_string()).or_default();
        Ok(())
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<()> {
        self.check("put", container)?;
        let mut objects = self
            .containers
            .get_mut(container)
            .ok_or_else(|| anyhow!("Container '{}' does not exist", container))?;
        objects.insert(
            name.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, container: &str, name: &str) -> Result<Bytes> {
        self.check("get", container)?;
        self.object(container, name)
            .map(|o| o.data)
            .ok_or_else(|| anyhow!("Object '{}/{}' not found", container, name))
    }

    async fn exists(&self, container: &str, name: &str) -> Result<bool> {
        self.check("exists", container)?;
        Ok(self.object(container, name).is_some())
    }

    async fn delete(&self, container: &str, name: &str) -> Result<()> {
        self.check("delete", container)?;
        if let Some(mut objects) = self.containers.get_mut(container) {
            objects.remove(name);
        }
        Ok(())
    }
}
