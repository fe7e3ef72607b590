use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};
use dashmap::{DashMap, DashSet};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// A message claimed by the current receiver until its lease expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedMessage {
    pub message_id: String,
    pub body: String,
    /// Valid only for this delivery; redelivery produces a new handle.
    pub lease_handle: String,
    pub delivery_count: u32,
}

/// A message read without claiming it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeekedMessage {
    pub message_id: String,
    pub body: String,
    pub delivery_count: u32,
}

/// A durable named queue with lease-based delivery.
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Creates the queue if missing. Must tolerate it already existing.
    async fn ensure_queue(&self, queue: &str) -> Result<()>;
    async fn send(&self, queue: &str, body: &str) -> Result<()>;
    async fn receive_leased(
        &self,
        queue: &str,
        max_count: i32,
        lease: Duration,
    ) -> Result<Vec<LeasedMessage>>;
    /// Reads visible messages without leasing them.
    async fn peek_visible(&self, queue: &str, max_count: i32) -> Result<Vec<PeekedMessage>>;
    async fn delete_leased(&self, queue: &str, lease_handle: &str) -> Result<()>;
}

pub struct SqsQueueService {
    client: Client,
    queue_urls: DashMap<String, String>,
}

impl SqsQueueService {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            queue_urls: DashMap::new(),
        }
    }

    async fn queue_url(&self, queue: &str) -> Result<String> {
        if let Some(url) = self.queue_urls.get(queue) {
            return Ok(url.clone());
        }
        let res = self.client.get_queue_url().queue_name(queue).send().await?;
        let url = res
            .queue_url
            .ok_or_else(|| anyhow!("No URL returned for queue '{}'", queue))?;
        self.queue_urls.insert(queue.to_string(), url.clone());
        Ok(url)
    }

    fn delivery_count(message: &Message) -> u32 {
        message
            .attributes
            .as_ref()
            .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }

    async fn receive(
        &self,
        queue: &str,
        max_count: i32,
        visibility_timeout: i32,
    ) -> Result<Vec<Message>> {
        let url = self.queue_url(queue).await?;
        let res = self
            .client
            .receive_message()
            .queue_url(url)
            .max_number_of_messages(max_count.clamp(1, 10))
            .visibility_timeout(visibility_timeout)
            .wait_time_seconds(1)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await?;
        Ok(res.messages.unwrap_or_default())
    }
}

#[async_trait]
impl QueueService for SqsQueueService {
    async fn ensure_queue(&self, queue: &str) -> Result<()> {
        if self.queue_urls.contains_key(queue) {
            return Ok(());
        }
        // CreateQueue returns the existing URL when the queue already exists.
        let res = self.client.create_queue().queue_name(queue).send().await?;
        let url = res
            .queue_url
            .ok_or_else(|| anyhow!("No URL returned for queue '{}'", queue))?;
        tracing::info!("📬 Queue '{}' is ready", queue);
        self.queue_urls.insert(queue.to_string(), url);
        Ok(())
    }

    async fn send(&self, queue: &str, body: &str) -> Result<()> {
        let url = self.queue_url(queue).await?;
        self.client
            .send_message()
            .queue_url(url)
            .message_body(body)
            .send()
            .await?;
        Ok(())
    }

    async fn receive_leased(
        &self,
        queue: &str,
        max_count: i32,
        lease: Duration,
    ) -> Result<Vec<LeasedMessage>> {
        let lease_seconds = i32::try_from(lease.as_secs()).unwrap_or(i32::MAX).max(1);
        let messages = self.receive(queue, max_count, lease_seconds).await?;

        messages
            .into_iter()
            .map(|m| -> Result<LeasedMessage> {
                let delivery_count = Self::delivery_count(&m);
                Ok(LeasedMessage {
                    message_id: m.message_id.unwrap_or_default(),
                    body: m.body.unwrap_or_default(),
                    lease_handle: m
                        .receipt_handle
                        .ok_or_else(|| anyhow!("Received message without receipt handle"))?,
                    delivery_count,
                })
            })
            .collect()
    }

    async fn peek_visible(&self, queue: &str, max_count: i32) -> Result<Vec<PeekedMessage>> {
        // A zero visibility timeout leaves the message visible to other receivers.
        let messages = self.receive(queue, max_count, 0).await?;
        Ok(messages
            .into_iter()
            .map(|m| PeekedMessage {
                // The peek itself counted as a receive.
                delivery_count: Self::delivery_count(&m).saturating_sub(1),
                message_id: m.message_id.unwrap_or_default(),
                body: m.body.unwrap_or_default(),
            })
            .collect())
    }

    async fn delete_leased(&self, queue: &str, lease_handle: &str) -> Result<()> {
        let url = self.queue_url(queue).await?;
        self.client
            .delete_message()
            .queue_url(url)
            .receipt_handle(lease_handle)
            .send()
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    message_id: String,
    body: String,
    delivery_count: u32,
    lease: Option<(String, Instant)>,
}

impl QueuedMessage {
    fn is_visible(&self, now: Instant) -> bool {
        match &self.lease {
            Some((_, until)) => *until <= now,
            None => true,
        }
    }
}

/// Process-local queue for tests and local runs. Leases expire on the tokio
/// clock, so paused-time tests can advance past them.
#[derive(Debug, Default)]
pub struct MemoryQueueService {
    queues: Mutex<HashMap<String, Vec<QueuedMessage>>>,
    failing: DashSet<String>,
}

impl MemoryQueueService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `op` ("send", "receive", "peek", "delete") fail on every queue.
    pub fn fail_on(&self, op: &str) {
        self.failing.insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.clear();
    }

    pub fn queue_exists(&self, queue: &str) -> bool {
        self.lock().contains_key(queue)
    }

    /// Number of messages in the queue, leased or not.
    pub fn len(&self, queue: &str) -> usize {
        self.lock().get(queue).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    pub fn bodies(&self, queue: &str) -> Vec<String> {
        self.lock()
            .get(queue)
            .map(|msgs| msgs.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Ends every lease on the queue, as if each one had timed out.
    pub fn expire_leases(&self, queue: &str) {
        if let Some(msgs) = self.lock().get_mut(queue) {
            for msg in msgs.iter_mut() {
                msg.lease = None;
            }
        }
    }

    /// Message ids and bodies of every queue, for before/after comparisons.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<(String, String)>> {
        self.lock()
            .iter()
            .map(|(name, msgs)| {
                (
                    name.clone(),
                    msgs.iter()
                        .map(|m| (m.message_id.clone(), m.body.clone()))
                        .collect(),
                )
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<QueuedMessage>>> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, op: &str) -> Result<()> {
        if self.failing.contains(op) {
            return Err(anyhow!("injected {} failure", op));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueService for MemoryQueueService {
    async fn ensure_queue(&self, queue: &str) -> Result<()> {
        self.lock().entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn send(&self, queue: &str, body: &str) -> Result<()> {
        self.check("send")?;
        let mut queues = self.lock();
        let msgs = queues
            .get_mut(queue)
            .ok_or_else(|| anyhow!("Queue '{}' does not exist", queue))?;
        msgs.push(QueuedMessage {
            message_id: Uuid::new_v4().to_string(),
            body: body.to_string(),
            delivery_count: 0,
            lease: None,
        });
        Ok(())
    }

    async fn receive_leased(
        &self,
        queue: &str,
        max_count: i32,
        lease: Duration,
    ) -> Result<Vec<LeasedMessage>> {
        self.check("receive")?;
        let now = Instant::now();
        let mut queues = self.lock();
        let msgs = queues
            .get_mut(queue)
            .ok_or_else(|| anyhow!("Queue '{}' does not exist", queue))?;

        let mut received = Vec::new();
        for msg in msgs.iter_mut().filter(|m| m.is_visible(now)) {
            if received.len() >= max_count.max(0) as usize {
                break;
            }
            let handle = Uuid::new_v4().to_string();
            msg.delivery_count += 1;
            msg.lease = Some((handle.clone(), now + lease));
            received.push(LeasedMessage {
                message_id: msg.message_id.clone(),
                body: msg.body.clone(),
                lease_handle: handle,
                delivery_count: msg.delivery_count,
            });
        }
        Ok(received)
    }

    async fn peek_visible(&self, queue: &str, max_count: i32) -> Result<Vec<PeekedMessage>> {
        self.check("peek")?;
        let now = Instant::now();
        let queues = self.lock();
        let msgs = queues
            .get(queue)
            .ok_or_else(|| anyhow!("Queue '{}' does not exist", queue))?;
        Ok(msgs
            .iter()
            .filter(|m| m.is_visible(now))
            .take(max_count.max(0) as usize)
            .map(|m| PeekedMessage {
                message_id: m.message_id.clone(),
                body: m.body.clone(),
                delivery_count: m.delivery_count,
            })
            .collect())
    }

    async fn delete_leased(&self, queue: &str, lease_handle: &str) -> Result<()> {
        self.check("delete")?;
        let now = Instant::now();
        let mut queues = self.lock();
        let msgs = queues
            .get_mut(queue)
            .ok_or_else(|| anyhow!("Queue '{}' does not exist", queue))?;
        let position = msgs
            .iter()
            .position(|m| {
                matches!(&m.lease, Some((handle, until)) if handle == lease_handle && *until > now)
            })
            .ok_or_else(|| anyhow!("Lease handle is not valid for queue '{}'", queue))?;
        msgs.remove(position);
        Ok(())
    }
}
