use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::models::{ItemOutcome, ItemReport, ReferenceRecord, RunResult};
use crate::services::queue::QueueService;
use crate::services::storage::ObjectStore;
use crate::services::transform::{TransformOutput, halve_image};
use crate::utils::ensure::EnsureGuard;
use crate::utils::naming::processed_object_name;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// What the consumer decided for one message, before any side effect.
#[derive(Debug)]
pub enum ConsumerDecision {
    /// Body could not be parsed; `discard` once the delivery bound is reached.
    Poison { error: String, discard: bool },
    /// Staged object is gone; the message only needs retiring.
    Orphan { record: ReferenceRecord },
    Fail {
        record: ReferenceRecord,
        error: PipelineError,
    },
    Publish {
        record: ReferenceRecord,
        output_name: String,
        output: TransformOutput,
    },
}

impl ConsumerDecision {
    fn item_name(&self, message_id: &str) -> String {
        match self {
            Self::Poison { .. } => format!("message {}", message_id),
            Self::Orphan { record } | Self::Fail { record, .. } | Self::Publish { record, .. } => {
                record.original_file_name.clone()
            }
        }
    }
}

/// Drains the queue, halves each referenced image and publishes the result.
pub struct Consumer {
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn QueueService>,
    config: PipelineConfig,
    ensured: EnsureGuard,
}

impl Consumer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn QueueService>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            queue,
            config,
            ensured: EnsureGuard::new(),
        }
    }

    pub async fn run(
        &self,
        simulate: bool,
        cancel: &watch::Receiver<bool>,
    ) -> Result<RunResult, PipelineError> {
        if simulate {
            self.preview(cancel).await
        } else {
            self.drain(cancel).await
        }
    }

    /// Leases batches until the queue reports nothing visible.
    async fn drain(&self, cancel: &watch::Receiver<bool>) -> Result<RunResult, PipelineError> {
        self.prepare().await?;

        let lease = Duration::from_secs(self.config.lease_seconds.max(1) as u64);
        let mut reports = Vec::new();
        // Messages that failed in this sweep and were redelivered after a short lease.
        let mut failed_ids: HashSet<String> = HashSet::new();

        loop {
            if *cancel.borrow() {
                warn!("🛑 Consumer cancelled after {} message(s)", reports.len());
                return Err(PipelineError::Cancelled);
            }

            // Room for every already-failed id plus a full batch of new work.
            let failed_count = i32::try_from(failed_ids.len()).unwrap_or(i32::MAX);
            let request = self.config.batch_size.max(1).saturating_add(failed_count);
            let batch = match self
                .queue
                .receive_leased(&self.config.queue_name, request, lease)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    let e = PipelineError::Service(e);
                    error!("❌ Receive from '{}' failed: {}", self.config.queue_name, e);
                    reports.push(ItemReport::new(
                        "queue receive",
                        ItemOutcome::Failed {
                            error: e.to_string(),
                        },
                    ));
                    break;
                }
            };

            // Nothing new despite the headroom: only failed messages are left.
            if batch.iter().all(|m| failed_ids.contains(&m.message_id)) {
                break;
            }
            info!("📥 Leased {} message(s)", batch.len());

            for message in batch {
                if failed_ids.contains(&message.message_id) {
                    continue;
                }
                if *cancel.borrow() {
                    warn!("🛑 Consumer cancelled after {} message(s)", reports.len());
                    return Err(PipelineError::Cancelled);
                }

                let decision = self.decide(&message.body, message.delivery_count).await;
                let name = decision.item_name(&message.message_id);
                let outcome = self.execute(&name, decision, &message.lease_handle).await;
                if matches!(outcome, ItemOutcome::Failed { .. }) {
                    failed_ids.insert(message.message_id.clone());
                }
                reports.push(ItemReport::new(name, outcome));
            }
        }

        let result = RunResult::from_reports(reports);
        info!(
            "✅ Consumer finished: processed={}, succeeded={}, skipped={}, failed={}",
            result.processed, result.succeeded, result.skipped, result.failed
        );
        Ok(result)
    }

    /// One non-leasing batch; nothing is uploaded or deleted.
    async fn preview(&self, cancel: &watch::Receiver<bool>) -> Result<RunResult, PipelineError> {
        let batch = self
            .queue
            .peek_visible(&self.config.queue_name, self.config.batch_size)
            .await?;
        info!("[simulate] peeked {} message(s)", batch.len());

        let mut reports = Vec::with_capacity(batch.len());
        for message in batch {
            if *cancel.borrow() {
                return Err(PipelineError::Cancelled);
            }
            // Judge against the delivery a real consumer would make next.
            let decision = self.decide(&message.body, message.delivery_count + 1).await;
            let name = decision.item_name(&message.message_id);
            let outcome = simulated_outcome(&name, &decision);
            reports.push(ItemReport::new(name, outcome));
        }

        let result = RunResult::from_reports(reports);
        info!(
            "[simulate] consumer preview: processed={}, succeeded={}, skipped={}, failed={}",
            result.processed, result.succeeded, result.skipped, result.failed
        );
        Ok(result)
    }

    async fn prepare(&self) -> Result<(), PipelineError> {
        let container = self.config.result_container.as_str();
        self.ensured
            .ensure(&format!("container:{}", container), || {
                self.store.ensure_container(container)
            })
            .await?;

        let queue = self.config.queue_name.as_str();
        self.ensured
            .ensure(&format!("queue:{}", queue), || self.queue.ensure_queue(queue))
            .await?;
        Ok(())
    }

    /// Parses, checks and transforms. Reads from the store but never writes.
    pub async fn decide(&self, body: &str, delivery_count: u32) -> ConsumerDecision {
        let record = match ReferenceRecord::from_json(body) {
            Ok(record) => record,
            Err(e) => {
                return ConsumerDecision::Poison {
                    error: PipelineError::InvalidMessage(e.to_string()).to_string(),
                    discard: delivery_count >= self.config.max_delivery_attempts,
                };
            }
        };

        match self.resolve(&record).await {
            Ok(Some((output_name, output))) => ConsumerDecision::Publish {
                record,
                output_name,
                output,
            },
            Ok(None) => ConsumerDecision::Orphan { record },
            Err(error) => ConsumerDecision::Fail { record, error },
        }
    }

    async fn resolve(
        &self,
        record: &ReferenceRecord,
    ) -> Result<Option<(String, TransformOutput)>, PipelineError> {
        let staging = &self.config.staging_container;
        if !self.store.exists(staging, &record.staged_object_name).await? {
            return Ok(None);
        }

        let data = self.store.get(staging, &record.staged_object_name).await?;
        let kind = record.content_kind;
        let output = tokio::task::spawn_blocking(move || halve_image(&data, kind))
            .await
            .map_err(|e| PipelineError::Unexpected(format!("transform task failed: {}", e)))??;

        Ok(Some((
            processed_object_name(&record.original_file_name),
            output,
        )))
    }

    /// Applies a decision: result upload first, then source delete, then
    /// message delete. Failures leave the message leased for redelivery.
    async fn execute(&self, name: &str, decision: ConsumerDecision, lease_handle: &str) -> ItemOutcome {
        let queue = &self.config.queue_name;
        match decision {
            ConsumerDecision::Poison { error, discard } => {
                if discard {
                    let bound = self.config.max_delivery_attempts;
                    match self.queue.delete_leased(queue, lease_handle).await {
                        Ok(()) => error!(
                            "🗑️  Discarded unparseable {} after {} deliveries: {}",
                            name, bound, error
                        ),
                        Err(e) => error!("❌ Could not discard unparseable {}: {}", name, e),
                    }
                    ItemOutcome::Failed {
                        error: format!("discarded after {} deliveries: {}", bound, error),
                    }
                } else {
                    error!("❌ Unparseable {} left for redelivery: {}", name, error);
                    ItemOutcome::Failed { error }
                }
            }
            ConsumerDecision::Orphan { record } => {
                match self.queue.delete_leased(queue, lease_handle).await {
                    Ok(()) => {
                        info!(
                            "👻 Orphaned message for {} ('{}' missing), message deleted",
                            name, record.staged_object_name
                        );
                        ItemOutcome::Orphaned
                    }
                    Err(e) => {
                        let e = PipelineError::Service(e);
                        error!("❌ Could not delete orphaned message for {}: {}", name, e);
                        ItemOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            }
            ConsumerDecision::Fail { error, .. } => {
                error!("❌ Processing {} failed, leaving message for redelivery: {}", name, error);
                ItemOutcome::Failed {
                    error: error.to_string(),
                }
            }
            ConsumerDecision::Publish {
                record,
                output_name,
                output,
            } => {
                if let Err(e) = self
                    .store
                    .put(
                        &self.config.result_container,
                        &output_name,
                        Bytes::from(output.data),
                        record.content_kind.mime_type(),
                    )
                    .await
                {
                    let e = PipelineError::Service(e);
                    error!("❌ Result upload for {} failed: {}", name, e);
                    return ItemOutcome::Failed {
                        error: e.to_string(),
                    };
                }
                info!(
                    "🖼️  Published {} as '{}' ({}x{} -> {}x{})",
                    name,
                    output_name,
                    output.source_width,
                    output.source_height,
                    output.width,
                    output.height
                );

                // The result is durable from here on; cleanup failures are logged only.
                if let Err(e) = self
                    .store
                    .delete(&self.config.staging_container, &record.staged_object_name)
                    .await
                {
                    warn!(
                        "⚠️  Cleanup: could not delete staged object '{}' for {}: {}",
                        record.staged_object_name, name, e
                    );
                }
                if let Err(e) = self.queue.delete_leased(queue, lease_handle).await {
                    warn!("⚠️  Cleanup: could not delete message for {}: {}", name, e);
                }
                ItemOutcome::Succeeded
            }
        }
    }
}

fn simulated_outcome(name: &str, decision: &ConsumerDecision) -> ItemOutcome {
    match decision {
        ConsumerDecision::Poison { error, discard } => {
            if *discard {
                info!("[simulate] would discard unparseable {}: {}", name, error);
            } else {
                info!("[simulate] would leave unparseable {} for redelivery: {}", name, error);
            }
            ItemOutcome::Failed {
                error: error.clone(),
            }
        }
        ConsumerDecision::Orphan { record } => {
            info!(
                "[simulate] {} is orphaned ('{}' missing), would delete message",
                name, record.staged_object_name
            );
            ItemOutcome::Orphaned
        }
        ConsumerDecision::Fail { error, .. } => {
            info!("[simulate] would fail {}: {}", name, error);
            ItemOutcome::Failed {
                error: error.to_string(),
            }
        }
        ConsumerDecision::Publish {
            output_name,
            output,
            ..
        } => {
            info!(
                "[simulate] would publish {} as '{}' at {}x{} and delete its staged object and message",
                name, output_name, output.width, output.height
            );
            ItemOutcome::Succeeded
        }
    }
}
