use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::models::{ItemOutcome, ItemReport, ReferenceRecord, RunResult, WorkItem};
use crate::services::queue::QueueService;
use crate::services::storage::ObjectStore;
use crate::utils::ensure::EnsureGuard;
use crate::utils::naming::staged_object_name;
use crate::utils::validation::{NamePatterns, validate_work_item};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// What the producer decided for one candidate file, before any side effect.
#[derive(Debug, Clone)]
pub enum ProducerDecision {
    Skip { reason: String },
    Fail { error: String },
    Enqueue {
        item: WorkItem,
        record: ReferenceRecord,
        body: String,
    },
}

/// Uploads local files to staging and enqueues a reference to each.
pub struct Producer {
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn QueueService>,
    config: PipelineConfig,
    ensured: EnsureGuard,
}

impl Producer {
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

    /// One sweep over `source_dir`. Only cancellation, an unreadable source
    /// directory, or a failure to prepare the staging container/queue end the
    /// sweep early; per-file problems are recorded in the result.
    pub async fn run(
        &self,
        source_dir: &Path,
        patterns: &NamePatterns,
        simulate: bool,
        cancel: &watch::Receiver<bool>,
    ) -> Result<RunResult, PipelineError> {
        let candidates = list_candidates(source_dir, patterns).await?;
        info!(
            "📂 Found {} candidate file(s) in {}{}",
            candidates.len(),
            source_dir.display(),
            if simulate { " [simulate]" } else { "" }
        );

        let mut reports = Vec::with_capacity(candidates.len());
        for path in candidates {
            if *cancel.borrow() {
                warn!(
                    "🛑 Producer cancelled after {} file(s)",
                    reports.len()
                );
                return Err(PipelineError::Cancelled);
            }

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            let decision = self.decide(&path).await;
            let outcome = if simulate {
                simulated_outcome(&name, &decision)
            } else {
                // Nothing is created until there is something to stage.
                if matches!(decision, ProducerDecision::Enqueue { .. }) {
                    self.prepare().await?;
                }
                self.execute(&name, decision).await
            };
            reports.push(ItemReport::new(name, outcome));
        }

        let result = RunResult::from_reports(reports);
        info!(
            "✅ Producer finished: processed={}, succeeded={}, skipped={}, failed={}",
            result.processed, result.succeeded, result.skipped, result.failed
        );
        Ok(result)
    }

    async fn prepare(&self) -> Result<(), PipelineError> {
        let container = self.config.staging_container.as_str();
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

    /// Validation and naming only; reads metadata but changes nothing.
    pub async fn decide(&self, path: &Path) -> ProducerDecision {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Some(meta.len()),
            Ok(_) => None,
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                return ProducerDecision::Fail {
                    error: PipelineError::Io(e).to_string(),
                };
            }
        };

        let item = match validate_work_item(
            path,
            size,
            self.config.min_file_size,
            self.config.max_file_size,
        ) {
            Ok(item) => item,
            Err(e) => {
                return ProducerDecision::Skip {
                    reason: e.to_string(),
                };
            }
        };

        let record = ReferenceRecord::for_item(&item, staged_object_name(&item.file_name));
        match record.to_json() {
            Ok(body) => ProducerDecision::Enqueue { item, record, body },
            Err(e) => ProducerDecision::Fail {
                error: PipelineError::Unexpected(e.to_string()).to_string(),
            },
        }
    }

    /// Upload, then enqueue, then delete the local file. Each step runs only
    /// after the previous one succeeded.
    async fn execute(&self, name: &str, decision: ProducerDecision) -> ItemOutcome {
        let (item, record, body) = match decision {
            ProducerDecision::Skip { reason } => {
                info!("⏭️  Skipping {}: {}", name, reason);
                return ItemOutcome::Skipped { reason };
            }
            ProducerDecision::Fail { error } => {
                error!("❌ Failed to inspect {}: {}", name, error);
                return ItemOutcome::Failed { error };
            }
            ProducerDecision::Enqueue { item, record, body } => (item, record, body),
        };

        let data = match tokio::fs::read(&item.path).await {
            Ok(data) => Bytes::from(data),
            Err(e) => return failed(name, "read", PipelineError::Io(e)),
        };

        if let Err(e) = self
            .store
            .put(
                &self.config.staging_container,
                &record.staged_object_name,
                data,
                item.content_kind.mime_type(),
            )
            .await
        {
            return failed(name, "upload", PipelineError::Service(e));
        }

        if let Err(e) = self.queue.send(&self.config.queue_name, &body).await {
            warn!(
                "⚠️  Staged object '{}/{}' is orphaned: enqueue failed, local file kept",
                self.config.staging_container, record.staged_object_name
            );
            return failed(name, "enqueue", PipelineError::Service(e));
        }

        if let Err(e) = tokio::fs::remove_file(&item.path).await {
            // Already enqueued; the consumer will still process it.
            return failed(name, "delete local file", PipelineError::Io(e));
        }

        info!(
            "📤 Enqueued {} as '{}' ({} bytes, {})",
            name, record.staged_object_name, item.size_bytes, item.content_kind
        );
        ItemOutcome::Succeeded
    }
}

fn failed(name: &str, step: &str, e: PipelineError) -> ItemOutcome {
    error!("❌ {} failed for {}: {}", step, name, e);
    ItemOutcome::Failed {
        error: format!("{} failed: {}", step, e),
    }
}

fn simulated_outcome(name: &str, decision: &ProducerDecision) -> ItemOutcome {
    match decision {
        ProducerDecision::Skip { reason } => {
            info!("[simulate] would skip {}: {}", name, reason);
            ItemOutcome::Skipped {
                reason: reason.clone(),
            }
        }
        ProducerDecision::Fail { error } => {
            info!("[simulate] would fail {}: {}", name, error);
            ItemOutcome::Failed {
                error: error.clone(),
            }
        }
        ProducerDecision::Enqueue { item, record, .. } => {
            info!(
                "[simulate] would upload {} ({} bytes, {}) as '{}', enqueue it and delete the local file",
                name, item.size_bytes, item.content_kind, record.staged_object_name
            );
            ItemOutcome::Succeeded
        }
    }
}

/// Regular files directly inside `source_dir` whose names match, in name order.
pub async fn list_candidates(
    source_dir: &Path,
    patterns: &NamePatterns,
) -> Result<Vec<PathBuf>, PipelineError> {
    let mut entries = tokio::fs::read_dir(source_dir).await?;
    let mut candidates = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        if !file_type.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        if patterns.matches(&file_name.to_string_lossy()) {
            candidates.push(entry.path());
        }
    }

    candidates.sort();
    Ok(candidates)
}
