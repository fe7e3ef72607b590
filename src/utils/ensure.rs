use anyhow::Result;
use dashmap::{DashMap, DashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Remembers which containers/queues have already been created so the
/// idempotent create call runs at most once per name per process.
#[derive(Debug, Default)]
pub struct EnsureGuard {
    ensured: DashSet<String>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl EnsureGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ensured(&self, name: &str) -> bool {
        self.ensured.contains(name)
    }

    /// Runs `create` unless `name` was already ensured. A failed create leaves
    /// the name unmarked so the next caller retries.
    pub async fn ensure<F, Fut>(&self, name: &str, create: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.is_ensured(name) {
            return Ok(());
        }

        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let _guard = lock.lock().await;

        // Another task may have finished while we waited.
        if self.is_ensured(name) {
            return Ok(());
        }

        create().await?;
        self.ensured.insert(name.to_string());
        Ok(())
    }
}
