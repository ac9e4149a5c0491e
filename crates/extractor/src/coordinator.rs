use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use common::{
    ErrorKind, ExtractionRequest, ExtractionResult, ExtractionSettings, ShardError, ShardResult,
    ShardTask,
};

use crate::collector;
use crate::invoker::ShardInvoker;
use crate::sharding::plan_shards;

/// Splits a request into shards, runs them through a `ShardInvoker` under a
/// concurrency bound and a global deadline, and hands the results to the
/// collector.
pub struct Coordinator {
    invoker: Arc<dyn ShardInvoker>,
    settings: ExtractionSettings,
}

impl Coordinator {
    pub fn new(invoker: Arc<dyn ShardInvoker>, settings: ExtractionSettings) -> Self {
        Self { invoker, settings }
    }

    /// Run a whole extraction. Always returns a well-formed result; shard
    /// failures show up in its status and error list.
    pub async fn extract(&self, request: &ExtractionRequest) -> ExtractionResult {
        let request_id = Uuid::new_v4();
        let shards = plan_shards(request, self.settings.max_window_span_ms);
        info!(
            %request_id,
            invoker = self.invoker.name(),
            symbols = request.symbols().len(),
            shards = shards.len(),
            "Extraction started"
        );

        let result = collector::merge(self.run_shards(shards).await);

        info!(
            %request_id,
            status = %result.status,
            total_orders = result.total_orders,
            failed_shards = result.errors.len(),
            duration_ms = result.duration.as_millis() as u64,
            "Extraction finished"
        );
        result
    }

    /// Dispatch every shard concurrently and gather exactly one result per
    /// shard. Shards still running at the deadline are aborted and reported
    /// as timed out.
    pub async fn run_shards(&self, shards: Vec<ShardTask>) -> Vec<ShardResult> {
        let deadline = Instant::now() + self.settings.deadline();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let dispatched_at = Utc::now();

        let mut pending: BTreeMap<String, ShardTask> = BTreeMap::new();
        let mut join_set = JoinSet::new();
        for task in shards {
            pending.insert(task.id.clone(), task.clone());
            join_set.spawn(run_one(self.invoker.clone(), semaphore.clone(), task));
        }

        let mut results = Vec::with_capacity(pending.len());
        let mut timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok(result))) => {
                    if pending.remove(&result.shard_id).is_some() {
                        results.push(result);
                    } else {
                        warn!(shard = %result.shard_id, "Dropping result for unknown shard");
                    }
                }
                Ok(Some(Err(e))) => {
                    // run_one contains invoker panics; the shard stays pending and is reported below.
                    error!(error = %e, "Shard supervisor task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    warn!(outstanding = join_set.len(), "Global deadline exceeded, abandoning shards");
                    join_set.abort_all();
                    break;
                }
            }
        }

        let now = Utc::now();
        for task in pending.into_values() {
            let error = if timed_out {
                ShardError::timeout()
            } else {
                ShardError::new(ErrorKind::Internal, "shard task ended without a result")
            };
            results.push(ShardResult::failed(&task, error, dispatched_at, now));
        }
        results
    }
}

/// Aborts the wrapped task when dropped, so abandoning a shard also stops its work.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_one(
    invoker: Arc<dyn ShardInvoker>,
    semaphore: Arc<Semaphore>,
    task: ShardTask,
) -> ShardResult {
    let _permit = semaphore.acquire_owned().await;
    let started_at = Utc::now();

    // Invoke on an inner task so a panicking invoker is contained to this shard.
    let inner_task = task.clone();
    let mut inner = AbortOnDrop(tokio::spawn(async move { invoker.invoke(inner_task).await }));

    let mut result = match (&mut inner.0).await {
        Ok(result) => result,
        Err(e) => {
            let msg = if e.is_panic() {
                let payload = e.into_panic();
                if let Some(s) = payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                }
            } else {
                e.to_string()
            };
            error!(shard = %task.id, panic_msg = %msg, "Shard invoker panicked");
            ShardResult::failed(
                &task,
                ShardError::new(ErrorKind::Internal, format!("worker panicked: {msg}")),
                started_at,
                Utc::now(),
            )
        }
    };

    // Timings are taken on the coordinator's clock.
    result.started_at = started_at;
    result.finished_at = Utc::now();
    result
}
