use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, warn};

use common::{Error, ErrorKind, Result, ShardError, ShardResult, ShardTask};

use crate::worker::Worker;

/// Runs one shard somewhere and returns its result.
///
/// The coordinator does not know or care whether the shard runs in-process
/// or on another machine. Implementations must not fail: every problem is
/// reported as a `Failed` result.
#[async_trait]
pub trait ShardInvoker: Send + Sync {
    async fn invoke(&self, task: ShardTask) -> ShardResult;

    fn name(&self) -> &'static str;
}

/// Runs shards on the local tokio runtime.
pub struct LocalInvoker {
    worker: Worker,
}

impl LocalInvoker {
    pub fn new(worker: Worker) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl ShardInvoker for LocalInvoker {
    async fn invoke(&self, task: ShardTask) -> ShardResult {
        self.worker.run(task).await
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Sends each shard to a remote worker's `POST /shard` endpoint.
pub struct RemoteInvoker {
    http: Client,
    endpoint: String,
}

impl RemoteInvoker {
    /// `base_url` is the worker service root, e.g. `http://worker:8000`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/shard", base_url.trim_end_matches('/')),
        })
    }

    async fn call(&self, task: &ShardTask) -> std::result::Result<ShardResult, String> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(task)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("remote worker returned HTTP {status}: {body}"));
        }
        resp.json::<ShardResult>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ShardInvoker for RemoteInvoker {
    async fn invoke(&self, task: ShardTask) -> ShardResult {
        let started_at = Utc::now();
        debug!(shard = %task.id, endpoint = %self.endpoint, "Invoking remote worker");
        match self.call(&task).await {
            Ok(result) if result.shard_id == task.id => result,
            Ok(result) => {
                warn!(shard = %task.id, got = %result.shard_id, "Remote worker answered for a different shard");
                ShardResult::failed(
                    &task,
                    ShardError::new(ErrorKind::Internal, format!("mismatched shard id '{}'", result.shard_id)),
                    started_at,
                    Utc::now(),
                )
            }
            Err(e) => {
                warn!(shard = %task.id, error = %e, "Remote invocation failed");
                ShardResult::failed(
                    &task,
                    ShardError::new(ErrorKind::Transient, e),
                    started_at,
                    Utc::now(),
                )
            }
        }
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
