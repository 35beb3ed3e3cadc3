//! Concurrent batch driver.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::sink::GraphSink;
use crate::config::BatchConfig;
use crate::error::{ErrorCode, KgError, KgResult};

/// Processes one work item end to end.
#[async_trait]
pub trait BatchWorker: Send + Sync {
    async fn process(&self, id: &str) -> KgResult<()>;
}

/// A work item that did not complete.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub id: String,
    pub kind: ErrorCode,
    pub message: String,
}

impl BatchFailure {
    fn from_error(id: &str, err: &KgError) -> Self {
        Self {
            id: id.to_string(),
            kind: err.code(),
            message: err.to_string(),
        }
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Distinct identifiers submitted.
    pub total: usize,
    /// Identifiers whose output already existed.
    pub skipped: usize,
    pub completed: usize,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.id.as_str()).collect()
    }

    /// One-line summary of the run.
    pub fn summary(&self) -> String {
        let elapsed = self.finished_at - self.started_at;
        let mut summary = format!(
            "run {}: {} total, {} skipped, {} completed, {} failed in {:.1}s",
            self.run_id,
            self.total,
            self.skipped,
            self.completed,
            self.failed.len(),
            elapsed.num_milliseconds() as f64 / 1000.0
        );
        if !self.failed.is_empty() {
            let failed: Vec<String> = self
                .failed
                .iter()
                .map(|f| format!("{} ({})", f.id, f.kind))
                .collect();
            summary.push_str(&format!(" [failed: {}]", failed.join(", ")));
        }
        summary
    }
}

type ItemOutcome = (String, Result<(), BatchFailure>);

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Runs a [`BatchWorker`] over many identifiers with bounded parallelism.
///
/// Items already present in the sink are skipped. Each item runs in its own
/// task, so an error or panic is recorded against its identifier and never
/// stops the pool. Completion order is unspecified.
pub struct BatchRunner {
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub async fn run(
        &self,
        ids: Vec<String>,
        sink: &dyn GraphSink,
        worker: Arc<dyn BatchWorker>,
    ) -> KgResult<BatchReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let mut seen = HashSet::new();
        let ids: Vec<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        let total = ids.len();

        let mut skipped = 0;
        let mut failed = Vec::new();
        let mut pending = Vec::new();
        for id in ids {
            if !self.config.skip_existing {
                pending.push(id);
                continue;
            }
            match sink.exists(&id).await {
                Ok(true) => {
                    debug!(id = %id, "Output exists, skipping");
                    skipped += 1;
                }
                Ok(false) => pending.push(id),
                Err(e) => {
                    error!(id = %id, error = %e, "Cannot check output");
                    failed.push(BatchFailure::from_error(&id, &e));
                }
            }
        }

        let dispatched = pending.len();
        let workers = self.config.concurrency.max(1).min(dispatched);
        info!(
            run_id = %run_id,
            total,
            skipped,
            dispatched,
            workers,
            "Starting batch run"
        );

        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<String>();
        for id in pending {
            // The receiver is alive until the workers are spawned below.
            let _ = queue_tx.send(id);
        }
        drop(queue_tx);
        let queue = Arc::new(Mutex::new(queue_rx));

        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ItemOutcome>();
        let mut handles = Vec::with_capacity(workers);
        for slot in 0..workers {
            let queue = queue.clone();
            let results = result_tx.clone();
            let worker = worker.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some(id) = next else { break };

                    let item_worker = worker.clone();
                    let item_id = id.clone();
                    let outcome =
                        match tokio::spawn(async move { item_worker.process(&item_id).await }).await {
                            Ok(Ok(())) => Ok(()),
                            Ok(Err(e)) => Err(BatchFailure::from_error(&id, &e)),
                            Err(join_err) => Err(BatchFailure {
                                id: id.clone(),
                                kind: ErrorCode::Panic,
                                message: if join_err.is_panic() {
                                    panic_message(join_err.into_panic())
                                } else {
                                    "task cancelled".to_string()
                                },
                            }),
                        };

                    if results.send((id, outcome)).is_err() {
                        break;
                    }
                }
                debug!(worker = slot, "Worker finished");
            }));
        }
        drop(result_tx);

        let mut completed = 0;
        let mut done = 0;
        while let Some((id, outcome)) = result_rx.recv().await {
            done += 1;
            match outcome {
                Ok(()) => {
                    completed += 1;
                    info!(run_id = %run_id, id = %id, "[{}/{}] completed", done, dispatched);
                }
                Err(failure) => {
                    error!(
                        run_id = %run_id,
                        id = %id,
                        kind = %failure.kind,
                        error = %failure.message,
                        "[{}/{}] failed",
                        done,
                        dispatched
                    );
                    failed.push(failure);
                }
            }
        }

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }

        let report = BatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            total,
            skipped,
            completed,
            failed,
        };
        info!("{}", report.summary());
        Ok(report)
    }
}
