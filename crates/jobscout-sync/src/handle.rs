use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use crate::{RunSummary, ScoutPipeline};

#[derive(Debug, Clone)]
pub enum RunStatus {
    Pending,
    Running {
        current_source: String,
        completed: usize,
        total: usize,
    },
    Completed(RunSummary),
    Failed(String),
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Completed(_) | RunStatus::Failed(_))
    }
}

/// A run on its own tokio task. The task is the only writer of the status channel.
pub struct RunHandle {
    status: watch::Receiver<RunStatus>,
    task: JoinHandle<()>,
}

impl RunHandle {
    pub fn spawn(pipeline: Arc<ScoutPipeline>) -> Self {
        let (tx, rx) = watch::channel(RunStatus::Pending);
        let task = tokio::spawn(async move {
            let outcome = pipeline.run_reporting(Some(&tx)).await;
            let final_status = match outcome {
                Ok(summary) => RunStatus::Completed(summary),
                Err(err) => {
                    let message = format!("{err:#}");
                    error!(error = %message, "scrape run failed");
                    RunStatus::Failed(message)
                }
            };
            tx.send_replace(final_status);
        });
        Self { status: rx, task }
    }

    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.clone()
    }

    /// Resolves once the run has completed or failed.
    pub async fn wait(mut self) -> RunStatus {
        loop {
            let current = self.status.borrow_and_update().clone();
            if current.is_finished() {
                return current;
            }
            if self.status.changed().await.is_err() {
                break;
            }
        }
        let last = self.status.borrow().clone();
        if last.is_finished() {
            return last;
        }
        match self.task.await {
            Err(err) if err.is_panic() => RunStatus::Failed("scrape run panicked".to_string()),
            Err(err) => RunStatus::Failed(format!("scrape run aborted: {err}")),
            Ok(()) => RunStatus::Failed("scrape run ended without a result".to_string()),
        }
    }
}
