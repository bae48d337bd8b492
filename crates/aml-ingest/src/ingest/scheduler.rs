//! Recurring sweep over open processes.
//!
//! Each tick loads every `open` process and runs them on a bounded pool. A
//! sweep waits for all of its tasks before the next tick starts, so one
//! process is never picked up twice at the same time.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pipeline::{Pipeline, ProcessOutcome};
use super::process::fail_process;
use crate::error::Result;
use crate::models::{ErrorStatus, Failure, Process};

/// How a single process run ended, as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    Completed,
    Failed,
    TimedOut,
    Panicked,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub panicked: usize,
}

impl SweepSummary {
    fn record(&mut self, result: RunResult) {
        match result {
            RunResult::Completed => self.completed += 1,
            RunResult::Failed => self.failed += 1,
            RunResult::TimedOut => self.timed_out += 1,
            RunResult::Panicked => self.panicked += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed + self.timed_out + self.panicked
    }
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    poll_interval: Duration,
    process_timeout: Duration,
    max_concurrent: usize,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let config = pipeline.config();
        Self {
            poll_interval: config.poll_interval(),
            process_timeout: config.process_timeout(),
            max_concurrent: config.max_concurrent_processes.max(1),
            pipeline,
        }
    }

    /// Spawn the sweep loop. It stops after the current sweep once `shutdown`
    /// is cancelled.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                poll_interval_secs = self.poll_interval.as_secs(),
                max_concurrent = self.max_concurrent,
                process_timeout_secs = self.process_timeout.as_secs(),
                "Scheduler started"
            );

            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            error!(error = %e, "Sweep failed");
                        }
                    }
                }
            }

            info!("Scheduler stopped");
        })
    }

    /// Run every currently open process once.
    pub async fn sweep(&self) -> Result<SweepSummary> {
        let processes = self.pipeline.db().open_processes().await?;
        if processes.is_empty() {
            debug!("No open processes");
            return Ok(SweepSummary::default());
        }

        info!(count = processes.len(), "Picked up open processes");
        let summary = self.run_batch(processes).await;
        info!(
            completed = summary.completed,
            failed = summary.failed,
            timed_out = summary.timed_out,
            panicked = summary.panicked,
            "Sweep finished"
        );
        Ok(summary)
    }

    pub async fn run_batch(&self, processes: Vec<Process>) -> SweepSummary {
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for process in processes {
            let permits = permits.clone();
            let pipeline = self.pipeline.clone();
            let timeout = self.process_timeout;

            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return RunResult::Failed,
                };
                run_guarded(&pipeline, &process, timeout).await
            });
        }

        let mut summary = SweepSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => summary.record(result),
                Err(e) => {
                    error!(error = %e, "Process task aborted");
                    summary.record(RunResult::Failed);
                },
            }
        }
        summary
    }
}

/// Run one process with a time limit, containing panics.
async fn run_guarded(pipeline: &Pipeline, process: &Process, timeout: Duration) -> RunResult {
    let process_id = process.process_id.as_str();
    let run = AssertUnwindSafe(pipeline.run(process)).catch_unwind();

    let (result, failure) = match tokio::time::timeout(timeout, run).await {
        Ok(Ok(Ok(ProcessOutcome::Completed(_)))) => return RunResult::Completed,
        Ok(Ok(Ok(ProcessOutcome::Failed(_)))) => return RunResult::Failed,
        Ok(Ok(Err(e))) => {
            error!(process_id = %process_id, error = %e, "Could not record process outcome");
            (RunResult::Failed, Failure::new(ErrorStatus::IsFailed, e.to_string()))
        },
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            error!(process_id = %process_id, panic = %message, "Process run panicked");
            (
                RunResult::Panicked,
                Failure::new(ErrorStatus::IsFailed, format!("Process run panicked: {}", message)),
            )
        },
        Err(_) => {
            warn!(process_id = %process_id, timeout_secs = timeout.as_secs(), "Process run timed out");
            (
                RunResult::TimedOut,
                Failure::new(
                    ErrorStatus::Timeout,
                    format!("Processing exceeded {} seconds", timeout.as_secs()),
                ),
            )
        },
    };

    if let Err(e) = fail_process(pipeline.db().as_ref(), process_id, &failure).await {
        error!(process_id = %process_id, error = %e, "Failed to mark process as failed");
    }
    result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
