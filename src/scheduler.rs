//! Cron-driven background ingestion.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::processing::IngestionApi;

/// Errors raised while starting the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Cron expression could not be parsed.
    #[error("Invalid ingestion schedule '{expression}': {reason}")]
    InvalidSchedule {
        /// Expression as configured.
        expression: String,
        /// Parser diagnostic.
        reason: String,
    },
}

/// Starts recurring full ingestion runs.
pub struct Scheduler;

impl Scheduler {
    /// Spawn a background task running a full sweep at every tick of `expression`.
    ///
    /// The expression uses the six- or seven-field `cron` syntax with seconds first. Ticks are
    /// computed after each run finishes, and a tick that finds a manual run in progress is
    /// skipped, so sweeps never overlap.
    pub fn start(
        ingestion: Arc<dyn IngestionApi>,
        expression: &str,
    ) -> Result<SchedulerHandle, SchedulerError> {
        let schedule =
            Schedule::from_str(expression).map_err(|error| SchedulerError::InvalidSchedule {
                expression: expression.to_string(),
                reason: error.to_string(),
            })?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(ingestion, schedule, stop_rx));
        tracing::info!(schedule = expression, "Ingestion scheduler started");

        Ok(SchedulerHandle { stop_tx, task })
    }
}

/// Handle to a running scheduler; dropping it leaves the task running until process exit.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the scheduler to stop and wait for it to exit.
    ///
    /// A sweep already in progress is allowed to finish first.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(error) = self.task.await {
            tracing::warn!(error = %error, "Ingestion scheduler task ended abnormally");
        }
        tracing::info!("Ingestion scheduler stopped");
    }
}

async fn run_loop(
    ingestion: Arc<dyn IngestionApi>,
    schedule: Schedule,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            tracing::warn!("Ingestion schedule has no upcoming ticks; scheduler exiting");
            return;
        };
        let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(next = %next, "Next ingestion run scheduled");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    return;
                }
                continue;
            }
        }

        match ingestion.try_process_all().await {
            Some(summary) => tracing::info!(
                processed = summary.processed,
                failed = summary.failed,
                total_chunks = summary.total_chunks,
                "Scheduled ingestion run finished"
            ),
            None => tracing::warn!("Previous ingestion run still in progress; skipping tick"),
        }

        if *stop_rx.borrow() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{ProcessedDocument, ProcessingError, RunSummary};
    use crate::state::{ProcessingState, StateSnapshot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingIngestion {
        runs: AtomicUsize,
        busy: bool,
    }

    #[async_trait]
    impl IngestionApi for CountingIngestion {
        async fn try_process_all(&self) -> Option<RunSummary> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            (!self.busy).then(RunSummary::default)
        }

        async fn process_document(
            &self,
            _namespace: &str,
            name: &str,
        ) -> Result<ProcessedDocument, ProcessingError> {
            Err(ProcessingError::UnsupportedDocument(name.to_string()))
        }

        fn state_snapshot(&self) -> StateSnapshot {
            ProcessingState::new(0).snapshot()
        }
    }

    #[tokio::test]
    async fn rejects_invalid_expressions() {
        let ingestion = Arc::new(CountingIngestion::default());
        let result = Scheduler::start(ingestion, "every five minutes");
        assert!(matches!(
            result,
            Err(SchedulerError::InvalidSchedule { .. })
        ));
    }

    #[tokio::test]
    async fn runs_on_every_tick_until_stopped() {
        let ingestion = Arc::new(CountingIngestion::default());
        let handle = Scheduler::start(ingestion.clone(), "* * * * * *").expect("start");

        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.stop().await;
        let runs = ingestion.runs.load(Ordering::SeqCst);
        assert!(runs >= 1, "expected at least one run, saw {runs}");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(ingestion.runs.load(Ordering::SeqCst), runs);
    }

    #[tokio::test]
    async fn busy_ticks_are_skipped_without_stopping() {
        let ingestion = Arc::new(CountingIngestion {
            runs: AtomicUsize::new(0),
            busy: true,
        });
        let handle = Scheduler::start(ingestion.clone(), "* * * * * *").expect("start");

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(ingestion.runs.load(Ordering::SeqCst) >= 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_interrupts_a_distant_tick() {
        let ingestion = Arc::new(CountingIngestion::default());
        let handle = Scheduler::start(ingestion.clone(), "0 0 0 1 1 *").expect("start");

        tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .expect("stop returns promptly");
        assert_eq!(ingestion.runs.load(Ordering::SeqCst), 0);
    }
}
