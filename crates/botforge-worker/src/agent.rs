//! The worker agent: turns one machine's hardware budget into a bounded
//! stream of trial executions.

use botforge_core::{
    ControlPlane, Error, Result, StartDecision, TrialAssignment, TrialResult, TrialStatus,
    WorkerConfig,
};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Executes one granted trial. Implementations never fail: every execution
/// problem becomes a `failed` trial result so the coordinator's completion
/// count can always reach quota.
pub trait RunTrial: Send + Sync + 'static {
    fn run(&self, assignment: TrialAssignment) -> impl Future<Output = TrialResult> + Send;
}

/// What one pass over the quota accomplished on this machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentReport {
    pub granted: u32,
    pub failed: u32,
}

/// Retry a transport operation until it succeeds, doubling the delay up to a
/// cap. Transport failures are never fatal to the agent; it stalls here until
/// connectivity returns.
pub(crate) async fn with_backoff<T, F, Fut>(
    mut op: F,
    initial: Duration,
    max: Duration,
    what: &str,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = initial;
    loop {
        match op().await {
            Ok(value) => return value,
            Err(e) => {
                warn!(error = %e, what, delay_ms = delay.as_millis() as u64, "transport failure; retrying");
                sleep(delay).await;
                delay = (delay * 2).min(max);
            }
        }
    }
}

/// Bounded-concurrency pull loop against one control plane.
pub struct TrialAgent<C, R> {
    control: Arc<C>,
    runner: Arc<R>,
    max_concurrent_trials: usize,
    retry_initial: Duration,
    retry_max: Duration,
}

impl<C, R> TrialAgent<C, R>
where
    C: ControlPlane + 'static,
    R: RunTrial,
{
    pub fn new(control: Arc<C>, runner: Arc<R>, config: &WorkerConfig) -> Self {
        Self {
            control,
            runner,
            max_concurrent_trials: config.max_concurrent_trials.max(1),
            retry_initial: Duration::from_millis(config.retry_initial_ms),
            retry_max: Duration::from_millis(config.retry_max_ms),
        }
    }

    /// Pull grants until the coordinator denies one, never exceeding
    /// `max_concurrent_trials` in-flight trials, then wait for the in-flight
    /// trials to finish. Every granted trial submits exactly one result.
    pub async fn drain_quota(&self, shutdown: &CancellationToken) -> Result<AgentReport> {
        let slots = Arc::new(Semaphore::new(self.max_concurrent_trials));
        let tracker = TaskTracker::new();
        let mut granted = 0u32;
        let failed = Arc::new(AtomicU32::new(0));

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = slots.clone().acquire_owned() => {
                    permit.map_err(|_| Error::InvalidState("trial slots closed".into()))?
                }
            };

            let decision = with_backoff(
                || self.control.request_start(),
                self.retry_initial,
                self.retry_max,
                "request start",
            )
            .await;

            match decision {
                StartDecision::Granted(assignment) => {
                    granted += 1;
                    let control = self.control.clone();
                    let runner = self.runner.clone();
                    let failed = failed.clone();
                    let retry_initial = self.retry_initial;
                    let retry_max = self.retry_max;
                    tracker.spawn(async move {
                        let result = runner.run(assignment).await;
                        if result.status == TrialStatus::Failed {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                        with_backoff(
                            || control.submit_result(result.clone()),
                            retry_initial,
                            retry_max,
                            "submit result",
                        )
                        .await;
                        drop(permit);
                    });
                }
                StartDecision::Denied => {
                    debug!("start denied; waiting for in-flight trials");
                    drop(permit);
                    break;
                }
            }
        }

        tracker.close();
        tracker.wait().await;

        Ok(AgentReport {
            granted,
            failed: failed.load(Ordering::Relaxed),
        })
    }

    /// Long-running loop: drain the current quota, then re-poll as new
    /// generations open it again, until shutdown.
    pub async fn run(&self, shutdown: CancellationToken, poll_interval: Duration) -> Result<()> {
        loop {
            let report = self.drain_quota(&shutdown).await?;
            if report.granted > 0 {
                info!(
                    granted = report.granted,
                    failed = report.failed,
                    "drained current quota"
                );
            }

            if shutdown.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = sleep(poll_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        info!("agent stopped");
        Ok(())
    }
}
