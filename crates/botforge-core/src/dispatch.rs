//! Generation dispatch: the quota/grant/result-collection state machine.
//!
//! One `Coordinator` exists per generation, with an explicit lifecycle:
//! created when the generation opens, drained of quota by worker requests,
//! complete once every granted trial has submitted a result.

use crate::genotype::Genotype;
use crate::types::{TrialAssignment, TrialResult, TrialStatus};
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Outcome of one start request.
#[derive(Debug, Clone)]
pub enum StartDecision {
    Granted(TrialAssignment),
    Denied,
}

#[derive(Debug)]
struct DispatchState {
    remaining: u32,
    granted: u32,
    failed: u32,
    results: Vec<TrialResult>,
}

/// Snapshot of a generation's dispatch progress.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStats {
    pub generation: u64,
    pub initial_quota: u32,
    pub granted: u32,
    pub remaining: u32,
    pub completed: u32,
    pub failed: u32,
}

/// Single source of truth for how many trials remain to be started in the
/// current generation, and the collection point for their results.
///
/// Grant decisions and result appends are serialized under one mutex, so
/// exactly `initial_quota` grants are ever issued no matter how many workers
/// race, and once quota is exhausted every later request is denied.
pub struct Coordinator {
    generation: u64,
    initial_quota: u32,
    population: Vec<Genotype>,
    state: Mutex<DispatchState>,
    completed_tx: watch::Sender<u32>,
}

impl Coordinator {
    pub fn new(generation: u64, initial_quota: u32, population: Vec<Genotype>) -> Result<Self> {
        if initial_quota > 0 && population.is_empty() {
            return Err(Error::Validation(
                "cannot dispatch trials for an empty population".into(),
            ));
        }
        let (completed_tx, _) = watch::channel(0);
        Ok(Self {
            generation,
            initial_quota,
            population,
            state: Mutex::new(DispatchState {
                remaining: initial_quota,
                granted: 0,
                failed: 0,
                results: Vec::with_capacity(initial_quota as usize),
            }),
            completed_tx,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Grant a trial if quota remains. Genotypes are assigned round-robin by
    /// trial index, so a quota of `population × k` runs each genotype exactly
    /// `k` times regardless of which machines pull the grants.
    pub fn try_grant(&self) -> StartDecision {
        let mut state = self.state.lock();
        if state.remaining == 0 {
            return StartDecision::Denied;
        }
        state.remaining -= 1;
        let trial_index = state.granted;
        state.granted += 1;

        let genotype = self.population[trial_index as usize % self.population.len()].clone();
        debug!(
            generation = self.generation,
            trial_index,
            remaining = state.remaining,
            "granted trial"
        );
        StartDecision::Granted(TrialAssignment {
            generation: self.generation,
            trial_index,
            entity_id: genotype.entity_id(),
            genotype,
        })
    }

    /// Append one trial result. Each granted trial submits exactly once by
    /// contract of the worker agent; a submission that would push the count
    /// past the initial quota is a programming error, never expected.
    pub fn accept_result(&self, result: TrialResult) -> Result<()> {
        if result.generation != self.generation {
            return Err(Error::InvalidState(format!(
                "result for generation {} submitted to generation {}",
                result.generation, self.generation
            )));
        }

        let completed = {
            let mut state = self.state.lock();
            if state.results.len() as u32 >= self.initial_quota {
                return Err(Error::QuotaViolation(format!(
                    "result count would exceed quota {}",
                    self.initial_quota
                )));
            }
            if result.status == TrialStatus::Failed {
                state.failed += 1;
                warn!(
                    generation = self.generation,
                    trial_index = result.trial_index,
                    "trial reported failure"
                );
            }
            state.results.push(result);
            state.results.len() as u32
        };

        self.completed_tx.send_replace(completed);
        Ok(())
    }

    /// Block until every granted trial has reported in. This is the sole
    /// termination signal for a generation.
    pub async fn await_complete(&self) -> Result<()> {
        let mut rx = self.completed_tx.subscribe();
        rx.wait_for(|&completed| completed >= self.initial_quota)
            .await
            .map_err(|_| Error::InvalidState("dispatch completion channel closed".into()))?;
        Ok(())
    }

    pub fn stats(&self) -> DispatchStats {
        let state = self.state.lock();
        DispatchStats {
            generation: self.generation,
            initial_quota: self.initial_quota,
            granted: state.granted,
            remaining: state.remaining,
            completed: state.results.len() as u32,
            failed: state.failed,
        }
    }

    /// Collected results so far, in submission order.
    pub fn results(&self) -> Vec<TrialResult> {
        self.state.lock().results.clone()
    }
}

/// The start/submit protocol as seen by a worker agent, whether in-process
/// (tests) or over HTTP.
pub trait ControlPlane: Send + Sync {
    fn request_start(&self) -> impl Future<Output = Result<StartDecision>> + Send;
    fn submit_result(&self, result: TrialResult) -> impl Future<Output = Result<()>> + Send;
}

impl ControlPlane for Coordinator {
    async fn request_start(&self) -> Result<StartDecision> {
        Ok(self.try_grant())
    }

    async fn submit_result(&self, result: TrialResult) -> Result<()> {
        self.accept_result(result)
    }
}
