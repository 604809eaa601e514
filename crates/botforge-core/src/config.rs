//! Configuration types for the coordinator, workers, and the evolution run.

use crate::genotype::GenotypeSpec;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Weights for the six fitness terms. Tuning constants, not logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessWeights {
    /// Terminal win outcome (0/1 per trial).
    pub win: f64,
    /// Kills per minute.
    pub kills: f64,
    /// Assists per minute.
    pub assists: f64,
    /// Gold gained per minute.
    pub gold: f64,
    /// Deaths per minute (subtracted).
    pub deaths: f64,
    /// Experience gained per minute.
    pub experience: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            win: 100.0,
            kills: 10.0,
            assists: 5.0,
            gold: 0.05,
            deaths: 8.0,
            experience: 0.03,
        }
    }
}

/// Parameters of the generational loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Number of genotypes per generation.
    pub population_size: usize,
    /// Trials granted per genotype per generation.
    pub trials_per_genotype: u32,
    /// Hard cap on generations.
    pub max_generations: u64,
    /// Consecutive non-improving generations before stopping early.
    pub stagnation_window: u64,
    /// Minimum best-score improvement that counts as progress.
    pub stagnation_epsilon: f64,
    /// Seed for the evolution RNG; fixed seed gives a reproducible run.
    pub seed: u64,
    /// Per-weight probability of mutation.
    pub mutation_rate: f64,
    /// Maximum absolute perturbation applied by one mutation.
    pub mutation_magnitude: f64,
    pub genotype: GenotypeSpec,
    pub fitness: FitnessWeights,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            trials_per_genotype: 3,
            max_generations: 50,
            stagnation_window: 8,
            stagnation_epsilon: 1e-6,
            seed: 0,
            mutation_rate: 0.1,
            mutation_magnitude: 0.25,
            genotype: GenotypeSpec::default(),
            fitness: FitnessWeights::default(),
        }
    }
}

/// Coordinator process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub bind_address: String,
    pub port: u16,
    /// SQLite database path for generation snapshots and scores.
    pub database_path: String,
    pub evolution: EvolutionConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            database_path: "./data/botforge.db".to_string(),
            evolution: EvolutionConfig::default(),
        }
    }
}

/// External simulator invocation. The simulator is an opaque executable that
/// consumes a configuration file and writes a text log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Program to invoke for each trial.
    pub command: String,
    /// Arguments placed before the config and log paths.
    pub extra_args: Vec<String>,
    /// Root directory for per-trial working directories.
    pub work_dir: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            command: "./simulate".to_string(),
            extra_args: Vec::new(),
            work_dir: "./trials".to_string(),
        }
    }
}

/// Worker process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub coordinator_url: String,
    /// Stable worker identifier; a fresh UUID when unset.
    pub worker_id: Option<String>,
    /// Hardware budget: trials this machine may run at once.
    pub max_concurrent_trials: usize,
    /// Delay between polls once the current quota is drained.
    pub poll_interval_ms: u64,
    /// Initial transport retry delay; doubles up to `retry_max_ms`.
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub simulator: SimulatorConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            coordinator_url: "http://127.0.0.1:8080".to_string(),
            worker_id: None,
            max_concurrent_trials: 2,
            poll_interval_ms: 5000,
            retry_initial_ms: 500,
            retry_max_ms: 30_000,
            simulator: SimulatorConfig::default(),
        }
    }
}

/// Load a JSON config from `path`, or fall back to defaults when no path is
/// given. A path that exists but fails to parse is an error, not a fallback.
pub fn load_or_default<T>(path: Option<&str>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(Path::new(path))?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(T::default()),
    }
}
