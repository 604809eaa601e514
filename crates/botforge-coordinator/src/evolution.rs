//! The evolution engine: drives generations and evolves the population.
//!
//! Run state machine: `INIT -> RUNNING_GENERATION -> SCORING -> SELECTING ->
//! (RUNNING_GENERATION | DONE)`. One coordinator is published per generation
//! and retired once its quota has fully reported in.

use crate::database::Database;
use botforge_core::{
    Coordinator, Error, EvolutionConfig, FitnessEvaluator, Genotype, GenotypeId, Result,
    TrialResult, TrialStatus,
};
use parking_lot::{Mutex, RwLock};
use rand::distributions::{Distribution, WeightedIndex};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Outcome of a full run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub generations_completed: u64,
    pub best_score: Option<f64>,
    pub stopped_by_stagnation: bool,
}

struct GenerationScores {
    per_genotype: Vec<f64>,
    failed_trials: u32,
}

pub struct EvolutionEngine {
    db: Database,
    config: EvolutionConfig,
    evaluator: FitnessEvaluator,
    current: RwLock<Option<Arc<Coordinator>>>,
    rng: Mutex<ChaCha8Rng>,
}

impl EvolutionEngine {
    /// Fails fast on configuration errors; everything past this point is a
    /// recoverable trial- or selection-level condition.
    pub fn new(db: Database, config: EvolutionConfig) -> Result<Self> {
        config.genotype.validate()?;
        if config.population_size == 0 {
            return Err(Error::Validation("population size must be positive".into()));
        }
        if config.trials_per_genotype == 0 {
            return Err(Error::Validation(
                "trials per genotype must be positive".into(),
            ));
        }
        let evaluator = FitnessEvaluator::new(config.fitness.clone());
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self {
            db,
            config,
            evaluator,
            current: RwLock::new(None),
            rng: Mutex::new(rng),
        })
    }

    /// The coordinator of the generation currently accepting trials, if any.
    pub fn current_coordinator(&self) -> Option<Arc<Coordinator>> {
        self.current.read().clone()
    }

    /// Drive generations until the cap or the stagnation criterion is hit.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RunSummary> {
        let (mut generation, mut population) = self.init_population().await?;

        let mut best_score: Option<f64> = None;
        let mut stale_generations = 0u64;
        let mut completed = 0u64;
        let mut stagnated = false;

        while generation < self.config.max_generations {
            let quota = population.len() as u32 * self.config.trials_per_genotype;
            let coordinator = Arc::new(Coordinator::new(generation, quota, population.clone())?);

            info!(generation, quota, "generation open");
            *self.current.write() = Some(coordinator.clone());
            coordinator.await_complete().await?;
            *self.current.write() = None;

            let results = coordinator.results();
            let scores = self.score_generation(&population, &results);
            self.report_distribution(generation, &scores);

            // Persist before selection so a restart resumes from here.
            let persisted: Vec<(GenotypeId, f64)> = population
                .iter()
                .zip(&scores.per_genotype)
                .map(|(g, &s)| (g.id, s))
                .collect();
            self.db
                .store_generation(generation, &population, &persisted)
                .await?;
            completed += 1;

            let generation_best = scores
                .per_genotype
                .iter()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max);
            let improved = match best_score {
                None => true,
                Some(previous) => generation_best > previous + self.config.stagnation_epsilon,
            };
            if improved {
                best_score = Some(generation_best);
                stale_generations = 0;
            } else {
                stale_generations += 1;
                if stale_generations >= self.config.stagnation_window {
                    info!(
                        generation,
                        stale_generations, "best fitness stagnant; stopping early"
                    );
                    stagnated = true;
                    break;
                }
            }

            population = self.next_population(&population, &scores.per_genotype)?;
            generation += 1;
        }

        info!(
            generations_completed = completed,
            best_score = best_score.unwrap_or(f64::NAN),
            "run complete"
        );
        Ok(RunSummary {
            generations_completed: completed,
            best_score,
            stopped_by_stagnation: stagnated,
        })
    }

    /// INIT: resume from the newest persisted generation, else start fresh.
    async fn init_population(&self) -> Result<(u64, Vec<Genotype>)> {
        if let Some((last, population)) = self.db.latest_generation().await? {
            info!(resumed_from = last, "resuming from persisted generation");
            let scores = self.db.scores_for(last).await?;
            let fitness: Vec<f64> = population
                .iter()
                .map(|g| scores.get(&g.id).copied().unwrap_or(0.0))
                .collect();
            let next = self.next_population(&population, &fitness)?;
            return Ok((last + 1, next));
        }

        info!(
            population_size = self.config.population_size,
            "creating initial population"
        );
        let mut rng = self.rng.lock();
        let population = (0..self.config.population_size)
            .map(|_| Genotype::random(&self.config.genotype, &mut *rng))
            .collect();
        Ok((0, population))
    }

    /// SCORING: per-genotype mean fitness across its trials. Failed trials
    /// contribute the floor score 0.0 so crashing configurations are
    /// penalized rather than excused.
    fn score_generation(
        &self,
        population: &[Genotype],
        results: &[TrialResult],
    ) -> GenerationScores {
        let mut sums: HashMap<GenotypeId, (f64, u32)> = HashMap::new();
        let mut failed_trials = 0u32;

        for result in results {
            let score = match result.status {
                TrialStatus::Failed => {
                    failed_trials += 1;
                    0.0
                }
                TrialStatus::Completed => self
                    .evaluator
                    .score_trial(&result.events)
                    .get(&result.entity_id)
                    .copied()
                    .unwrap_or(0.0),
            };
            let entry = sums.entry(result.genotype_id).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }

        let per_genotype = population
            .iter()
            .map(|g| match sums.get(&g.id) {
                Some((sum, n)) if *n > 0 => sum / *n as f64,
                _ => 0.0,
            })
            .collect();

        GenerationScores {
            per_genotype,
            failed_trials,
        }
    }

    fn report_distribution(&self, generation: u64, scores: &GenerationScores) {
        let best = scores
            .per_genotype
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let worst = scores
            .per_genotype
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        let mean = scores.per_genotype.iter().sum::<f64>() / scores.per_genotype.len().max(1) as f64;
        info!(
            generation,
            best, mean, worst, failed_trials = scores.failed_trials, "generation scored"
        );
    }

    /// SELECTING: fitness-proportional sampling with replacement, uniform
    /// per-state crossover, bounded mutation.
    fn next_population(&self, population: &[Genotype], fitness: &[f64]) -> Result<Vec<Genotype>> {
        let probabilities = selection_probabilities(fitness);
        let sampler = WeightedIndex::new(&probabilities)
            .map_err(|e| Error::InvalidState(format!("selection sampler: {}", e)))?;

        let mut rng = self.rng.lock();
        let next = (0..population.len())
            .map(|_| {
                let parent_a = &population[sampler.sample(&mut *rng)];
                let parent_b = &population[sampler.sample(&mut *rng)];
                let mut child = Genotype::crossover(parent_a, parent_b, &mut *rng);
                child.mutate(
                    &self.config.genotype,
                    self.config.mutation_rate,
                    self.config.mutation_magnitude,
                    &mut *rng,
                );
                debug!(child = %child.id, a = %parent_a.id, b = %parent_b.id, "bred child");
                child
            })
            .collect();
        Ok(next)
    }
}

/// Selection probabilities proportional to fitness. Scores are shifted to be
/// non-negative when any are negative; a non-positive total falls back to
/// uniform probabilities rather than failing the generation.
pub fn selection_probabilities(fitness: &[f64]) -> Vec<f64> {
    if fitness.is_empty() {
        return Vec::new();
    }

    let min = fitness.iter().cloned().fold(f64::INFINITY, f64::min);
    let shifted: Vec<f64> = if min < 0.0 {
        fitness.iter().map(|f| f - min).collect()
    } else {
        fitness.to_vec()
    };

    let total: f64 = shifted.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        warn!(total, "total fitness non-positive; using uniform selection");
        return vec![1.0 / fitness.len() as f64; fitness.len()];
    }

    shifted.iter().map(|f| f / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use botforge_core::{Event, StartDecision};
    use proptest::prelude::*;
    use tokio::time::Duration;

    async fn test_db() -> Database {
        let db = Database::new(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn small_config() -> EvolutionConfig {
        EvolutionConfig {
            population_size: 4,
            trials_per_genotype: 1,
            max_generations: 2,
            stagnation_window: 10,
            seed: 42,
            ..EvolutionConfig::default()
        }
    }

    #[test]
    fn probabilities_sum_to_one() {
        let probs = selection_probabilities(&[1.0, 2.0, 3.0]);
        let total: f64 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(probs[2] > probs[0]);
    }

    #[test]
    fn all_negative_fitness_is_valid() {
        let probs = selection_probabilities(&[-5.0, -1.0, -3.0]);
        let total: f64 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(probs.iter().all(|&p| p >= 0.0));
        // Least-bad genotype keeps the largest share.
        assert!(probs[1] > probs[0] && probs[1] > probs[2]);
    }

    #[test]
    fn all_equal_fitness_falls_back_to_uniform() {
        // Shifting equal negatives gives a zero total.
        let probs = selection_probabilities(&[-2.0, -2.0, -2.0, -2.0]);
        assert_eq!(probs, vec![0.25; 4]);

        let probs = selection_probabilities(&[0.0, 0.0]);
        assert_eq!(probs, vec![0.5, 0.5]);
    }

    proptest! {
        #[test]
        fn probabilities_always_valid(
            fitness in proptest::collection::vec(-1e6f64..1e6, 1..50)
        ) {
            let probs = selection_probabilities(&fitness);
            prop_assert_eq!(probs.len(), fitness.len());
            for &p in &probs {
                prop_assert!(p >= 0.0);
            }
            let total: f64 = probs.iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn zero_population_rejected_at_startup() {
        let db = test_db().await;
        let config = EvolutionConfig {
            population_size: 0,
            ..EvolutionConfig::default()
        };
        assert!(EvolutionEngine::new(db, config).is_err());
    }

    #[tokio::test]
    async fn invalid_weight_bounds_rejected_at_startup() {
        let db = test_db().await;
        let mut config = EvolutionConfig::default();
        config.genotype.min_weight = 10.0;
        config.genotype.max_weight = 1.0;
        assert!(EvolutionEngine::new(db, config).is_err());
    }

    #[tokio::test]
    async fn scoring_aggregates_by_mean() {
        let db = test_db().await;
        let config = small_config();
        let engine = EvolutionEngine::new(db, config.clone()).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let genotype = Genotype::random(&config.genotype, &mut rng);
        let population = vec![genotype.clone()];

        let win = TrialResult {
            generation: 0,
            trial_index: 0,
            entity_id: genotype.entity_id(),
            genotype_id: genotype.id,
            events: vec![Event::Victory {
                entity_id: genotype.entity_id(),
                timestamp: 60.0,
            }],
            status: TrialStatus::Completed,
        };
        let loss = TrialResult {
            trial_index: 1,
            events: Vec::new(),
            ..win.clone()
        };

        let scores = engine.score_generation(&population, &[win.clone(), loss]);
        let solo = engine.score_generation(&population, &[win]);
        // Mean of {win, 0} is half the solo win score.
        assert!((scores.per_genotype[0] - solo.per_genotype[0] / 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failed_trials_drag_the_mean_to_zero() {
        let db = test_db().await;
        let config = small_config();
        let engine = EvolutionEngine::new(db, config.clone()).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let genotype = Genotype::random(&config.genotype, &mut rng);
        let population = vec![genotype.clone()];

        let failed = TrialResult {
            generation: 0,
            trial_index: 0,
            entity_id: genotype.entity_id(),
            genotype_id: genotype.id,
            events: Vec::new(),
            status: TrialStatus::Failed,
        };

        let scores = engine.score_generation(&population, &[failed]);
        assert_eq!(scores.per_genotype[0], 0.0);
        assert_eq!(scores.failed_trials, 1);
    }

    /// Full loop: an in-process driver plays the worker fleet, draining each
    /// generation's quota until the engine reports DONE.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn engine_runs_generations_to_done() {
        let db = test_db().await;
        let config = small_config();
        let engine = Arc::new(EvolutionEngine::new(db.clone(), config.clone()).unwrap());

        let driver = {
            let engine = engine.clone();
            tokio::spawn(async move {
                loop {
                    if let Some(coordinator) = engine.current_coordinator() {
                        while let StartDecision::Granted(assignment) = coordinator.try_grant() {
                            let events = vec![
                                Event::Kill {
                                    entity_id: assignment.entity_id.clone(),
                                    victim: "npc_creep".to_string(),
                                    timestamp: 30.0,
                                },
                                Event::Victory {
                                    entity_id: assignment.entity_id.clone(),
                                    timestamp: 120.0,
                                },
                            ];
                            let result = TrialResult::completed(&assignment, events);
                            coordinator.accept_result(result).unwrap();
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            })
        };

        let summary = engine.run().await.unwrap();
        driver.abort();

        assert_eq!(summary.generations_completed, 2);
        assert!(summary.best_score.unwrap() > 0.0);
        assert!(!summary.stopped_by_stagnation);

        // Both generations persisted before selection.
        assert_eq!(db.count_generations().await.unwrap(), 2);
    }

    /// A resumed run continues from the persisted snapshot instead of
    /// regenerating generation zero.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn resume_continues_from_persisted_generation() {
        let db = test_db().await;
        let config = small_config();

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let population: Vec<Genotype> = (0..config.population_size)
            .map(|_| Genotype::random(&config.genotype, &mut rng))
            .collect();
        let scores: Vec<_> = population.iter().map(|g| (g.id, 1.0)).collect();
        db.store_generation(0, &population, &scores).await.unwrap();

        let engine = Arc::new(EvolutionEngine::new(db.clone(), config).unwrap());
        let driver = {
            let engine = engine.clone();
            tokio::spawn(async move {
                loop {
                    if let Some(coordinator) = engine.current_coordinator() {
                        while let StartDecision::Granted(assignment) = coordinator.try_grant() {
                            let result = TrialResult::completed(&assignment, Vec::new());
                            coordinator.accept_result(result).unwrap();
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            })
        };

        let summary = engine.run().await.unwrap();
        driver.abort();

        // Generation 0 was already done; only generation 1 ran (cap is 2).
        assert_eq!(summary.generations_completed, 1);
        assert_eq!(db.count_generations().await.unwrap(), 2);
    }
}
