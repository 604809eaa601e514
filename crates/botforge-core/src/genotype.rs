//! The evolved genotype: per-state heuristic weight vectors.

use crate::{Error, GenotypeId, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shape and bounds of every genotype in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenotypeSpec {
    /// Ordered state identifiers of the bot's decision machine.
    pub state_ids: Vec<String>,
    /// Weights carried per state.
    pub weights_per_state: usize,
    pub min_weight: f64,
    pub max_weight: f64,
}

impl Default for GenotypeSpec {
    fn default() -> Self {
        Self {
            state_ids: vec![
                "laning".to_string(),
                "pushing".to_string(),
                "retreating".to_string(),
                "farming".to_string(),
                "teamfight".to_string(),
            ],
            weights_per_state: 4,
            min_weight: 0.0,
            max_weight: 10.0,
        }
    }
}

impl GenotypeSpec {
    /// Startup validation; weight-bound errors are fatal to the run.
    pub fn validate(&self) -> Result<()> {
        if self.state_ids.is_empty() {
            return Err(Error::Validation("genotype spec has no states".into()));
        }
        if self.weights_per_state == 0 {
            return Err(Error::Validation(
                "genotype spec has zero weights per state".into(),
            ));
        }
        if !self.min_weight.is_finite() || !self.max_weight.is_finite() {
            return Err(Error::Validation("genotype weight bounds must be finite".into()));
        }
        if self.min_weight >= self.max_weight {
            return Err(Error::Validation(format!(
                "invalid genotype weight bounds: min {} >= max {}",
                self.min_weight, self.max_weight
            )));
        }
        Ok(())
    }
}

/// One bot configuration: an ordered mapping from state identifier to a
/// weight vector. Immutable once created; evolution produces new genotypes
/// rather than editing existing ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genotype {
    pub id: GenotypeId,
    pub states: BTreeMap<String, Vec<f64>>,
}

impl Genotype {
    /// Fresh genotype with uniform random weights inside the spec bounds.
    pub fn random<R: Rng>(spec: &GenotypeSpec, rng: &mut R) -> Self {
        let states = spec
            .state_ids
            .iter()
            .map(|state| {
                let weights = (0..spec.weights_per_state)
                    .map(|_| rng.gen_range(spec.min_weight..=spec.max_weight))
                    .collect();
                (state.clone(), weights)
            })
            .collect();
        Self {
            id: GenotypeId::new(),
            states,
        }
    }

    /// Uniform per-state crossover: each state's whole weight vector comes
    /// from one parent or the other. The child gets a fresh identity.
    pub fn crossover<R: Rng>(a: &Genotype, b: &Genotype, rng: &mut R) -> Self {
        let states = a
            .states
            .iter()
            .map(|(state, a_weights)| {
                let weights = if rng.gen_bool(0.5) {
                    a_weights.clone()
                } else {
                    b.states.get(state).unwrap_or(a_weights).clone()
                };
                (state.clone(), weights)
            })
            .collect();
        Self {
            id: GenotypeId::new(),
            states,
        }
    }

    /// Perturb a random subset of weights, each delta bounded by `magnitude`
    /// and the result clamped back into the spec bounds.
    pub fn mutate<R: Rng>(&mut self, spec: &GenotypeSpec, rate: f64, magnitude: f64, rng: &mut R) {
        for weights in self.states.values_mut() {
            for weight in weights.iter_mut() {
                if rng.gen_bool(rate.clamp(0.0, 1.0)) {
                    let delta = rng.gen_range(-magnitude..=magnitude);
                    *weight = (*weight + delta).clamp(spec.min_weight, spec.max_weight);
                }
            }
        }
    }

    /// In-game entity identifier the simulator logs for this bot.
    pub fn entity_id(&self) -> String {
        format!("bot_{}", self.id.0.simple())
    }
}
