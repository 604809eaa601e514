//! Fitness evaluation: reduce one trial's event sequence to per-entity scores.

use crate::config::FitnessWeights;
use crate::events::Event;
use std::collections::HashMap;

/// Per-entity counters accumulated over one trial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialCounters {
    pub won: bool,
    pub kills: u32,
    pub assists: u32,
    pub deaths: u32,
    pub gold: u64,
    pub experience: u64,
}

/// Pure reduction of an ordered event sequence into scalar scores.
///
/// Identical event sequences always produce identical scores; there is no
/// state carried across trials.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator {
    weights: FitnessWeights,
}

impl FitnessEvaluator {
    pub fn new(weights: FitnessWeights) -> Self {
        Self { weights }
    }

    /// Accumulate counters per entity. Trial duration is the maximum event
    /// timestamp, shared by every entity in the trial.
    pub fn count(&self, events: &[Event]) -> (HashMap<String, TrialCounters>, f64) {
        let mut counters: HashMap<String, TrialCounters> = HashMap::new();
        let mut duration = 0.0f64;

        for event in events {
            duration = duration.max(event.timestamp());
            let entry = counters.entry(event.entity_id().to_string()).or_default();
            match event {
                Event::Kill { .. } => entry.kills += 1,
                Event::Assist { .. } => entry.assists += 1,
                Event::Death { .. } => entry.deaths += 1,
                Event::GoldGain { amount, .. } => entry.gold += u64::from(*amount),
                Event::ExperienceGain { amount, .. } => entry.experience += u64::from(*amount),
                Event::Victory { .. } => entry.won = true,
                Event::StructureDestroyed { .. } => {}
            }
        }

        (counters, duration)
    }

    /// Scalar score for one entity's counters over a trial of `duration`
    /// seconds. Count counters contribute as per-minute rates; all rates are
    /// 0 when the duration is 0.
    pub fn score(&self, counters: &TrialCounters, duration: f64) -> f64 {
        let minutes = duration / 60.0;
        let rate = |count: f64| if minutes > 0.0 { count / minutes } else { 0.0 };

        let winrate = if counters.won { 1.0 } else { 0.0 };
        self.weights.win * winrate
            + self.weights.kills * rate(counters.kills as f64)
            + self.weights.assists * rate(counters.assists as f64)
            + self.weights.gold * rate(counters.gold as f64)
            - self.weights.deaths * rate(counters.deaths as f64)
            + self.weights.experience * rate(counters.experience as f64)
    }

    /// Score every entity that produced at least one event in the trial.
    pub fn score_trial(&self, events: &[Event]) -> HashMap<String, f64> {
        let (counters, duration) = self.count(events);
        counters
            .into_iter()
            .map(|(entity, c)| {
                let score = self.score(&c, duration);
                (entity, score)
            })
            .collect()
    }
}

impl Default for FitnessEvaluator {
    fn default() -> Self {
        Self::new(FitnessWeights::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kill(entity: &str, ts: f64) -> Event {
        Event::Kill {
            entity_id: entity.to_string(),
            victim: "other".to_string(),
            timestamp: ts,
        }
    }

    fn sample_events() -> Vec<Event> {
        vec![
            Event::GoldGain {
                entity_id: "bot_a".to_string(),
                amount: 600,
                timestamp: 30.0,
            },
            kill("bot_a", 45.0),
            Event::Death {
                entity_id: "bot_a".to_string(),
                timestamp: 90.0,
            },
            Event::Victory {
                entity_id: "bot_a".to_string(),
                timestamp: 120.0,
            },
        ]
    }

    #[test]
    fn identical_sequences_identical_scores() {
        let evaluator = FitnessEvaluator::default();
        let events = sample_events();
        assert_eq!(evaluator.score_trial(&events), evaluator.score_trial(&events));
    }

    #[test]
    fn zero_duration_yields_zero_rates() {
        let evaluator = FitnessEvaluator::default();
        let events = vec![kill("bot_a", 0.0)];
        let scores = evaluator.score_trial(&events);
        assert_eq!(scores["bot_a"], 0.0);
    }

    #[test]
    fn empty_trial_scores_nobody() {
        let evaluator = FitnessEvaluator::default();
        assert!(evaluator.score_trial(&[]).is_empty());
    }

    #[test]
    fn kills_increase_score() {
        let evaluator = FitnessEvaluator::default();
        let mut events = sample_events();
        let base = evaluator.score_trial(&events)["bot_a"];

        events.push(kill("bot_a", 100.0));
        let more = evaluator.score_trial(&events)["bot_a"];
        assert!(more >= base);
    }

    #[test]
    fn deaths_decrease_score() {
        let evaluator = FitnessEvaluator::default();
        let mut events = sample_events();
        let base = evaluator.score_trial(&events)["bot_a"];

        events.push(Event::Death {
            entity_id: "bot_a".to_string(),
            timestamp: 100.0,
        });
        let worse = evaluator.score_trial(&events)["bot_a"];
        assert!(worse <= base);
    }

    #[test]
    fn gold_and_experience_increase_score() {
        let evaluator = FitnessEvaluator::default();
        let mut events = sample_events();
        let base = evaluator.score_trial(&events)["bot_a"];

        events.push(Event::GoldGain {
            entity_id: "bot_a".to_string(),
            amount: 500,
            timestamp: 100.0,
        });
        events.push(Event::ExperienceGain {
            entity_id: "bot_a".to_string(),
            amount: 500,
            timestamp: 110.0,
        });
        let more = evaluator.score_trial(&events)["bot_a"];
        assert!(more >= base);
    }

    #[test]
    fn win_contributes_configured_weight() {
        let weights = FitnessWeights {
            win: 100.0,
            kills: 0.0,
            assists: 0.0,
            gold: 0.0,
            deaths: 0.0,
            experience: 0.0,
        };
        let evaluator = FitnessEvaluator::new(weights);
        let events = vec![Event::Victory {
            entity_id: "bot_a".to_string(),
            timestamp: 60.0,
        }];
        assert_eq!(evaluator.score_trial(&events)["bot_a"], 100.0);
    }

    #[test]
    fn entities_are_scored_independently() {
        let evaluator = FitnessEvaluator::default();
        let events = vec![kill("bot_a", 60.0), kill("bot_b", 60.0), kill("bot_b", 90.0)];
        let scores = evaluator.score_trial(&events);
        assert!(scores["bot_b"] > scores["bot_a"]);
    }
}
