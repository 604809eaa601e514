//! Trial runner: one isolated simulator process per granted trial.

use crate::agent::RunTrial;
use botforge_core::{
    Error, Event, LogExtractor, Result, SimulatorConfig, TrialAssignment, TrialResult,
};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Invokes the external simulator with a generated configuration file and a
/// designated log path, then turns the raw log into events.
pub struct ProcessTrialRunner {
    config: SimulatorConfig,
    extractor: LogExtractor,
}

impl ProcessTrialRunner {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            extractor: LogExtractor::new(),
        }
    }

    fn trial_dir(&self, assignment: &TrialAssignment) -> PathBuf {
        PathBuf::from(&self.config.work_dir)
            .join(format!("gen_{:04}", assignment.generation))
            .join(format!("trial_{:04}", assignment.trial_index))
    }

    async fn execute(&self, assignment: &TrialAssignment) -> Result<Vec<Event>> {
        let dir = self.trial_dir(assignment);
        tokio::fs::create_dir_all(&dir).await?;

        let config_path = dir.join("bot_config.json");
        let log_path = dir.join("trial.log");
        tokio::fs::write(&config_path, serde_json::to_vec_pretty(assignment)?).await?;

        debug!(
            command = %self.config.command,
            config = %config_path.display(),
            log = %log_path.display(),
            "launching simulator"
        );

        // No timeout here: a hung simulator stalls only its own slot.
        let status = Command::new(&self.config.command)
            .args(&self.config.extra_args)
            .arg(&config_path)
            .arg(&log_path)
            .status()
            .await?;

        if !status.success() {
            return Err(Error::Trial(format!("simulator exited with {}", status)));
        }

        let log = tokio::fs::read_to_string(&log_path)
            .await
            .map_err(|e| Error::Trial(format!("simulator produced no log: {}", e)))?;
        if log.trim().is_empty() {
            return Err(Error::Trial("simulator produced an empty log".into()));
        }

        let events = self.extractor.extract_all(&log);
        if events.is_empty() {
            return Err(Error::Trial("no parseable events in trial log".into()));
        }
        Ok(events)
    }
}

impl RunTrial for ProcessTrialRunner {
    async fn run(&self, assignment: TrialAssignment) -> TrialResult {
        match self.execute(&assignment).await {
            Ok(events) => {
                info!(
                    generation = assignment.generation,
                    trial_index = assignment.trial_index,
                    events = events.len(),
                    "trial completed"
                );
                TrialResult::completed(&assignment, events)
            }
            Err(e) => {
                warn!(
                    generation = assignment.generation,
                    trial_index = assignment.trial_index,
                    error = %e,
                    "trial failed"
                );
                TrialResult::failed(&assignment)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botforge_core::{Genotype, GenotypeSpec, TrialStatus};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn assignment() -> TrialAssignment {
        let spec = GenotypeSpec::default();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let genotype = Genotype::random(&spec, &mut rng);
        TrialAssignment {
            generation: 0,
            trial_index: 0,
            entity_id: genotype.entity_id(),
            genotype,
        }
    }

    fn runner_with_script(work_dir: &std::path::Path, script: &str) -> ProcessTrialRunner {
        ProcessTrialRunner::new(SimulatorConfig {
            command: "sh".to_string(),
            extra_args: vec!["-c".to_string(), script.to_string(), "simtrial".to_string()],
            work_dir: work_dir.display().to_string(),
        })
    }

    #[tokio::test]
    async fn successful_trial_extracts_events() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"printf '[00:30] bot_x gains 100 gold\nBuilding: npc_Dota_3_tower destroyed\nVictory: bot_x\n' > "$2""#;
        let runner = runner_with_script(dir.path(), script);

        let result = runner.run(assignment()).await;
        assert_eq!(result.status, TrialStatus::Completed);
        assert_eq!(result.events.len(), 3);
    }

    #[tokio::test]
    async fn nonzero_exit_yields_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with_script(dir.path(), "exit 3");

        let result = runner.run(assignment()).await;
        assert_eq!(result.status, TrialStatus::Failed);
        assert!(result.events.is_empty());
    }

    #[tokio::test]
    async fn missing_log_yields_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with_script(dir.path(), "true");

        let result = runner.run(assignment()).await;
        assert_eq!(result.status, TrialStatus::Failed);
    }

    #[tokio::test]
    async fn log_without_events_yields_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"printf 'garbage unrelated text\nmore noise\n' > "$2""#;
        let runner = runner_with_script(dir.path(), script);

        let result = runner.run(assignment()).await;
        assert_eq!(result.status, TrialStatus::Failed);
    }

    #[tokio::test]
    async fn config_file_is_written_for_the_simulator() {
        let dir = tempfile::tempdir().unwrap();
        // The simulator contract: argument one is the bot config path.
        let script = r#"grep -q entity_id "$1" && printf 'Victory: bot_x\n' > "$2""#;
        let runner = runner_with_script(dir.path(), script);

        let result = runner.run(assignment()).await;
        assert_eq!(result.status, TrialStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_command_yields_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessTrialRunner::new(SimulatorConfig {
            command: "/nonexistent/simulator".to_string(),
            extra_args: Vec::new(),
            work_dir: dir.path().display().to_string(),
        });

        let result = runner.run(assignment()).await;
        assert_eq!(result.status, TrialStatus::Failed);
    }
}
