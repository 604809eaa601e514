//! Core type definitions: identifiers and the trial wire records.

use crate::events::Event;
use crate::genotype::Genotype;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a genotype (one evolved bot configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenotypeId(pub Uuid);

impl GenotypeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GenotypeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GenotypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One granted trial: everything a worker needs to run the simulator once.
///
/// Created by the coordinator when a start request is granted; consumed
/// exactly once by the worker that received the grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialAssignment {
    pub generation: u64,
    pub trial_index: u32,
    /// In-game entity identifier the simulator will log for this bot.
    pub entity_id: String,
    pub genotype: Genotype,
}

/// Outcome of one trial, submitted exactly once by the worker that ran it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub generation: u64,
    pub trial_index: u32,
    pub entity_id: String,
    pub genotype_id: GenotypeId,
    /// Extracted events in source-line order; empty when the trial failed.
    pub events: Vec<Event>,
    pub status: TrialStatus,
}

impl TrialResult {
    /// Result for a trial that ran to completion and produced parseable output.
    pub fn completed(assignment: &TrialAssignment, events: Vec<Event>) -> Self {
        Self {
            generation: assignment.generation,
            trial_index: assignment.trial_index,
            entity_id: assignment.entity_id.clone(),
            genotype_id: assignment.genotype.id,
            events,
            status: TrialStatus::Completed,
        }
    }

    /// Failure marker: the process crashed, produced no output, or produced
    /// output with no parseable events. Still counts toward quota completion.
    pub fn failed(assignment: &TrialAssignment) -> Self {
        Self {
            generation: assignment.generation,
            trial_index: assignment.trial_index,
            entity_id: assignment.entity_id.clone(),
            genotype_id: assignment.genotype.id,
            events: Vec::new(),
            status: TrialStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Completed,
    Failed,
}

/// Wire response to a `START` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial: Option<TrialAssignment>,
}

impl StartResponse {
    pub fn granted(trial: TrialAssignment) -> Self {
        Self {
            ok: true,
            trial: Some(trial),
        }
    }

    pub fn denied() -> Self {
        Self {
            ok: false,
            trial: None,
        }
    }
}
