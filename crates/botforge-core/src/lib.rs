//! Shared types and logic for the Botforge distributed trial-evolution system.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod extractor;
pub mod fitness;
pub mod genotype;
pub mod types;

pub use config::*;
pub use dispatch::{ControlPlane, Coordinator, DispatchStats, StartDecision};
pub use error::{Error, Result};
pub use events::Event;
pub use extractor::LogExtractor;
pub use fitness::FitnessEvaluator;
pub use genotype::{Genotype, GenotypeSpec};
pub use types::*;
