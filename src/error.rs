//! Error types for the calculator core and its configuration loaders

use thiserror::Error;

use crate::potential::{Rarity, SlotId};

/// Errors surfaced by calculations and simulations.
///
/// Almost everything in the core recovers locally (missing data resolves to
/// zero). These are the cases a caller has to act on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("no character class selected; choose a class before running simulations")]
    NoClassSelected,

    #[error("operation cancelled after {completed} of {total} steps")]
    Cancelled { completed: usize, total: usize },

    #[error("rankings for {slot} at {rarity} are already being computed")]
    RankingInFlight { slot: SlotId, rarity: Rarity },

    #[error("histogram bin width must be positive and finite, got {width}")]
    InvalidBinWidth { width: f64 },

    #[error("simulation for strategy `{strategy}` failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },
}

/// Configuration / data file loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
