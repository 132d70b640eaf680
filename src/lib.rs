//! DPS Forge - damage and theorycrafting calculator
//!
//! A stat-aggregation and damage engine, plus the Monte-Carlo and
//! combinatorial layers built on it: cube potential expected value, cube and
//! scroll strategy simulation, and weapon upgrade planning.

pub mod aggregate;
pub mod config;
pub mod cube;
pub mod cube_strategy;
pub mod damage;
pub mod error;
pub mod game_data;
pub mod potential;
pub mod progress;
pub mod ranking_cache;
pub mod scroll;
pub mod simulation;
pub mod stats;
pub mod upgrade_planner;
pub mod weapon;

#[cfg(feature = "python")]
mod python;

pub use aggregate::*;
pub use config::*;
pub use cube::*;
pub use cube_strategy::*;
pub use damage::*;
pub use error::*;
pub use game_data::*;
pub use potential::*;
pub use progress::*;
pub use ranking_cache::*;
pub use scroll::*;
pub use simulation::*;
pub use stats::*;
pub use upgrade_planner::*;
pub use weapon::*;
