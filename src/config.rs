//! Calculator input files (YAML or JSON)

use crate::aggregate::StatAggregate;
use crate::cube_strategy::CubeSimulationRequest;
use crate::damage::{AttackKind, DamageContext, Target};
use crate::error::ConfigError;
use crate::scroll::ScrollSimulationRequest;
use crate::weapon::{Armory, WeaponState};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;

/// Character class. Simulations refuse to run without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobClass {
    Warrior,
    Mage,
    Archer,
    Thief,
    Pirate,
}

impl JobClass {
    pub const ALL: [JobClass; 5] = [JobClass::Warrior, JobClass::Mage, JobClass::Archer, JobClass::Thief, JobClass::Pirate];

    pub fn name(self) -> &'static str {
        match self {
            JobClass::Warrior => "warrior",
            JobClass::Mage => "mage",
            JobClass::Archer => "archer",
            JobClass::Thief => "thief",
            JobClass::Pirate => "pirate",
        }
    }
}

// Custom deserializer for case-insensitive matching
impl<'de> Deserialize<'de> for JobClass {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let lower = s.to_lowercase();
        JobClass::ALL
            .iter()
            .copied()
            .find(|c| c.name() == lower)
            .ok_or_else(|| serde::de::Error::unknown_variant(&s, &["warrior", "mage", "archer", "thief", "pirate"]))
    }
}

/// Full calculator input.
///
/// Every section is optional; missing sections take their defaults so a
/// half-filled file still computes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorConfig {
    pub class: Option<JobClass>,
    pub target: Target,
    /// Enemy defense in percent
    pub enemy_defense: f64,
    pub attack_kind: AttackKind,
    pub stats: StatAggregate,
    pub weapons: Vec<WeaponState>,
    /// Currency available to the upgrade planner
    pub upgrade_budget: u64,
    pub cube: CubeSimulationRequest,
    pub scroll: ScrollSimulationRequest,
}

impl CalculatorConfig {
    /// Load from YAML or JSON (chosen by extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path)?;
        let path_str = path.as_ref().to_string_lossy().to_lowercase();

        let config = if path_str.ends_with(".json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(config)
    }

    /// Load from a JSON string (for Python interop)
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn context(&self) -> DamageContext {
        DamageContext::new(self.target)
            .with_defense(self.enemy_defense)
            .with_attack_kind(self.attack_kind)
    }

    pub fn armory(&self) -> Armory {
        Armory::new(self.weapons.clone())
    }

    /// Cube request with the top-level class filled in when the section has none
    pub fn cube_request(&self) -> CubeSimulationRequest {
        let mut request = self.cube.clone();
        request.class = request.class.or(self.class);
        request
    }

    pub fn scroll_request(&self) -> ScrollSimulationRequest {
        let mut request = self.scroll.clone();
        request.class = request.class.or(self.class);
        request
    }
}
