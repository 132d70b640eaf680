//! Static game data tables: weapon attack/cost tables, rarity rates and potential line pools.
//!
//! The built-in tables are the single source of these numbers in the crate;
//! a data file with the same shape can replace them at runtime.

use crate::error::ConfigError;
use crate::potential::{LinePool, LineStat, PotentialLine, PotentialType, Rarity, RarityUpgradeRate, SlotId};
use crate::weapon::Tier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Equipped attack % by tier, ordered t4, t3, t2, t1
type TierRow = [Option<f64>; 4];

/// One stat that can appear on a potential line, with its prime value per rarity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTemplate {
    pub stat: LineStat,
    /// Prime value at normal, rare, epic, unique, legendary, mystic
    pub values: [f64; 6],
    pub weight: f64,
}

/// Fixed-cost exception that bypasses the per-tier formula
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostOverride {
    pub rarity: Rarity,
    pub tier: Tier,
    pub cost: f64,
}

/// All lookup tables the calculator consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameData {
    pub weapon_base_attack: BTreeMap<Rarity, TierRow>,
    /// t4 cost per rarity before the 1.2^tier-steps multiplier
    pub upgrade_base_cost: BTreeMap<Rarity, f64>,
    pub upgrade_cost_overrides: Vec<CostOverride>,
    pub regular_rates: BTreeMap<Rarity, RarityUpgradeRate>,
    pub bonus_rates: BTreeMap<Rarity, RarityUpgradeRate>,
    pub general_lines: Vec<LineTemplate>,
    pub slot_lines: BTreeMap<SlotId, Vec<LineTemplate>>,
    /// Chance that line 1, 2, 3 rolls at the current rarity's (prime) value
    pub prime_chance: [f64; 3],
    /// Bonus potential values relative to regular ones
    pub bonus_value_factor: f64,
}

impl Default for GameData {
    fn default() -> Self {
        Self::builtin()
    }
}

impl GameData {
    /// The built-in data set
    pub fn builtin() -> Self {
        use Rarity::*;

        let weapon_base_attack = BTreeMap::from([
            (Normal, [Some(25.0), Some(30.0), Some(36.0), Some(43.0)]),
            (Rare, [Some(52.0), Some(62.0), Some(75.0), Some(90.0)]),
            (Epic, [Some(108.0), Some(130.0), Some(156.0), Some(187.0)]),
            (Unique, [Some(225.0), Some(270.0), Some(324.0), Some(389.0)]),
            (Legendary, [Some(467.0), Some(560.0), Some(672.0), Some(806.0)]),
            (Mystic, [Some(968.0), Some(1162.0), Some(1394.0), Some(1673.0)]),
            // no ancient t1 exists
            (Ancient, [Some(2008.0), Some(2410.0), Some(2892.0), None]),
        ]);

        let upgrade_base_cost = BTreeMap::from([
            (Normal, 100.0),
            (Rare, 250.0),
            (Epic, 800.0),
            (Unique, 3000.0),
            (Legendary, 12000.0),
            (Mystic, 40000.0),
            (Ancient, 50000.0),
        ]);

        let upgrade_cost_overrides = vec![
            CostOverride { rarity: Ancient, tier: Tier::T3, cost: 70000.0 },
            CostOverride { rarity: Ancient, tier: Tier::T2, cost: 120000.0 },
        ];

        let rates = BTreeMap::from([
            (Normal, RarityUpgradeRate { rate: 0.15, max: 10, next: Rare }),
            (Rare, RarityUpgradeRate { rate: 0.06, max: 30, next: Epic }),
            (Epic, RarityUpgradeRate { rate: 0.025, max: 70, next: Unique }),
            (Unique, RarityUpgradeRate { rate: 0.01, max: 150, next: Legendary }),
            (Legendary, RarityUpgradeRate { rate: 0.004, max: 400, next: Mystic }),
        ]);

        let t = |stat, values, weight| LineTemplate { stat, values, weight };
        let general_lines = vec![
            t(LineStat::Damage, [2.0, 4.0, 6.0, 9.0, 12.0, 15.0], 10.0),
            t(LineStat::BossDamage, [3.0, 6.0, 9.0, 13.0, 18.0, 24.0], 8.0),
            t(LineStat::NormalDamage, [3.0, 6.0, 9.0, 13.0, 18.0, 24.0], 8.0),
            t(LineStat::CritRate, [1.0, 2.0, 3.0, 5.0, 7.0, 9.0], 8.0),
            t(LineStat::MinDamage, [2.0, 4.0, 6.0, 8.0, 10.0, 12.0], 10.0),
            t(LineStat::MaxDamage, [2.0, 4.0, 6.0, 8.0, 10.0, 12.0], 10.0),
            t(LineStat::MainStat, [10.0, 20.0, 40.0, 80.0, 160.0, 320.0], 15.0),
            t(LineStat::Defense, [20.0, 40.0, 80.0, 160.0, 320.0, 640.0], 15.0),
            t(LineStat::Hp, [100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0], 16.0),
        ];

        let slot_lines = BTreeMap::from([
            (SlotId::Gloves, vec![t(LineStat::CritDamage, [2.0, 4.0, 7.0, 10.0, 14.0, 18.0], 8.0)]),
            (SlotId::Helmet, vec![t(LineStat::DefPen, [1.0, 2.0, 3.0, 5.0, 7.0, 9.0], 6.0)]),
            (SlotId::Cape, vec![t(LineStat::AttackSpeed, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 6.0)]),
            (SlotId::Ring, vec![t(LineStat::FinalDamage, [0.5, 1.0, 2.0, 3.0, 4.0, 5.0], 4.0)]),
            (SlotId::Necklace, vec![t(LineStat::FinalDamage, [0.5, 1.0, 2.0, 3.0, 4.0, 5.0], 4.0)]),
            (SlotId::Shoulder, vec![t(LineStat::Attack, [10.0, 20.0, 40.0, 70.0, 110.0, 160.0], 6.0)]),
        ]);

        Self {
            weapon_base_attack,
            upgrade_base_cost,
            upgrade_cost_overrides,
            regular_rates: rates.clone(),
            bonus_rates: rates,
            general_lines,
            slot_lines,
            prime_chance: [1.0, 0.2, 0.05],
            bonus_value_factor: 0.5,
        }
    }

    /// Load a data override from YAML or JSON (chosen by extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path)?;
        let path_str = path.as_ref().to_string_lossy().to_lowercase();

        let data: GameData = if path_str.ends_with(".json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        data.validate()?;
        Ok(data)
    }

    /// Reject tables the samplers cannot use: negative weights, rates or
    /// chances outside `0..=1`, and pity counters of zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = self.regular_rates.iter().chain(self.bonus_rates.iter());
        for (rarity, rate) in rates {
            if !(0.0..=1.0).contains(&rate.rate) || rate.max == 0 {
                return Err(ConfigError::Invalid(format!("upgrade rate for {} is out of range", rarity)));
            }
        }
        let mut templates = self.general_lines.iter().chain(self.slot_lines.values().flatten());
        if let Some(t) = templates.find(|t| t.weight < 0.0 || !t.weight.is_finite()) {
            return Err(ConfigError::Invalid(format!("line `{}` has weight {}", t.stat.label(), t.weight)));
        }
        if self.prime_chance.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(ConfigError::Invalid("prime_chance entries must be within 0..=1".to_string()));
        }
        Ok(())
    }

    /// Base equipped attack %, None for combinations that don't exist
    pub fn weapon_base_attack(&self, rarity: Rarity, tier: Tier) -> Option<f64> {
        let idx = (4 - tier.number()) as usize;
        self.weapon_base_attack.get(&rarity).and_then(|row| row[idx])
    }

    /// Tier-adjusted base upgrade cost; overrides win over the formula
    pub fn upgrade_tier_base_cost(&self, rarity: Rarity, tier: Tier) -> f64 {
        if let Some(o) = self
            .upgrade_cost_overrides
            .iter()
            .find(|o| o.rarity == rarity && o.tier == tier)
        {
            return o.cost;
        }
        self.upgrade_base_cost
            .get(&rarity)
            .map_or(0.0, |base| base * 1.2_f64.powi(tier.steps_above_base()))
    }

    pub fn upgrade_rate(&self, potential_type: PotentialType, rarity: Rarity) -> Option<&RarityUpgradeRate> {
        match potential_type {
            PotentialType::Regular => self.regular_rates.get(&rarity),
            PotentialType::Bonus => self.bonus_rates.get(&rarity),
        }
    }

    /// Build the line options for one rarity and slot: general templates
    /// followed by the slot's own templates.
    pub fn line_pool(&self, potential_type: PotentialType, rarity: Rarity, slot: SlotId) -> LinePool {
        let Some(idx) = rarity.potential_index() else {
            return LinePool::default();
        };
        let factor = match potential_type {
            PotentialType::Regular => 1.0,
            PotentialType::Bonus => self.bonus_value_factor,
        };
        let templates: Vec<&LineTemplate> = self
            .general_lines
            .iter()
            .chain(self.slot_lines.get(&slot).into_iter().flatten())
            .collect();

        let position = |prime_chance: f64| -> Vec<PotentialLine> {
            let mut options = Vec::with_capacity(templates.len() * 2);
            for tpl in &templates {
                let prime_value = tpl.values[idx] * factor;
                // below-prime rolls take the previous rarity's value; normal has none, so half
                let lower_value = if idx == 0 { prime_value / 2.0 } else { tpl.values[idx - 1] * factor };
                if prime_chance > 0.0 {
                    options.push(PotentialLine {
                        stat: tpl.stat,
                        value: prime_value,
                        weight: tpl.weight * prime_chance.min(1.0),
                        prime: true,
                    });
                }
                if prime_chance < 1.0 {
                    options.push(PotentialLine {
                        stat: tpl.stat,
                        value: lower_value,
                        weight: tpl.weight * (1.0 - prime_chance.max(0.0)),
                        prime: false,
                    });
                }
            }
            options
        };

        LinePool {
            line1: position(self.prime_chance[0]),
            line2: position(self.prime_chance[1]),
            line3: position(self.prime_chance[2]),
        }
    }
}

/// Pre-built line pools for every (type, rarity, slot), so sampling loops
/// never rebuild them.
#[derive(Debug, Clone, Default)]
pub struct PoolTable {
    pools: HashMap<(PotentialType, Rarity, SlotId), LinePool>,
}

impl PoolTable {
    pub fn build(data: &GameData) -> Self {
        let mut pools = HashMap::new();
        for potential_type in [PotentialType::Regular, PotentialType::Bonus] {
            for rarity in Rarity::POTENTIAL {
                for slot in SlotId::ALL {
                    pools.insert((potential_type, rarity, slot), data.line_pool(potential_type, rarity, slot));
                }
            }
        }
        Self { pools }
    }

    pub fn get(&self, potential_type: PotentialType, rarity: Rarity, slot: SlotId) -> Option<&LinePool> {
        self.pools.get(&(potential_type, rarity, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_weapon_entry() {
        let data = GameData::builtin();
        assert_eq!(data.weapon_base_attack(Rarity::Ancient, Tier::T1), None);
        assert_eq!(data.weapon_base_attack(Rarity::Epic, Tier::T4), Some(108.0));
    }

    #[test]
    fn test_tier_base_cost_and_overrides() {
        let data = GameData::builtin();
        assert!((data.upgrade_tier_base_cost(Rarity::Epic, Tier::T4) - 800.0).abs() < 1e-9);
        assert!((data.upgrade_tier_base_cost(Rarity::Epic, Tier::T2) - 800.0 * 1.44).abs() < 1e-9);
        assert_eq!(data.upgrade_tier_base_cost(Rarity::Ancient, Tier::T3), 70000.0);
        assert_eq!(data.upgrade_tier_base_cost(Rarity::Ancient, Tier::T2), 120000.0);
        assert!((data.upgrade_tier_base_cost(Rarity::Ancient, Tier::T4) - 50000.0).abs() < 1e-9);
    }

    #[test]
    fn test_line_pool_shape() {
        let data = GameData::builtin();
        let pool = data.line_pool(PotentialType::Regular, Rarity::Epic, SlotId::Gloves);
        let templates = data.general_lines.len() + 1;
        // line 1 is always prime; lines 2 and 3 carry both variants
        assert_eq!(pool.line1.len(), templates);
        assert_eq!(pool.line2.len(), templates * 2);
        assert!(pool.line1.iter().all(|l| l.prime));
        assert!(pool.line1.iter().any(|l| l.stat == LineStat::CritDamage));

        let belt = data.line_pool(PotentialType::Regular, Rarity::Epic, SlotId::Belt);
        assert!(belt.line1.iter().all(|l| l.stat != LineStat::CritDamage));
    }

    #[test]
    fn test_bonus_values_scaled() {
        let data = GameData::builtin();
        let regular = data.line_pool(PotentialType::Regular, Rarity::Unique, SlotId::Top);
        let bonus = data.line_pool(PotentialType::Bonus, Rarity::Unique, SlotId::Top);
        assert_eq!(bonus.line1[0].value, regular.line1[0].value * 0.5);
    }

    #[test]
    fn test_no_pool_for_ancient() {
        let data = GameData::builtin();
        assert!(data.line_pool(PotentialType::Regular, Rarity::Ancient, SlotId::Top).is_empty());
        assert!(data.upgrade_rate(PotentialType::Regular, Rarity::Mystic).is_none());
    }

    #[test]
    fn test_validate_rejects_bad_tables() {
        assert!(GameData::builtin().validate().is_ok());

        let mut data = GameData::builtin();
        data.general_lines[0].weight = -1.0;
        assert!(matches!(data.validate(), Err(ConfigError::Invalid(_))));

        let mut data = GameData::builtin();
        if let Some(rate) = data.bonus_rates.get_mut(&Rarity::Normal) {
            rate.max = 0;
        }
        assert!(data.validate().is_err());

        let mut data = GameData::builtin();
        data.prime_chance[2] = 1.5;
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_data_round_trips_through_yaml() {
        let data = GameData::builtin();
        let yaml = serde_yaml::to_string(&data).unwrap();
        let back: GameData = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(data, back);
    }
}
