//! Weapon enhancement formulas: level multiplier, attack bonuses, costs and upgrade gain

use crate::game_data::GameData;
use crate::potential::Rarity;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Highest weapon level
pub const MAX_WEAPON_LEVEL: u32 = 200;

/// Max level by star count (index = stars)
pub const STAR_LEVEL_CAPS: [u32; 6] = [100, 120, 140, 160, 180, 200];

/// Relative excess over a whole number that still counts as float noise
const COST_NOISE_RELATIVE: f64 = 1e-12;

/// Safety bound for sequential level-up simulation
pub const UPGRADE_ITERATION_CAP: u32 = 300;

/// Weapon tier; t1 is the strongest, t4 the weakest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    T1,
    T2,
    T3,
    T4,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::T4, Tier::T3, Tier::T2, Tier::T1];

    pub fn number(self) -> u32 {
        match self {
            Tier::T1 => 1,
            Tier::T2 => 2,
            Tier::T3 => 3,
            Tier::T4 => 4,
        }
    }

    /// Steps above t4, the exponent of the per-tier cost multiplier
    pub fn steps_above_base(self) -> i32 {
        4 - self.number() as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::T1 => "t1",
            Tier::T2 => "t2",
            Tier::T3 => "t3",
            Tier::T4 => "t4",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "t1" | "1" => Ok(Tier::T1),
            "t2" | "2" => Ok(Tier::T2),
            "t3" | "3" => Ok(Tier::T3),
            "t4" | "4" => Ok(Tier::T4),
            _ => Err(format!("unknown tier `{}`", s)),
        }
    }
}

impl Serialize for Tier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Tier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| serde::de::Error::unknown_variant(&s, &["t1", "t2", "t3", "t4"]))
    }
}

/// Level bands of the attack multiplier: (last level of band, first level, bonus at first level, bonus per level)
const LEVEL_BANDS: [(u32, u32, f64, f64); 5] = [
    (100, 0, 0.0, 0.3),
    (130, 101, 30.3, 0.7),
    (155, 131, 51.3, 1.0),
    (175, 156, 76.3, 1.5),
    (200, 176, 106.3, 2.0),
];

/// Attack multiplier for a weapon level.
///
/// Level 1 and below is exactly 1.0; above 200 the value plateaus.
pub fn weapon_level_multiplier(level: u32) -> f64 {
    if level <= 1 {
        return 1.0;
    }
    let level = level.min(MAX_WEAPON_LEVEL);
    for (last, first, start_bonus, per_level) in LEVEL_BANDS {
        if level <= last {
            let bonus = start_bonus + per_level * (level - first) as f64;
            return 1.0 + bonus / 100.0;
        }
    }
    // unreachable after the clamp, kept total for safety
    1.0
}

/// Floor to one decimal place
fn floor_tenth(value: f64) -> f64 {
    // the epsilon keeps exact tenths like 12.3 (stored as 12.29999..) from dropping a step
    ((value * 10.0) + 1e-9).floor() / 10.0
}

/// Attack % bonuses a weapon grants
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeaponAttacks {
    /// Bonus while owned (every weapon in the inventory)
    pub inventory_attack: f64,
    /// Bonus while equipped
    pub equipped_attack: f64,
}

/// Divisor from equipped to inventory attack
pub fn inventory_divisor(rarity: Rarity) -> f64 {
    match rarity {
        Rarity::Legendary | Rarity::Mystic | Rarity::Ancient => 4.0,
        _ => 3.5,
    }
}

/// Equipped and inventory attack % for a weapon. Missing base data yields zeros.
pub fn calculate_weapon_attacks(rarity: Rarity, tier: Tier, level: u32, data: &GameData) -> WeaponAttacks {
    let Some(base) = data.weapon_base_attack(rarity, tier) else {
        return WeaponAttacks::default();
    };
    let equipped_attack = floor_tenth(base * weapon_level_multiplier(level));
    WeaponAttacks {
        inventory_attack: equipped_attack / inventory_divisor(rarity),
        equipped_attack,
    }
}

/// Max level allowed at a star count; more than 5 stars counts as 5
pub fn max_level_for_stars(stars: u32) -> u32 {
    STAR_LEVEL_CAPS[(stars as usize).min(STAR_LEVEL_CAPS.len() - 1)]
}

/// Compounding level multiplier on upgrade cost.
///
/// Each band continues from where the previous one ended, so a level in band
/// three pays the full first two bands plus its own part of band three.
pub fn upgrade_cost_level_multiplier(level: u32) -> f64 {
    let l = level as i32;
    let band = |from: i32, to: i32| (l.min(to) - from).max(0);
    1.01_f64.powi(band(0, 50))
        * 1.015_f64.powi(band(50, 100))
        * 1.02_f64.powi(band(100, 150))
        * 1.025_f64.powi((l - 150).max(0))
}

/// Cost to go from `level` to `level + 1`, always rounded up
pub fn upgrade_cost(rarity: Rarity, tier: Tier, level: u32, data: &GameData) -> u64 {
    let tier_base = data.upgrade_tier_base_cost(rarity, tier);
    if tier_base <= 0.0 {
        return 0;
    }
    let raw = tier_base * upgrade_cost_level_multiplier(level);
    // float noise just above an integer (1470.0000000001) snaps down; real fractions still round up
    let floor = raw.floor();
    if raw - floor <= raw * COST_NOISE_RELATIVE {
        floor as u64
    } else {
        raw.ceil() as u64
    }
}

/// A weapon as the upgrade planner sees it.
///
/// Loading goes through [`WeaponRecord`], so a stored level above the star
/// cap comes back clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WeaponRecord")]
pub struct WeaponState {
    pub rarity: Rarity,
    pub tier: Tier,
    pub level: u32,
    pub stars: u32,
    pub equipped: bool,
}

/// On-disk weapon shape, before caps are applied
#[derive(Debug, Clone, Copy, Deserialize)]
struct WeaponRecord {
    rarity: Rarity,
    tier: Tier,
    #[serde(default)]
    level: u32,
    #[serde(default)]
    stars: u32,
    #[serde(default)]
    equipped: bool,
}

impl From<WeaponRecord> for WeaponState {
    fn from(r: WeaponRecord) -> Self {
        let mut weapon = WeaponState { rarity: r.rarity, tier: r.tier, level: 0, stars: 0, equipped: r.equipped };
        weapon.set_stars(r.stars);
        weapon.set_level(r.level);
        if weapon.level != r.level {
            tracing::debug!(stored = r.level, capped = weapon.level, "weapon level clamped to star cap");
        }
        weapon
    }
}

impl WeaponState {
    pub fn new(rarity: Rarity, tier: Tier) -> Self {
        Self {
            rarity,
            tier,
            level: 1,
            stars: 0,
            equipped: false,
        }
    }

    pub fn max_level(&self) -> u32 {
        max_level_for_stars(self.stars)
    }

    /// Set level, clamped to the star cap
    pub fn set_level(&mut self, level: u32) {
        self.level = level.min(self.max_level());
    }

    /// Change stars; lowering stars clamps the level down
    pub fn set_stars(&mut self, stars: u32) {
        self.stars = stars.min(5);
        self.level = self.level.min(self.max_level());
    }

    pub fn can_level_up(&self) -> bool {
        self.level < self.max_level()
    }

    pub fn attacks(&self, data: &GameData) -> WeaponAttacks {
        calculate_weapon_attacks(self.rarity, self.tier, self.level, data)
    }

    pub fn next_level_cost(&self, data: &GameData) -> u64 {
        upgrade_cost(self.rarity, self.tier, self.level, data)
    }

    /// Attack gained from one more level: inventory always, equipped only if equipped
    pub fn single_level_gain(&self, data: &GameData) -> (f64, f64) {
        let now = self.attacks(data);
        let next = calculate_weapon_attacks(self.rarity, self.tier, self.level + 1, data);
        (
            next.inventory_attack - now.inventory_attack,
            next.equipped_attack - now.equipped_attack,
        )
    }

    /// Attack % gain a level-up is worth to the planner
    pub fn scored_gain(&self, inventory_gain: f64, equipped_gain: f64) -> f64 {
        if self.equipped {
            inventory_gain + equipped_gain
        } else {
            inventory_gain
        }
    }
}

/// Outcome of spending a resource pile on one weapon
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UpgradeGain {
    pub levels_gained: u32,
    pub new_level: u32,
    pub inventory_gain: f64,
    pub equipped_gain: f64,
    pub resources_used: u64,
    /// Scored attack % per 1000 resources
    pub efficiency: f64,
    /// The very next level costs more than the resources on hand
    pub is_unaffordable: bool,
    /// Cost of the next level, set when unaffordable
    pub single_level_cost: u64,
}

impl UpgradeGain {
    pub fn attack_gain(&self, equipped: bool) -> f64 {
        if equipped {
            self.inventory_gain + self.equipped_gain
        } else {
            self.inventory_gain
        }
    }
}

/// Gain per 1000 resources, 0 for a zero cost
pub fn efficiency_per_thousand(gain: f64, cost: u64) -> f64 {
    if cost == 0 {
        0.0
    } else {
        gain / cost as f64 * 1000.0
    }
}

/// Level a weapon as far as `resources` allow.
///
/// When not even the next level is affordable the result is flagged
/// `is_unaffordable` and carries that level's cost and gain, so callers can
/// still rank it per 1000 resources.
pub fn calculate_upgrade_gain(weapon: &WeaponState, resources: u64, data: &GameData) -> UpgradeGain {
    let max_level = weapon.max_level();
    if weapon.level >= max_level {
        return UpgradeGain {
            new_level: weapon.level,
            ..UpgradeGain::default()
        };
    }

    let start = weapon.attacks(data);
    let next_cost = weapon.next_level_cost(data);

    if next_cost > resources {
        let (inventory_gain, equipped_gain) = weapon.single_level_gain(data);
        let gain = weapon.scored_gain(inventory_gain, equipped_gain);
        return UpgradeGain {
            levels_gained: 0,
            new_level: weapon.level,
            inventory_gain,
            equipped_gain,
            resources_used: 0,
            efficiency: efficiency_per_thousand(gain, next_cost),
            is_unaffordable: true,
            single_level_cost: next_cost,
        };
    }

    let mut level = weapon.level;
    let mut remaining = resources;
    let mut used = 0u64;
    let mut iterations = 0u32;

    while level < max_level && iterations < UPGRADE_ITERATION_CAP {
        iterations += 1;
        let cost = upgrade_cost(weapon.rarity, weapon.tier, level, data);
        if cost > remaining {
            break;
        }
        remaining -= cost;
        used += cost;
        level += 1;
    }
    if iterations >= UPGRADE_ITERATION_CAP {
        tracing::warn!(level, "upgrade simulation hit its iteration cap");
    }

    let end = calculate_weapon_attacks(weapon.rarity, weapon.tier, level, data);
    let inventory_gain = end.inventory_attack - start.inventory_attack;
    let equipped_gain = end.equipped_attack - start.equipped_attack;

    UpgradeGain {
        levels_gained: level - weapon.level,
        new_level: level,
        inventory_gain,
        equipped_gain,
        resources_used: used,
        efficiency: efficiency_per_thousand(weapon.scored_gain(inventory_gain, equipped_gain), used),
        is_unaffordable: false,
        single_level_cost: 0,
    }
}

/// The player's weapons; at most one is equipped at a time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Armory {
    weapons: Vec<WeaponState>,
}

impl Armory {
    /// Build from a list, keeping only the first weapon flagged equipped.
    /// Levels above a weapon's star cap are clamped.
    pub fn new(mut weapons: Vec<WeaponState>) -> Self {
        for w in &mut weapons {
            w.set_stars(w.stars);
        }
        let mut armory = Self { weapons };
        if let Some(first) = armory.weapons.iter().position(|w| w.equipped) {
            armory.equip(first);
        }
        armory
    }

    pub fn weapons(&self) -> &[WeaponState] {
        &self.weapons
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut WeaponState> {
        self.weapons.get_mut(index)
    }

    /// Equip one weapon, un-equipping every other. Out of range is a no-op.
    pub fn equip(&mut self, index: usize) {
        if index >= self.weapons.len() {
            return;
        }
        for (i, w) in self.weapons.iter_mut().enumerate() {
            w.equipped = i == index;
        }
    }

    pub fn equipped(&self) -> Option<&WeaponState> {
        self.weapons.iter().find(|w| w.equipped)
    }

    /// Total inventory attack % plus the equipped weapon's bonus
    pub fn total_attack_percent(&self, data: &GameData) -> f64 {
        self.weapons
            .iter()
            .map(|w| {
                let a = w.attacks(data);
                if w.equipped {
                    a.inventory_attack + a.equipped_attack
                } else {
                    a.inventory_attack
                }
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_bands() {
        assert_eq!(weapon_level_multiplier(0), 1.0);
        assert_eq!(weapon_level_multiplier(1), 1.0);
        assert!((weapon_level_multiplier(100) - 1.30).abs() < 1e-12);
        assert!((weapon_level_multiplier(101) - 1.303).abs() < 1e-12);
        assert!((weapon_level_multiplier(130) - 1.506).abs() < 1e-12);
        assert!((weapon_level_multiplier(200) - 2.543).abs() < 1e-12);
        assert_eq!(weapon_level_multiplier(250), weapon_level_multiplier(200));
    }

    #[test]
    fn test_bands_are_continuous() {
        // each band picks up roughly where the previous left off
        for level in 2..=MAX_WEAPON_LEVEL {
            let step = weapon_level_multiplier(level) - weapon_level_multiplier(level - 1);
            assert!(step > 0.0 && step <= 0.021, "level {} step {}", level, step);
        }
    }

    #[test]
    fn test_floor_tenth() {
        assert_eq!(floor_tenth(12.47), 12.4);
        assert_eq!(floor_tenth(12.3), 12.3);
        assert_eq!(floor_tenth(0.09), 0.0);
    }

    #[test]
    fn test_star_caps_and_clamping() {
        assert_eq!(max_level_for_stars(0), 100);
        assert_eq!(max_level_for_stars(5), 200);
        assert_eq!(max_level_for_stars(9), 200);

        let mut w = WeaponState::new(Rarity::Epic, Tier::T3);
        w.set_stars(3);
        w.set_level(170);
        assert_eq!(w.level, 160);
        w.set_stars(1);
        assert_eq!(w.level, 120);
    }

    #[test]
    fn test_cost_multiplier_chains_bands() {
        let m100 = upgrade_cost_level_multiplier(100);
        let expected = 1.01_f64.powi(50) * 1.015_f64.powi(50);
        assert!((m100 - expected).abs() < 1e-12);
        let m160 = upgrade_cost_level_multiplier(160);
        let expected = expected * 1.02_f64.powi(50) * 1.025_f64.powi(10);
        assert!((m160 - expected).abs() < 1e-9);
    }

    #[test]
    fn test_armory_single_equipped() {
        let mut a = WeaponState::new(Rarity::Rare, Tier::T4);
        a.equipped = true;
        let mut b = WeaponState::new(Rarity::Epic, Tier::T4);
        b.equipped = true;
        let mut armory = Armory::new(vec![a, b]);
        assert_eq!(armory.weapons().iter().filter(|w| w.equipped).count(), 1);
        assert_eq!(armory.equipped().map(|w| w.rarity), Some(Rarity::Rare));

        armory.equip(1);
        assert_eq!(armory.equipped().map(|w| w.rarity), Some(Rarity::Epic));
        armory.equip(7);
        assert_eq!(armory.equipped().map(|w| w.rarity), Some(Rarity::Epic));
    }
}
