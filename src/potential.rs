//! Cube potentials: rarities, lines, sets, slot state and the random rolls behind them

use crate::aggregate::{StatAggregate, StatKey};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Item / potential rarity, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rarity {
    Normal,
    Rare,
    Epic,
    Unique,
    Legendary,
    Mystic,
    Ancient,
}

impl Rarity {
    pub const ALL: [Rarity; 7] = [
        Rarity::Normal,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Unique,
        Rarity::Legendary,
        Rarity::Mystic,
        Rarity::Ancient,
    ];

    /// Rarities a cube potential can have
    pub const POTENTIAL: [Rarity; 6] = [
        Rarity::Normal,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Unique,
        Rarity::Legendary,
        Rarity::Mystic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Rarity::Normal => "normal",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Unique => "unique",
            Rarity::Legendary => "legendary",
            Rarity::Mystic => "mystic",
            Rarity::Ancient => "ancient",
        }
    }

    /// Position within [`Rarity::POTENTIAL`], None for ancient
    pub fn potential_index(self) -> Option<usize> {
        Rarity::POTENTIAL.iter().position(|&r| r == self)
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Rarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Rarity::ALL
            .iter()
            .copied()
            .find(|r| r.name() == lower)
            .ok_or_else(|| format!("unknown rarity `{}`", s))
    }
}

impl Serialize for Rarity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// Case-insensitive, same as stat keys
impl<'de> Deserialize<'de> for Rarity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            serde::de::Error::unknown_variant(
                &s,
                &["normal", "rare", "epic", "unique", "legendary", "mystic", "ancient"],
            )
        })
    }
}

/// Equipment slot that carries potentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotId {
    Helmet,
    Cape,
    Top,
    Bottom,
    Shoulder,
    Belt,
    Gloves,
    Shoes,
    Ring,
    Necklace,
    Face,
}

impl SlotId {
    pub const ALL: [SlotId; 11] = [
        SlotId::Helmet,
        SlotId::Cape,
        SlotId::Top,
        SlotId::Bottom,
        SlotId::Shoulder,
        SlotId::Belt,
        SlotId::Gloves,
        SlotId::Shoes,
        SlotId::Ring,
        SlotId::Necklace,
        SlotId::Face,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SlotId::Helmet => "helmet",
            SlotId::Cape => "cape",
            SlotId::Top => "top",
            SlotId::Bottom => "bottom",
            SlotId::Shoulder => "shoulder",
            SlotId::Belt => "belt",
            SlotId::Gloves => "gloves",
            SlotId::Shoes => "shoes",
            SlotId::Ring => "ring",
            SlotId::Necklace => "necklace",
            SlotId::Face => "face",
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for SlotId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        SlotId::ALL
            .iter()
            .copied()
            .find(|slot| slot.name() == lower)
            .ok_or_else(|| format!("unknown slot `{}`", s))
    }
}

/// Regular potentials and bonus potentials roll from separate tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PotentialType {
    #[default]
    Regular,
    Bonus,
}

/// Stat a potential line grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStat {
    Damage,
    BossDamage,
    NormalDamage,
    CritRate,
    CritDamage,
    FinalDamage,
    MinDamage,
    MaxDamage,
    DefPen,
    AttackSpeed,
    Attack,
    MainStat,
    Defense,
    Hp,
}

impl LineStat {
    /// Aggregate key this line feeds, None for stats the engine ignores
    pub fn stat_key(self) -> Option<StatKey> {
        match self {
            LineStat::Damage => Some(StatKey::Damage),
            LineStat::BossDamage => Some(StatKey::BossDamage),
            LineStat::NormalDamage => Some(StatKey::NormalDamage),
            LineStat::CritRate => Some(StatKey::CritRate),
            LineStat::CritDamage => Some(StatKey::CritDamage),
            LineStat::FinalDamage => Some(StatKey::FinalDamage),
            LineStat::MinDamage => Some(StatKey::MinDamage),
            LineStat::MaxDamage => Some(StatKey::MaxDamage),
            LineStat::DefPen => Some(StatKey::DefPen),
            LineStat::AttackSpeed => Some(StatKey::AttackSpeed),
            LineStat::Attack => Some(StatKey::Attack),
            LineStat::MainStat => Some(StatKey::PrimaryMainStat),
            LineStat::Defense => Some(StatKey::Defense),
            LineStat::Hp => None,
        }
    }

    pub fn is_percent(self) -> bool {
        !matches!(self, LineStat::Attack | LineStat::MainStat | LineStat::Defense | LineStat::Hp)
    }

    /// Display label; percent stats carry a `%` suffix
    pub fn label(self) -> String {
        let base = match self {
            LineStat::Damage => "Damage",
            LineStat::BossDamage => "Boss Damage",
            LineStat::NormalDamage => "Normal Monster Damage",
            LineStat::CritRate => "Critical Rate",
            LineStat::CritDamage => "Critical Damage",
            LineStat::FinalDamage => "Final Damage",
            LineStat::MinDamage => "Min Damage Multiplier",
            LineStat::MaxDamage => "Max Damage Multiplier",
            LineStat::DefPen => "Defense Penetration",
            LineStat::AttackSpeed => "Attack Speed",
            LineStat::Attack => "Attack",
            LineStat::MainStat => "Main Stat",
            LineStat::Defense => "Defense",
            LineStat::Hp => "HP",
        };
        if self.is_percent() {
            format!("{} %", base)
        } else {
            base.to_string()
        }
    }
}

/// One rollable potential line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PotentialLine {
    pub stat: LineStat,
    pub value: f64,
    /// Relative roll probability within its pool
    pub weight: f64,
    #[serde(default)]
    pub prime: bool,
}

impl PotentialLine {
    fn signature_part(&self) -> String {
        format!("{:?}|{}|{}", self.stat, self.value, self.prime)
    }
}

/// Three lines rolled together
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PotentialSet {
    pub line1: PotentialLine,
    pub line2: PotentialLine,
    pub line3: PotentialLine,
}

impl PotentialSet {
    pub fn lines(&self) -> [&PotentialLine; 3] {
        [&self.line1, &self.line2, &self.line3]
    }

    /// Stat delta granted by the three lines
    pub fn contribution(&self) -> StatAggregate {
        let mut delta = StatAggregate::delta();
        self.add_to(&mut delta);
        delta
    }

    /// Add the lines' stats onto an existing aggregate
    pub fn add_to(&self, stats: &mut StatAggregate) {
        for line in self.lines() {
            if let Some(key) = line.stat.stat_key() {
                stats.add(key, line.value);
            }
        }
    }

    /// Order-independent identity: reorderings of the same lines collide
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self.lines().iter().map(|l| l.signature_part()).collect();
        parts.sort();
        parts.join(",")
    }
}

/// Tier-up odds for one rarity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RarityUpgradeRate {
    /// Probability of a tier-up on any single roll
    pub rate: f64,
    /// Pity: the roll that brings the count to `max` always upgrades
    pub max: u32,
    pub next: Rarity,
}

impl RarityUpgradeRate {
    /// Chance that the next roll upgrades, given rolls already spent at this rarity
    pub fn tier_up_probability(&self, roll_count: u32) -> f64 {
        if roll_count + 1 >= self.max {
            1.0
        } else {
            self.rate.clamp(0.0, 1.0)
        }
    }
}

/// Chance that the next roll upgrades; 0 at the top rarity
pub fn tier_up_probability(rate: Option<&RarityUpgradeRate>, roll_count: u32) -> f64 {
    rate.map_or(0.0, |r| r.tier_up_probability(roll_count))
}

/// Rarity progress of one potential type on a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialState {
    pub rarity: Rarity,
    /// Rolls spent at the current rarity
    #[serde(default)]
    pub roll_count: u32,
    /// Currently equipped lines
    #[serde(default)]
    pub set_a: Option<PotentialSet>,
    /// Hypothetical lines for comparison
    #[serde(default)]
    pub set_b: Option<PotentialSet>,
}

impl Default for PotentialState {
    fn default() -> Self {
        Self {
            rarity: Rarity::Normal,
            roll_count: 0,
            set_a: None,
            set_b: None,
        }
    }
}

impl PotentialState {
    /// Spend one roll's worth of pity. Returns true when the rarity moved up;
    /// roll_count is back at zero whenever that happens.
    pub fn roll_rarity(&mut self, rate: Option<&RarityUpgradeRate>, rng: &mut impl Rng) -> bool {
        let Some(rate) = rate else {
            self.roll_count += 1;
            return false;
        };
        let forced = self.roll_count + 1 >= rate.max;
        if forced || rng.gen::<f64>() < rate.rate {
            self.rarity = rate.next;
            self.roll_count = 0;
            true
        } else {
            self.roll_count += 1;
            false
        }
    }

    /// Set the rarity directly; resets pity whenever the rarity changes
    pub fn set_rarity(&mut self, rarity: Rarity) {
        if rarity != self.rarity {
            self.rarity = rarity;
            self.roll_count = 0;
        }
    }
}

/// Per-slot cube state for both potential types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeSlotData {
    pub slot: SlotId,
    #[serde(default)]
    pub regular: PotentialState,
    #[serde(default)]
    pub bonus: PotentialState,
}

impl CubeSlotData {
    pub fn new(slot: SlotId) -> Self {
        Self {
            slot,
            regular: PotentialState::default(),
            bonus: PotentialState::default(),
        }
    }

    pub fn state(&self, potential_type: PotentialType) -> &PotentialState {
        match potential_type {
            PotentialType::Regular => &self.regular,
            PotentialType::Bonus => &self.bonus,
        }
    }

    pub fn state_mut(&mut self, potential_type: PotentialType) -> &mut PotentialState {
        match potential_type {
            PotentialType::Regular => &mut self.regular,
            PotentialType::Bonus => &mut self.bonus,
        }
    }
}

/// Anything drawable by relative weight
pub trait Weighted {
    fn weight(&self) -> f64;
}

impl Weighted for PotentialLine {
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// Cumulative-weight draw.
///
/// Picks `r` in `[0, total)` and walks the options in order subtracting each
/// weight until `r <= 0`, so ties favour earlier options. The last option is
/// the fallback when rounding overshoots.
pub fn sample_weighted<'a, T: Weighted>(options: &'a [T], rng: &mut impl Rng) -> Option<&'a T> {
    let last = options.last()?;
    let total: f64 = options.iter().map(|o| o.weight().max(0.0)).sum();
    if total <= 0.0 {
        return Some(last);
    }
    let mut r = rng.gen::<f64>() * total;
    for option in options {
        r -= option.weight().max(0.0);
        if r <= 0.0 {
            return Some(option);
        }
    }
    Some(last)
}

/// Options for each of the three line positions at one rarity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinePool {
    pub line1: Vec<PotentialLine>,
    pub line2: Vec<PotentialLine>,
    pub line3: Vec<PotentialLine>,
}

impl LinePool {
    pub fn is_empty(&self) -> bool {
        self.line1.is_empty() || self.line2.is_empty() || self.line3.is_empty()
    }

    /// Number of ordered combinations in the full cross product
    pub fn combination_count(&self) -> usize {
        self.line1.len() * self.line2.len() * self.line3.len()
    }

    /// Roll three lines; None if any position has no options
    pub fn sample_set(&self, rng: &mut impl Rng) -> Option<PotentialSet> {
        Some(PotentialSet {
            line1: *sample_weighted(&self.line1, rng)?,
            line2: *sample_weighted(&self.line2, rng)?,
            line3: *sample_weighted(&self.line3, rng)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn line(stat: LineStat, value: f64, weight: f64) -> PotentialLine {
        PotentialLine { stat, value, weight, prime: false }
    }

    #[test]
    fn test_pity_forces_upgrade() {
        let rate = RarityUpgradeRate { rate: 0.0, max: 10, next: Rarity::Epic };
        assert_eq!(rate.tier_up_probability(9), 1.0);
        assert_eq!(rate.tier_up_probability(8), 0.0);

        let mut state = PotentialState { rarity: Rarity::Rare, roll_count: 9, set_a: None, set_b: None };
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(state.roll_rarity(Some(&rate), &mut rng));
        assert_eq!(state.rarity, Rarity::Epic);
        assert_eq!(state.roll_count, 0);
    }

    #[test]
    fn test_roll_without_upgrade_counts_up() {
        let rate = RarityUpgradeRate { rate: 0.0, max: 10, next: Rarity::Epic };
        let mut state = PotentialState::default();
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(!state.roll_rarity(Some(&rate), &mut rng));
        assert_eq!(state.roll_count, 1);
        assert!(!state.roll_rarity(None, &mut rng));
        assert_eq!(state.rarity, Rarity::Normal);
    }

    #[test]
    fn test_set_rarity_resets_pity() {
        let mut state = PotentialState { roll_count: 7, ..PotentialState::default() };
        state.set_rarity(Rarity::Normal);
        assert_eq!(state.roll_count, 7);
        state.set_rarity(Rarity::Rare);
        assert_eq!(state.roll_count, 0);
    }

    #[test]
    fn test_weighted_sampling_respects_weights() {
        let options = [line(LineStat::Damage, 1.0, 0.0), line(LineStat::CritRate, 1.0, 5.0)];
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..200 {
            let picked = sample_weighted(&options, &mut rng).unwrap();
            assert_eq!(picked.stat, LineStat::CritRate);
        }
        let empty: [PotentialLine; 0] = [];
        assert!(sample_weighted(&empty, &mut rng).is_none());
    }

    #[test]
    fn test_weighted_sampling_distribution() {
        let options = [line(LineStat::Damage, 1.0, 3.0), line(LineStat::CritRate, 1.0, 1.0)];
        let mut rng = SmallRng::seed_from_u64(7);
        let n = 20_000;
        let hits = (0..n)
            .filter(|_| sample_weighted(&options, &mut rng).unwrap().stat == LineStat::Damage)
            .count();
        let share = hits as f64 / n as f64;
        assert!((share - 0.75).abs() < 0.02, "share {}", share);
    }

    #[test]
    fn test_signature_ignores_order() {
        let a = line(LineStat::Damage, 9.0, 1.0);
        let b = line(LineStat::BossDamage, 12.0, 1.0);
        let c = line(LineStat::CritRate, 3.0, 1.0);
        let abc = PotentialSet { line1: a, line2: b, line3: c };
        let cab = PotentialSet { line1: c, line2: a, line3: b };
        assert_eq!(abc.signature(), cab.signature());

        let prime_c = PotentialLine { prime: true, ..c };
        let abc_prime = PotentialSet { line1: a, line2: b, line3: prime_c };
        assert_ne!(abc.signature(), abc_prime.signature());
    }

    #[test]
    fn test_contribution_skips_non_damage_lines() {
        let set = PotentialSet {
            line1: line(LineStat::Damage, 9.0, 1.0),
            line2: line(LineStat::Damage, 6.0, 1.0),
            line3: line(LineStat::Hp, 500.0, 1.0),
        };
        let delta = set.contribution();
        assert_eq!(delta.get(StatKey::Damage), 15.0);
        assert_eq!(delta.non_zero().count(), 1);
    }

    #[test]
    fn test_rarity_parse_and_order() {
        assert_eq!("Legendary".parse::<Rarity>(), Ok(Rarity::Legendary));
        assert!(Rarity::Mystic > Rarity::Unique);
        assert_eq!(Rarity::Ancient.potential_index(), None);
        assert_eq!(Rarity::Epic.potential_index(), Some(2));
    }
}
