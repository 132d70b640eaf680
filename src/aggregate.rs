//! StatAggregate - the flat bag of named stat contributions consumed by the damage engine

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Every stat the engine knows about.
///
/// Percentage stats are stored as plain percent numbers (30 means 30%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatKey {
    Attack,
    CritRate,
    CritDamage,
    StatDamage,
    Damage,
    BossDamage,
    NormalDamage,
    FinalDamage,
    DamageAmp,
    SkillCoefficient,
    Mastery,
    BossMastery,
    AttackSpeed,
    MinDamage,
    MaxDamage,
    DefPen,
    PrimaryMainStat,
    SecondaryMainStat,
    Defense,
    BasicAttackDamage,
    SkillDamage,
    SkillLevel1st,
    SkillLevel2nd,
    SkillLevel3rd,
    SkillLevel4th,
    AllSkillLevel,
}

impl StatKey {
    pub const COUNT: usize = 26;

    pub const ALL: [StatKey; StatKey::COUNT] = [
        StatKey::Attack,
        StatKey::CritRate,
        StatKey::CritDamage,
        StatKey::StatDamage,
        StatKey::Damage,
        StatKey::BossDamage,
        StatKey::NormalDamage,
        StatKey::FinalDamage,
        StatKey::DamageAmp,
        StatKey::SkillCoefficient,
        StatKey::Mastery,
        StatKey::BossMastery,
        StatKey::AttackSpeed,
        StatKey::MinDamage,
        StatKey::MaxDamage,
        StatKey::DefPen,
        StatKey::PrimaryMainStat,
        StatKey::SecondaryMainStat,
        StatKey::Defense,
        StatKey::BasicAttackDamage,
        StatKey::SkillDamage,
        StatKey::SkillLevel1st,
        StatKey::SkillLevel2nd,
        StatKey::SkillLevel3rd,
        StatKey::SkillLevel4th,
        StatKey::AllSkillLevel,
    ];

    /// Canonical upper-case name used in snapshots
    pub fn name(self) -> &'static str {
        match self {
            StatKey::Attack => "ATTACK",
            StatKey::CritRate => "CRIT_RATE",
            StatKey::CritDamage => "CRIT_DAMAGE",
            StatKey::StatDamage => "STAT_DAMAGE",
            StatKey::Damage => "DAMAGE",
            StatKey::BossDamage => "BOSS_DAMAGE",
            StatKey::NormalDamage => "NORMAL_DAMAGE",
            StatKey::FinalDamage => "FINAL_DAMAGE",
            StatKey::DamageAmp => "DAMAGE_AMP",
            StatKey::SkillCoefficient => "SKILL_COEFFICIENT",
            StatKey::Mastery => "MASTERY",
            StatKey::BossMastery => "BOSS_MASTERY",
            StatKey::AttackSpeed => "ATTACK_SPEED",
            StatKey::MinDamage => "MIN_DAMAGE",
            StatKey::MaxDamage => "MAX_DAMAGE",
            StatKey::DefPen => "DEF_PEN",
            StatKey::PrimaryMainStat => "PRIMARY_MAIN_STAT",
            StatKey::SecondaryMainStat => "SECONDARY_MAIN_STAT",
            StatKey::Defense => "DEFENSE",
            StatKey::BasicAttackDamage => "BASIC_ATTACK_DAMAGE",
            StatKey::SkillDamage => "SKILL_DAMAGE",
            StatKey::SkillLevel1st => "SKILL_LEVEL_1ST",
            StatKey::SkillLevel2nd => "SKILL_LEVEL_2ND",
            StatKey::SkillLevel3rd => "SKILL_LEVEL_3RD",
            StatKey::SkillLevel4th => "SKILL_LEVEL_4TH",
            StatKey::AllSkillLevel => "ALL_SKILL_LEVEL",
        }
    }

    /// Value a key takes when nothing has set it
    pub fn default_value(self) -> f64 {
        match self {
            StatKey::MinDamage => 65.0,
            StatKey::MaxDamage => 100.0,
            StatKey::CritDamage => 30.0,
            _ => 0.0,
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for StatKey {
    type Err = String;

    // Case-insensitive so snapshots written as `crit_rate` or `CRIT_RATE` both load
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        StatKey::ALL
            .iter()
            .copied()
            .find(|k| k.name() == upper)
            .ok_or_else(|| format!("unknown stat key `{}`", s))
    }
}

impl Serialize for StatKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for StatKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Dense stat snapshot indexed by [`StatKey`].
///
/// Created fresh from a source snapshot for each computation. Readers never
/// mutate it in place; the calculator keeps its own working copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<StatKey, f64>")]
pub struct StatAggregate {
    values: [f64; StatKey::COUNT],
}

impl Default for StatAggregate {
    fn default() -> Self {
        Self::new()
    }
}

impl StatAggregate {
    /// Aggregate with every key at its documented default
    pub fn new() -> Self {
        let mut values = [0.0; StatKey::COUNT];
        for key in StatKey::ALL {
            values[key.index()] = key.default_value();
        }
        Self { values }
    }

    /// All-zero aggregate, used to build contribution deltas
    pub fn delta() -> Self {
        Self { values: [0.0; StatKey::COUNT] }
    }

    /// Build from `(key, value)` pairs on top of the defaults
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (StatKey, f64)>,
    {
        let mut agg = Self::new();
        for (key, value) in pairs {
            agg.set(key, value);
        }
        agg
    }

    #[inline]
    pub fn get(&self, key: StatKey) -> f64 {
        self.values[key.index()]
    }

    #[inline]
    pub fn set(&mut self, key: StatKey, value: f64) {
        self.values[key.index()] = value;
    }

    #[inline]
    pub fn add(&mut self, key: StatKey, value: f64) {
        self.values[key.index()] += value;
    }

    /// Add every key of `other` onto this aggregate
    pub fn merge(&mut self, other: &StatAggregate) {
        for (slot, v) in self.values.iter_mut().zip(other.values.iter()) {
            *slot += v;
        }
    }

    /// Subtract every key of `other` from this aggregate
    pub fn unmerge(&mut self, other: &StatAggregate) {
        for (slot, v) in self.values.iter_mut().zip(other.values.iter()) {
            *slot -= v;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatKey, f64)> + '_ {
        StatKey::ALL.iter().map(move |&k| (k, self.get(k)))
    }

    /// Keys whose value differs from zero (useful for printing deltas)
    pub fn non_zero(&self) -> impl Iterator<Item = (StatKey, f64)> + '_ {
        self.iter().filter(|(_, v)| *v != 0.0)
    }
}

// Two spellings of one key (`ATTACK` and `attack`) are rejected rather than
// resolved by map order
impl TryFrom<BTreeMap<String, f64>> for StatAggregate {
    type Error = String;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        let mut agg = StatAggregate::new();
        let mut seen: [Option<String>; StatKey::COUNT] = std::array::from_fn(|_| None);
        for (name, value) in raw {
            let Ok(key) = name.parse::<StatKey>() else {
                tracing::debug!(stat = %name, "ignoring unknown stat key");
                continue;
            };
            if let Some(first) = &seen[key.index()] {
                return Err(format!("stat {} given twice (`{}` and `{}`)", key, first, name));
            }
            if value.is_finite() {
                agg.set(key, value);
            } else {
                tracing::debug!(%key, value, "dropping non-finite stat value");
            }
            seen[key.index()] = Some(name);
        }
        Ok(agg)
    }
}

impl From<StatAggregate> for BTreeMap<StatKey, f64> {
    fn from(agg: StatAggregate) -> Self {
        agg.iter().collect()
    }
}
