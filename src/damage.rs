//! Damage engine: turns a StatAggregate into expected damage and DPS

use crate::aggregate::{StatAggregate, StatKey};
use serde::{Deserialize, Serialize};

/// Which class of enemy the hit lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    #[default]
    Boss,
    Normal,
}

/// Which attack-specific damage bucket applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    /// No basic/skill specific bonus
    #[default]
    Any,
    Basic,
    Skill,
}

/// Per-call inputs that are not part of the stat snapshot
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageContext {
    pub target: Target,
    /// Enemy defense in percent; 0 disables the defense stage
    pub defense: f64,
    pub attack_kind: AttackKind,
}

impl DamageContext {
    pub fn new(target: Target) -> Self {
        Self { target, ..Self::default() }
    }

    pub fn with_defense(mut self, defense: f64) -> Self {
        self.defense = defense;
        self
    }

    pub fn with_attack_kind(mut self, kind: AttackKind) -> Self {
        self.attack_kind = kind;
        self
    }
}

/// Min / average / max of a damage range
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DamageRange {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl DamageRange {
    fn scaled(self, factor: f64) -> Self {
        Self {
            min: self.min * factor,
            avg: self.avg * factor,
            max: self.max * factor,
        }
    }
}

/// Full output of [`StatCalculator::compute`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageBreakdown {
    pub expected_damage: f64,
    pub dps: f64,
    pub base_damage: f64,
    pub non_crit: DamageRange,
    pub crit: DamageRange,
    pub damage_amp_multiplier: f64,
    pub attack_speed_multiplier: f64,
    pub defense_multiplier: f64,
    /// Snapshot the numbers were computed from
    pub stats: StatAggregate,
}

/// Intermediate pipeline values; Copy so the DPS fast path never allocates
#[derive(Debug, Clone, Copy)]
struct Evaluation {
    base_damage: f64,
    non_crit: DamageRange,
    crit: DamageRange,
    expected_damage: f64,
    damage_amp_multiplier: f64,
    attack_speed_multiplier: f64,
    defense_multiplier: f64,
    dps: f64,
}

/// Run the fixed damage pipeline. Order matters; each stage is multiplicative
/// except the additive damage bucket.
fn evaluate(s: &StatAggregate, ctx: &DamageContext) -> Evaluation {
    // Main stat is converted upstream; attack is taken as-is
    let attack = s.get(StatKey::Attack);

    let mastery = match ctx.target {
        Target::Boss => s.get(StatKey::BossMastery),
        Target::Normal => s.get(StatKey::Mastery),
    };
    let base_damage = attack * (s.get(StatKey::SkillCoefficient) / 100.0) * (1.0 + mastery / 100.0);

    let min = base_damage * s.get(StatKey::MinDamage) / 100.0;
    let max = base_damage * s.get(StatKey::MaxDamage) / 100.0;
    let non_crit = DamageRange { min, avg: (min + max) / 2.0, max };
    let crit = non_crit.scaled(1.0 + s.get(StatKey::CritDamage) / 100.0);

    // Crit rate is not clamped here; callers keep it in [0, 100]
    let crit_rate = s.get(StatKey::CritRate) / 100.0;
    let per_hit = non_crit.avg * (1.0 - crit_rate) + crit.avg * crit_rate;

    let target_damage = match ctx.target {
        Target::Boss => s.get(StatKey::BossDamage),
        Target::Normal => s.get(StatKey::NormalDamage),
    };
    let kind_damage = match ctx.attack_kind {
        AttackKind::Any => 0.0,
        AttackKind::Basic => s.get(StatKey::BasicAttackDamage),
        AttackKind::Skill => s.get(StatKey::SkillDamage),
    };
    let damage_bucket =
        1.0 + (s.get(StatKey::Damage) + target_damage + s.get(StatKey::StatDamage) + kind_damage) / 100.0;
    let final_damage = 1.0 + s.get(StatKey::FinalDamage) / 100.0;
    // Damage amp compounds on its own, never folded into the percent bucket
    let damage_amp_multiplier = 1.0 + s.get(StatKey::DamageAmp) / 100.0;

    let defense_multiplier = defense_multiplier(ctx.defense, s.get(StatKey::DefPen));

    let expected_damage = per_hit * damage_bucket * final_damage * damage_amp_multiplier * defense_multiplier;
    let attack_speed_multiplier = 1.0 + s.get(StatKey::AttackSpeed) / 100.0;

    Evaluation {
        base_damage,
        non_crit,
        crit,
        expected_damage,
        damage_amp_multiplier,
        attack_speed_multiplier,
        defense_multiplier,
        dps: expected_damage * attack_speed_multiplier,
    }
}

/// Share of damage that gets through enemy defense after penetration.
/// Exactly 1.0 when the enemy has no defense.
pub fn defense_multiplier(defense: f64, def_pen: f64) -> f64 {
    if defense <= 0.0 {
        return 1.0;
    }
    let effective = defense * (1.0 - def_pen / 100.0);
    (1.0 - effective / 100.0).max(0.0)
}

/// Percent change from `base` to `new`, 0 when `base` is zero or not finite
pub fn percent_gain(new: f64, base: f64) -> f64 {
    if base == 0.0 || !base.is_finite() || !new.is_finite() {
        return 0.0;
    }
    (new - base) / base * 100.0
}

/// Stat-bearing calculation session.
///
/// Holds the snapshot it was built from plus a working copy that the
/// add/subtract helpers mutate. `reset` restores the snapshot without
/// reallocating, which keeps tight simulation loops cheap.
#[derive(Debug, Clone)]
pub struct StatCalculator {
    original: StatAggregate,
    stats: StatAggregate,
}

impl StatCalculator {
    pub fn new(stats: &StatAggregate) -> Self {
        Self {
            original: stats.clone(),
            stats: stats.clone(),
        }
    }

    /// Adjust one stat by a signed delta. No clamping happens here.
    pub fn add(&mut self, key: StatKey, value: f64) -> &mut Self {
        self.stats.add(key, value);
        self
    }

    pub fn subtract(&mut self, key: StatKey, value: f64) -> &mut Self {
        self.stats.add(key, -value);
        self
    }

    /// Same arithmetic as [`add`](Self::add), named for stats measured as percent of base
    pub fn add_percentage_stat(&mut self, key: StatKey, value: f64) -> &mut Self {
        self.add(key, value)
    }

    /// Add a whole contribution delta
    pub fn apply(&mut self, delta: &StatAggregate) -> &mut Self {
        self.stats.merge(delta);
        self
    }

    /// Remove a whole contribution delta
    pub fn remove(&mut self, delta: &StatAggregate) -> &mut Self {
        self.stats.unmerge(delta);
        self
    }

    /// Restore the snapshot the session was constructed from
    pub fn reset(&mut self) -> &mut Self {
        self.stats.clone_from(&self.original);
        self
    }

    /// Deep copy of the current working stats
    pub fn stats(&self) -> StatAggregate {
        self.stats.clone()
    }

    pub fn compute(&self, target: Target) -> DamageBreakdown {
        self.compute_in(&DamageContext::new(target))
    }

    pub fn compute_in(&self, ctx: &DamageContext) -> DamageBreakdown {
        let e = evaluate(&self.stats, ctx);
        DamageBreakdown {
            expected_damage: e.expected_damage,
            dps: e.dps,
            base_damage: e.base_damage,
            non_crit: e.non_crit,
            crit: e.crit,
            damage_amp_multiplier: e.damage_amp_multiplier,
            attack_speed_multiplier: e.attack_speed_multiplier,
            defense_multiplier: e.defense_multiplier,
            stats: self.stats.clone(),
        }
    }

    /// Scalar DPS only; the hot path for simulations
    #[inline]
    pub fn compute_dps(&self, target: Target) -> f64 {
        evaluate(&self.stats, &DamageContext::new(target)).dps
    }

    #[inline]
    pub fn compute_dps_in(&self, ctx: &DamageContext) -> f64 {
        evaluate(&self.stats, ctx).dps
    }
}

/// DPS of a snapshot without building a session
pub fn dps_of(stats: &StatAggregate, ctx: &DamageContext) -> f64 {
    evaluate(stats, ctx).dps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stats() -> StatAggregate {
        StatAggregate::from_pairs([
            (StatKey::Attack, 1000.0),
            (StatKey::SkillCoefficient, 200.0),
            (StatKey::Mastery, 10.0),
            (StatKey::BossMastery, 20.0),
            (StatKey::CritRate, 50.0),
            (StatKey::CritDamage, 100.0),
            (StatKey::Damage, 30.0),
            (StatKey::BossDamage, 40.0),
            (StatKey::NormalDamage, 10.0),
            (StatKey::FinalDamage, 10.0),
            (StatKey::DamageAmp, 20.0),
            (StatKey::AttackSpeed, 50.0),
        ])
    }

    #[test]
    fn test_pipeline_by_hand() {
        let calc = StatCalculator::new(&sample_stats());
        let out = calc.compute(Target::Boss);

        // 1000 * 2.0 * 1.2
        assert!((out.base_damage - 2400.0).abs() < 1e-9);
        assert!((out.non_crit.min - 1560.0).abs() < 1e-9);
        assert!((out.non_crit.max - 2400.0).abs() < 1e-9);
        assert!((out.non_crit.avg - 1980.0).abs() < 1e-9);
        assert!((out.crit.avg - 3960.0).abs() < 1e-9);

        // avg hit 2970, bucket 1.7, final 1.1, amp 1.2
        let expected = 2970.0 * 1.7 * 1.1 * 1.2;
        assert!((out.expected_damage - expected).abs() < 1e-6);
        assert!((out.dps - expected * 1.5).abs() < 1e-6);
        assert_eq!(out.defense_multiplier, 1.0);
    }

    #[test]
    fn test_normal_target_uses_normal_buckets() {
        let calc = StatCalculator::new(&sample_stats());
        let boss = calc.compute(Target::Boss);
        let normal = calc.compute(Target::Normal);
        assert!((normal.base_damage - 2200.0).abs() < 1e-9);
        assert!(normal.dps < boss.dps);
    }

    #[test]
    fn test_damage_amp_is_separate_stage() {
        let mut stats = sample_stats();
        stats.set(StatKey::DamageAmp, 0.0);
        let base = dps_of(&stats, &DamageContext::default());

        let mut amped = stats.clone();
        amped.add(StatKey::DamageAmp, 10.0);
        let mut bucketed = stats.clone();
        bucketed.add(StatKey::Damage, 10.0);

        let amp_gain = dps_of(&amped, &DamageContext::default()) / base;
        let bucket_gain = dps_of(&bucketed, &DamageContext::default()) / base;
        assert!((amp_gain - 1.1).abs() < 1e-12);
        assert!(bucket_gain < amp_gain);
    }

    #[test]
    fn test_defense_stage() {
        assert_eq!(defense_multiplier(0.0, 50.0), 1.0);
        assert!((defense_multiplier(40.0, 0.0) - 0.6).abs() < 1e-12);
        assert!((defense_multiplier(40.0, 50.0) - 0.8).abs() < 1e-12);
        assert_eq!(defense_multiplier(300.0, 0.0), 0.0);
    }

    #[test]
    fn test_attack_kind_bucket() {
        let mut stats = sample_stats();
        stats.set(StatKey::SkillDamage, 25.0);
        let any = dps_of(&stats, &DamageContext::new(Target::Boss));
        let skill = dps_of(&stats, &DamageContext::new(Target::Boss).with_attack_kind(AttackKind::Skill));
        let basic = dps_of(&stats, &DamageContext::new(Target::Boss).with_attack_kind(AttackKind::Basic));
        assert!(skill > any);
        assert_eq!(basic, any);
    }

    #[test]
    fn test_reset_restores_snapshot() {
        let stats = sample_stats();
        let mut calc = StatCalculator::new(&stats);
        calc.add(StatKey::CritRate, 30.0)
            .subtract(StatKey::Attack, 2000.0)
            .add_percentage_stat(StatKey::BossDamage, 15.0);
        assert_ne!(calc.stats(), stats);

        calc.reset();
        assert_eq!(calc.stats(), stats);
        assert_eq!(calc.compute(Target::Boss), StatCalculator::new(&stats).compute(Target::Boss));
    }

    #[test]
    fn test_subtract_does_not_clamp() {
        let mut calc = StatCalculator::new(&StatAggregate::new());
        calc.subtract(StatKey::CritRate, 10.0);
        assert_eq!(calc.stats().get(StatKey::CritRate), -10.0);
    }

    #[test]
    fn test_percent_gain_guards_zero() {
        assert_eq!(percent_gain(100.0, 0.0), 0.0);
        assert_eq!(percent_gain(f64::NAN, 10.0), 0.0);
        assert!((percent_gain(110.0, 100.0) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_stats_are_computable() {
        let out = StatCalculator::new(&StatAggregate::new()).compute(Target::Normal);
        assert_eq!(out.dps, 0.0);
        assert!(out.dps.is_finite());
    }
}
