//! Greedy weapon upgrade planner
//!
//! Spends a currency budget one level at a time, always on the level-up with
//! the best attack gain per 1000 currency. This is a best-first heuristic,
//! not a global optimum.

use crate::game_data::GameData;
use crate::potential::Rarity;
use crate::weapon::{efficiency_per_thousand, Tier, WeaponState};
use serde::{Deserialize, Serialize};

/// Hard stop for the planning loop
pub const PLANNER_ITERATION_CAP: usize = 10_000;

/// One purchased level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpgradeStep {
    /// Index into the weapon list
    pub weapon: usize,
    pub rarity: Rarity,
    pub tier: Tier,
    pub from_level: u32,
    pub to_level: u32,
    pub cost: u64,
    pub gain: f64,
    pub efficiency: f64,
}

/// Consecutive steps on the same weapon, merged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainLink {
    pub weapon: usize,
    pub rarity: Rarity,
    pub tier: Tier,
    pub from_level: u32,
    pub to_level: u32,
    pub cost: u64,
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpgradePlan {
    pub steps: Vec<UpgradeStep>,
    /// Priority chain: what to level, in order
    pub chain: Vec<ChainLink>,
    pub spent: u64,
    pub remaining: u64,
    pub total_gain: f64,
    pub iterations: usize,
    /// Stopped by [`PLANNER_ITERATION_CAP`] rather than budget or options
    pub capped: bool,
    /// Weapons after every step was applied
    pub weapons: Vec<WeaponState>,
}

struct Candidate {
    index: usize,
    cost: u64,
    gain: f64,
    efficiency: f64,
}

fn best_candidate(weapons: &[WeaponState], remaining: u64, data: &GameData) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for (index, w) in weapons.iter().enumerate() {
        if !w.can_level_up() {
            continue;
        }
        let cost = w.next_level_cost(data);
        // zero cost means missing data, not a free level
        if cost == 0 || cost > remaining {
            continue;
        }
        let (inventory, equipped) = w.single_level_gain(data);
        let gain = w.scored_gain(inventory, equipped);
        let efficiency = efficiency_per_thousand(gain, cost);
        if best.as_ref().map_or(true, |b| efficiency > b.efficiency) {
            best = Some(Candidate { index, cost, gain, efficiency });
        }
    }
    best
}

fn merge_chain(steps: &[UpgradeStep]) -> Vec<ChainLink> {
    let mut chain: Vec<ChainLink> = Vec::new();
    for step in steps {
        match chain.last_mut() {
            Some(link) if link.weapon == step.weapon => {
                link.to_level = step.to_level;
                link.cost += step.cost;
                link.gain += step.gain;
            }
            _ => chain.push(ChainLink {
                weapon: step.weapon,
                rarity: step.rarity,
                tier: step.tier,
                from_level: step.from_level,
                to_level: step.to_level,
                cost: step.cost,
                gain: step.gain,
            }),
        }
    }
    chain
}

/// Plan how to spend `budget` across `weapons`.
///
/// Every iteration re-scores each weapon's next level (below its star cap and
/// affordable) and buys the single most efficient one; the first weapon wins
/// ties.
pub fn plan_upgrades(weapons: &[WeaponState], budget: u64, data: &GameData) -> UpgradePlan {
    let mut plan = UpgradePlan {
        remaining: budget,
        weapons: weapons.to_vec(),
        ..UpgradePlan::default()
    };

    while plan.iterations < PLANNER_ITERATION_CAP {
        let Some(c) = best_candidate(&plan.weapons, plan.remaining, data) else {
            break;
        };
        plan.iterations += 1;

        let w = &mut plan.weapons[c.index];
        let from_level = w.level;
        w.set_level(from_level + 1);
        plan.steps.push(UpgradeStep {
            weapon: c.index,
            rarity: w.rarity,
            tier: w.tier,
            from_level,
            to_level: w.level,
            cost: c.cost,
            gain: c.gain,
            efficiency: c.efficiency,
        });
        plan.remaining -= c.cost;
        plan.spent += c.cost;
        plan.total_gain += c.gain;
    }

    plan.capped = plan.iterations >= PLANNER_ITERATION_CAP;
    if plan.capped {
        tracing::warn!(iterations = plan.iterations, "upgrade planner hit its iteration cap");
    }
    tracing::debug!(
        steps = plan.steps.len(),
        spent = plan.spent,
        remaining = plan.remaining,
        "upgrade planning finished"
    );

    plan.chain = merge_chain(&plan.steps);
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weapon(rarity: Rarity, tier: Tier, level: u32, stars: u32, equipped: bool) -> WeaponState {
        WeaponState { rarity, tier, level, stars, equipped }
    }

    #[test]
    fn test_zero_budget_plans_nothing() {
        let data = GameData::builtin();
        let plan = plan_upgrades(&[weapon(Rarity::Epic, Tier::T4, 1, 0, true)], 0, &data);
        assert!(plan.steps.is_empty());
        assert!(plan.chain.is_empty());
        assert_eq!(plan.remaining, 0);
        assert!(!plan.capped);
    }

    #[test]
    fn test_budget_accounting_and_caps() {
        let data = GameData::builtin();
        let weapons = [
            weapon(Rarity::Normal, Tier::T4, 95, 0, false),
            weapon(Rarity::Rare, Tier::T4, 1, 0, true),
        ];
        let plan = plan_upgrades(&weapons, 200_000, &data);
        assert_eq!(plan.spent + plan.remaining, 200_000);
        assert_eq!(plan.spent, plan.steps.iter().map(|s| s.cost).sum::<u64>());
        assert!(plan.weapons.iter().all(|w| w.level <= w.max_level()));
        assert_eq!(plan.weapons[0].level, 100);
    }

    #[test]
    fn test_equipped_weapon_preferred_on_equal_cost() {
        let data = GameData::builtin();
        let weapons = [
            weapon(Rarity::Epic, Tier::T4, 10, 0, false),
            weapon(Rarity::Epic, Tier::T4, 10, 0, true),
        ];
        let plan = plan_upgrades(&weapons, 1_000, &data);
        assert_eq!(plan.steps.first().map(|s| s.weapon), Some(1));
    }

    #[test]
    fn test_chain_merges_consecutive_steps() {
        let steps: Vec<UpgradeStep> = [0usize, 0, 1, 0]
            .iter()
            .enumerate()
            .map(|(i, &w)| UpgradeStep {
                weapon: w,
                rarity: Rarity::Rare,
                tier: Tier::T4,
                from_level: i as u32 + 1,
                to_level: i as u32 + 2,
                cost: 10,
                gain: 1.0,
                efficiency: 100.0,
            })
            .collect();
        let chain = merge_chain(&steps);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].from_level, 1);
        assert_eq!(chain[0].to_level, 3);
        assert_eq!(chain[0].cost, 20);
        assert_eq!(chain[2].weapon, 0);
    }
}
