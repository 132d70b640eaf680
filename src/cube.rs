//! Cube potential expected-value engine.
//!
//! Maps potential rolls to DPS gains against a fixed baseline. Small search
//! spaces are enumerated exactly (rankings); everything stochastic is
//! Monte-Carlo sampled.

use crate::aggregate::StatAggregate;
use crate::damage::{dps_of, percent_gain, DamageContext};
use crate::error::CalcError;
use crate::game_data::{GameData, PoolTable};
use crate::potential::{
    tier_up_probability, CubeSlotData, LinePool, PotentialSet, PotentialType, Rarity, SlotId,
};
use crate::progress::{checkpoint, finish, Progress};
use crate::ranking_cache::{InFlightGuard, RankingCache, RankingEntry, RankingKey};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Combinations below this DPS gain (percent) are dropped from rankings
pub const MIN_RANKING_GAIN: f64 = 0.01;

/// Expected outcome of spending one more cube on a slot
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarginalGain {
    /// Expected slot DPS gain (percent) after the cube
    pub expected_gain: f64,
    /// `expected_gain` minus the slot's current gain
    pub marginal_gain: f64,
    pub tier_up_probability: f64,
}

/// What the engine needs to know about a slot to evaluate the next cube
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub slot: SlotId,
    pub rarity: Rarity,
    pub roll_count: u32,
    /// DPS gain (percent) of the lines currently on the slot
    pub current_gain: f64,
}

/// Winner of [`CubeEngine::find_optimal_slot_to_cube`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotChoice {
    /// Index into the candidate slice
    pub index: usize,
    pub slot: SlotId,
    pub gain: MarginalGain,
}

/// One cube of a planned sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub cube: usize,
    pub slot: SlotId,
    /// Rarity after this cube (pity promotions applied)
    pub rarity: Rarity,
    pub roll_count: u32,
    pub marginal_gain: f64,
    pub cumulative_gain: f64,
}

/// Consecutive cubes spent on the same slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityRow {
    pub slot: SlotId,
    pub from_cube: usize,
    pub to_cube: usize,
    pub cubes: usize,
    pub ending_rarity: Rarity,
    pub cumulative_gain: f64,
    /// Baseline DPS scaled by the cumulative gain
    pub cumulative_dps: f64,
}

/// Result of [`CubeEngine::calculate_optimal_sequence`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimalSequence {
    pub steps: Vec<SequenceStep>,
    pub priority: Vec<PriorityRow>,
    pub total_gain: f64,
}

/// Long-lived expected-value engine.
///
/// Equipped lines (set A) against a hypothetical alternative (set B)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetComparison {
    pub slot: SlotId,
    pub potential_type: PotentialType,
    pub gain_a: f64,
    pub gain_b: f64,
    /// `gain_b - gain_a`; positive means switching to B is an upgrade
    pub delta: f64,
}

/// Owns the baseline snapshot, the damage context it is evaluated in, the
/// pre-built line pools, and the ranking cache. Changing the baseline
/// invalidates the cache.
#[derive(Debug)]
pub struct CubeEngine {
    data: Arc<GameData>,
    pools: Arc<PoolTable>,
    baseline: StatAggregate,
    context: DamageContext,
    base_dps: f64,
    cache: RankingCache,
}

impl CubeEngine {
    pub fn new(data: GameData, baseline: StatAggregate, context: DamageContext) -> Self {
        Self::with_shared(Arc::new(data), baseline, context)
    }

    pub fn with_shared(data: Arc<GameData>, baseline: StatAggregate, context: DamageContext) -> Self {
        let pools = Arc::new(PoolTable::build(&data));
        let base_dps = dps_of(&baseline, &context);
        Self {
            data,
            pools,
            baseline,
            context,
            base_dps,
            cache: RankingCache::new(),
        }
    }

    /// Independent copy for another worker: shares the immutable tables,
    /// deep-copies the baseline, starts with an empty cache.
    pub fn fork(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            pools: Arc::clone(&self.pools),
            baseline: self.baseline.clone(),
            context: self.context,
            base_dps: self.base_dps,
            cache: RankingCache::new(),
        }
    }

    pub fn data(&self) -> &GameData {
        &self.data
    }

    pub fn baseline(&self) -> &StatAggregate {
        &self.baseline
    }

    pub fn context(&self) -> &DamageContext {
        &self.context
    }

    pub fn base_dps(&self) -> f64 {
        self.base_dps
    }

    pub fn cache(&self) -> &RankingCache {
        &self.cache
    }

    /// Replace the baseline; cached rankings no longer apply
    pub fn set_baseline(&mut self, baseline: StatAggregate) {
        self.base_dps = dps_of(&baseline, &self.context);
        self.baseline = baseline;
        self.cache.invalidate_all();
    }

    pub fn set_context(&mut self, context: DamageContext) {
        self.context = context;
        self.base_dps = dps_of(&self.baseline, &context);
        self.cache.invalidate_all();
    }

    pub fn pool(&self, potential_type: PotentialType, rarity: Rarity, slot: SlotId) -> Option<&LinePool> {
        self.pools.get(potential_type, rarity, slot)
    }

    /// DPS gain (percent) of one set on top of the baseline
    pub fn set_gain(&self, set: &PotentialSet) -> f64 {
        gain_over(&self.baseline, &self.context, self.base_dps, set)
    }

    /// DPS gain (percent) of several sets applied together
    pub fn combined_gain<'a, I>(&self, sets: I) -> f64
    where
        I: IntoIterator<Item = &'a PotentialSet>,
    {
        let mut stats = self.baseline.clone();
        for set in sets {
            set.add_to(&mut stats);
        }
        percent_gain(dps_of(&stats, &self.context), self.base_dps)
    }

    /// Value both stored sets of a slot. A missing set counts as no gain.
    pub fn compare_sets(&self, slot: &CubeSlotData, potential_type: PotentialType) -> SetComparison {
        let state = slot.state(potential_type);
        let gain = |set: Option<&PotentialSet>| set.map_or(0.0, |s| self.set_gain(s));
        let gain_a = gain(state.set_a.as_ref());
        let gain_b = gain(state.set_b.as_ref());
        SetComparison { slot: slot.slot, potential_type, gain_a, gain_b, delta: gain_b - gain_a }
    }

    /// Candidate view of stored slot data, valuing its equipped lines
    pub fn candidate(&self, slot: &CubeSlotData, potential_type: PotentialType) -> SlotCandidate {
        let state = slot.state(potential_type);
        SlotCandidate {
            slot: slot.slot,
            rarity: state.rarity,
            roll_count: state.roll_count,
            current_gain: state.set_a.as_ref().map_or(0.0, |s| self.set_gain(s)),
        }
    }

    /// Monte-Carlo estimate of what one more cube on this slot is worth.
    ///
    /// Each trial flips a tier-up (forced once pity is reached), rolls three
    /// lines at the resulting rarity, and keeps the better of old and new
    /// lines unless the rarity moved, in which case the new lines replace
    /// the old.
    #[allow(clippy::too_many_arguments)]
    pub fn calculate_expected_marginal_gain(
        &self,
        slot: SlotId,
        potential_type: PotentialType,
        rarity: Rarity,
        roll_count: u32,
        current_gain: f64,
        sample_size: usize,
        rng: &mut impl Rng,
    ) -> MarginalGain {
        let rate = self.data.upgrade_rate(potential_type, rarity);
        let p = tier_up_probability(rate, roll_count);
        if sample_size == 0 {
            return MarginalGain {
                expected_gain: current_gain,
                marginal_gain: 0.0,
                tier_up_probability: p,
            };
        }

        let same_pool = self.pool(potential_type, rarity, slot);
        let next_pool = rate.and_then(|r| self.pool(potential_type, r.next, slot));

        let mut total = 0.0;
        for _ in 0..sample_size {
            let upgraded = p > 0.0 && rng.gen::<f64>() < p;
            let pool = if upgraded { next_pool } else { same_pool };
            let sampled = pool
                .and_then(|pool| pool.sample_set(rng))
                .map_or(0.0, |set| self.set_gain(&set));
            total += if upgraded { sampled } else { sampled.max(current_gain) };
        }

        let expected_gain = total / sample_size as f64;
        MarginalGain {
            expected_gain,
            marginal_gain: expected_gain - current_gain,
            tier_up_probability: p,
        }
    }

    /// Mean gain of a freshly rolled set at a rarity
    pub fn sample_expected_dps_gain(
        &self,
        slot: SlotId,
        potential_type: PotentialType,
        rarity: Rarity,
        sample_size: usize,
        rng: &mut impl Rng,
    ) -> f64 {
        let Some(pool) = self.pool(potential_type, rarity, slot) else {
            return 0.0;
        };
        if sample_size == 0 || pool.is_empty() {
            return 0.0;
        }
        let total: f64 = (0..sample_size)
            .filter_map(|_| pool.sample_set(rng))
            .map(|set| self.set_gain(&set))
            .sum();
        total / sample_size as f64
    }

    /// Slot with the highest marginal gain; the first one wins ties
    pub fn find_optimal_slot_to_cube(
        &self,
        slots: &[SlotCandidate],
        potential_type: PotentialType,
        sample_size: usize,
        rng: &mut impl Rng,
    ) -> Option<SlotChoice> {
        let mut best: Option<SlotChoice> = None;
        for (index, c) in slots.iter().enumerate() {
            let gain = self.calculate_expected_marginal_gain(
                c.slot,
                potential_type,
                c.rarity,
                c.roll_count,
                c.current_gain,
                sample_size,
                rng,
            );
            let better = match &best {
                None => true,
                Some(b) => gain.marginal_gain > b.gain.marginal_gain,
            };
            if better {
                best = Some(SlotChoice { index, slot: c.slot, gain });
            }
        }
        best
    }

    /// Exact ranking of every distinct line combination at a rarity.
    ///
    /// Enumerates the full line1 × line2 × line3 cross product, sorts by gain,
    /// collapses reorderings of the same three lines, and drops combinations
    /// under [`MIN_RANKING_GAIN`]. Cached per key until the baseline changes.
    pub fn calculate_rankings_for_rarity(
        &mut self,
        slot: SlotId,
        potential_type: PotentialType,
        rarity: Rarity,
        progress: &mut dyn Progress,
    ) -> Result<Arc<[RankingEntry]>, CalcError> {
        let key = RankingKey { slot, rarity, potential_type };
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(%slot, %rarity, "ranking cache hit");
            return Ok(hit);
        }
        // the claim is released on error and on unwind
        let claim = InFlightGuard::begin(&mut self.cache, key).ok_or(CalcError::RankingInFlight { slot, rarity })?;
        let pool = self.pools.get(potential_type, rarity, slot);
        let entries = enumerate_rankings(pool, &self.baseline, &self.context, self.base_dps, progress)?;
        tracing::debug!(%slot, %rarity, entries = entries.len(), "rankings computed");
        Ok(claim.complete(entries))
    }

    /// Greedy online plan for spending `budget` cubes.
    ///
    /// Each cube goes to the slot with the best sampled marginal gain; that
    /// slot's pity advances and its gain becomes the expected post-cube gain.
    /// This is an approximation, not a global optimum.
    pub fn calculate_optimal_sequence(
        &self,
        slots: &[SlotCandidate],
        potential_type: PotentialType,
        budget: usize,
        sample_size: usize,
        rng: &mut impl Rng,
        progress: &mut dyn Progress,
    ) -> Result<OptimalSequence, CalcError> {
        let mut states = slots.to_vec();
        let mut seq = OptimalSequence::default();
        let mut cumulative = 0.0;

        for cube in 1..=budget {
            checkpoint(progress, cube - 1, budget)?;
            let Some(choice) = self.find_optimal_slot_to_cube(&states, potential_type, sample_size, rng) else {
                break;
            };

            let state = &mut states[choice.index];
            match self.data.upgrade_rate(potential_type, state.rarity) {
                Some(rate) if state.roll_count + 1 >= rate.max => {
                    state.rarity = rate.next;
                    state.roll_count = 0;
                }
                _ => state.roll_count += 1,
            }
            state.current_gain = choice.gain.expected_gain;
            cumulative += choice.gain.marginal_gain;

            seq.steps.push(SequenceStep {
                cube,
                slot: choice.slot,
                rarity: state.rarity,
                roll_count: state.roll_count,
                marginal_gain: choice.gain.marginal_gain,
                cumulative_gain: cumulative,
            });

            let cumulative_dps = self.base_dps * (1.0 + cumulative / 100.0);
            match seq.priority.last_mut() {
                Some(row) if row.slot == choice.slot => {
                    row.to_cube = cube;
                    row.cubes += 1;
                    row.ending_rarity = state.rarity;
                    row.cumulative_gain = cumulative;
                    row.cumulative_dps = cumulative_dps;
                }
                _ => seq.priority.push(PriorityRow {
                    slot: choice.slot,
                    from_cube: cube,
                    to_cube: cube,
                    cubes: 1,
                    ending_rarity: state.rarity,
                    cumulative_gain: cumulative,
                    cumulative_dps,
                }),
            }
        }
        finish(progress, budget);

        seq.total_gain = cumulative;
        Ok(seq)
    }
}

fn gain_over(baseline: &StatAggregate, context: &DamageContext, base_dps: f64, set: &PotentialSet) -> f64 {
    let mut stats = baseline.clone();
    set.add_to(&mut stats);
    percent_gain(dps_of(&stats, context), base_dps)
}

fn enumerate_rankings(
    pool: Option<&LinePool>,
    baseline: &StatAggregate,
    context: &DamageContext,
    base_dps: f64,
    progress: &mut dyn Progress,
) -> Result<Vec<RankingEntry>, CalcError> {
    let Some(pool) = pool else {
        return Ok(Vec::new());
    };
    let total = pool.combination_count();
    let mut all = Vec::with_capacity(total);
    let mut done = 0usize;

    for l1 in &pool.line1 {
        for l2 in &pool.line2 {
            for l3 in &pool.line3 {
                checkpoint(progress, done, total)?;
                let set = PotentialSet { line1: *l1, line2: *l2, line3: *l3 };
                all.push(RankingEntry { dps_gain: gain_over(baseline, context, base_dps, &set), set });
                done += 1;
            }
        }
    }
    finish(progress, total);

    // stable sort keeps enumeration order among equal gains
    all.sort_by(|a, b| b.dps_gain.total_cmp(&a.dps_gain));
    let mut seen = HashSet::new();
    Ok(all
        .into_iter()
        .filter(|e| seen.insert(e.set.signature()))
        .filter(|e| e.dps_gain >= MIN_RANKING_GAIN)
        .collect())
}
