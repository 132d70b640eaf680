//! Cube strategy simulator.
//!
//! Plays out many cube "careers" under named slot-selection strategies and
//! summarises where each one ends up.

use crate::config::JobClass;
use crate::cube::{CubeEngine, SlotCandidate};
use crate::error::CalcError;
use crate::potential::{CubeSlotData, PotentialState, PotentialType, Rarity, SlotId};
use crate::progress::{checkpoint, finish, Progress, Silent};
use crate::simulation::{fan_out, make_rng, partition_outcomes, run_guarded, stream_seed, StrategyFailure};
use crate::stats::{check_bin_width, mean, Distribution};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One slot's state inside a simulated trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct SlotTrack {
    pub slot: SlotId,
    pub state: PotentialState,
    /// DPS gain (percent) of the lines currently kept
    pub gain: f64,
    pub tier_ups: u32,
}

impl SlotTrack {
    pub fn fresh(slot: SlotId) -> Self {
        Self { slot, state: PotentialState::default(), gain: 0.0, tier_ups: 0 }
    }

    fn candidate(&self) -> SlotCandidate {
        SlotCandidate {
            slot: self.slot,
            rarity: self.state.rarity,
            roll_count: self.state.roll_count,
            current_gain: self.gain,
        }
    }
}

/// Read-only inputs a strategy may consult
pub struct StrategyContext<'a> {
    pub engine: &'a CubeEngine,
    pub potential_type: PotentialType,
}

impl StrategyContext<'_> {
    /// Fraction of the pity counter used up; 0 at the top rarity
    pub fn pity_progress(&self, track: &SlotTrack) -> f64 {
        match self.engine.data().upgrade_rate(self.potential_type, track.state.rarity) {
            Some(rate) if rate.max > 0 => track.state.roll_count as f64 / rate.max as f64,
            _ => 0.0,
        }
    }
}

/// Picks the slot that receives the next cube
pub trait CubeStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Index into `slots`; never called with an empty slice
    fn select_slot(&self, slots: &[SlotTrack], ctx: &StrategyContext<'_>, rng: &mut dyn RngCore) -> usize;
}

fn argmin_by(slots: &[SlotTrack], key: impl Fn(&SlotTrack) -> f64) -> usize {
    let mut best = 0;
    let mut best_key = f64::INFINITY;
    for (i, s) in slots.iter().enumerate() {
        let k = key(s);
        if k < best_key {
            best = i;
            best_key = k;
        }
    }
    best
}

/// Always the slot with the lowest current gain
#[derive(Debug, Clone, Copy, Default)]
pub struct WorstFirst;

impl CubeStrategy for WorstFirst {
    fn name(&self) -> &str {
        "worst_first"
    }

    fn select_slot(&self, slots: &[SlotTrack], _ctx: &StrategyContext<'_>, _rng: &mut dyn RngCore) -> usize {
        argmin_by(slots, |s| s.gain)
    }
}

/// Lifts the slot furthest below the average; with nothing below the bar,
/// chases the slot closest to its pity upgrade.
#[derive(Debug, Clone, Copy)]
pub struct BalancedThreshold {
    pub tolerance: f64,
}

impl CubeStrategy for BalancedThreshold {
    fn name(&self) -> &str {
        "balanced_threshold"
    }

    fn select_slot(&self, slots: &[SlotTrack], ctx: &StrategyContext<'_>, _rng: &mut dyn RngCore) -> usize {
        let gains: Vec<f64> = slots.iter().map(|s| s.gain).collect();
        let threshold = mean(&gains) * (1.0 - self.tolerance);

        let mut pick: Option<(usize, f64)> = None;
        for (i, s) in slots.iter().enumerate() {
            let shortfall = threshold - s.gain;
            if shortfall > 0.0 && pick.map_or(true, |(_, best)| shortfall > best) {
                pick = Some((i, shortfall));
            }
        }
        if let Some((i, _)) = pick {
            return i;
        }
        argmin_by(slots, |s| -ctx.pity_progress(s))
    }
}

/// Rushes every slot to a target rarity, then falls back to [`WorstFirst`]
#[derive(Debug, Clone, Copy)]
pub struct HybridFastRarity {
    pub target: Rarity,
}

impl CubeStrategy for HybridFastRarity {
    fn name(&self) -> &str {
        "hybrid_fast_rarity"
    }

    fn select_slot(&self, slots: &[SlotTrack], ctx: &StrategyContext<'_>, rng: &mut dyn RngCore) -> usize {
        let mut pick: Option<usize> = None;
        for (i, s) in slots.iter().enumerate() {
            if s.state.rarity >= self.target {
                continue;
            }
            let better = match pick {
                None => true,
                Some(p) => {
                    let cur = &slots[p].state;
                    s.state.rarity < cur.rarity || (s.state.rarity == cur.rarity && s.state.roll_count > cur.roll_count)
                }
            };
            if better {
                pick = Some(i);
            }
        }
        pick.unwrap_or_else(|| WorstFirst.select_slot(slots, ctx, rng))
    }
}

/// Worst-first, with each slot's gain discounted by how close it is to pity
#[derive(Debug, Clone, Copy)]
pub struct RarityWeightedWorstFirst {
    pub weight: f64,
}

impl CubeStrategy for RarityWeightedWorstFirst {
    fn name(&self) -> &str {
        "rarity_weighted_worst_first"
    }

    fn select_slot(&self, slots: &[SlotTrack], ctx: &StrategyContext<'_>, _rng: &mut dyn RngCore) -> usize {
        argmin_by(slots, |s| s.gain * (1.0 - self.weight * ctx.pity_progress(s)))
    }
}

/// Asks the expected-value engine for the best marginal gain every cube
#[derive(Debug, Clone, Copy)]
pub struct DpOptimal {
    pub sample_size: usize,
}

impl CubeStrategy for DpOptimal {
    fn name(&self) -> &str {
        "dp_optimal"
    }

    fn select_slot(&self, slots: &[SlotTrack], ctx: &StrategyContext<'_>, mut rng: &mut dyn RngCore) -> usize {
        let candidates: Vec<SlotCandidate> = slots.iter().map(SlotTrack::candidate).collect();
        ctx.engine
            .find_optimal_slot_to_cube(&candidates, ctx.potential_type, self.sample_size, &mut rng)
            .map_or(0, |choice| choice.index)
    }
}

/// Serializable strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CubeStrategyKind {
    WorstFirst,
    BalancedThreshold {
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },
    HybridFastRarity {
        #[serde(default = "default_target")]
        target: Rarity,
    },
    RarityWeightedWorstFirst {
        #[serde(default = "default_pity_weight")]
        weight: f64,
    },
    DpOptimal {
        /// Falls back to the request's sample size
        #[serde(default)]
        sample_size: Option<usize>,
    },
}

fn default_tolerance() -> f64 {
    0.2
}

fn default_target() -> Rarity {
    Rarity::Unique
}

fn default_pity_weight() -> f64 {
    0.5
}

impl CubeStrategyKind {
    /// All five strategies with their default parameters
    pub fn all() -> Vec<Self> {
        vec![
            CubeStrategyKind::WorstFirst,
            CubeStrategyKind::BalancedThreshold { tolerance: default_tolerance() },
            CubeStrategyKind::HybridFastRarity { target: default_target() },
            CubeStrategyKind::RarityWeightedWorstFirst { weight: default_pity_weight() },
            CubeStrategyKind::DpOptimal { sample_size: None },
        ]
    }

    pub fn build(&self, default_sample_size: usize) -> Box<dyn CubeStrategy> {
        match *self {
            CubeStrategyKind::WorstFirst => Box::new(WorstFirst),
            CubeStrategyKind::BalancedThreshold { tolerance } => Box::new(BalancedThreshold { tolerance }),
            CubeStrategyKind::HybridFastRarity { target } => Box::new(HybridFastRarity { target }),
            CubeStrategyKind::RarityWeightedWorstFirst { weight } => Box::new(RarityWeightedWorstFirst { weight }),
            CubeStrategyKind::DpOptimal { sample_size } => Box::new(DpOptimal {
                sample_size: sample_size.unwrap_or(default_sample_size),
            }),
        }
    }
}

/// Everything one cube simulation run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeSimulationRequest {
    /// Cubes spent per trajectory
    pub budget: usize,
    /// Trajectories per strategy
    pub simulations: usize,
    pub potential_type: PotentialType,
    /// Start from `slots` as they are instead of blank normal-rarity slots
    pub use_user_data: bool,
    pub slots: Vec<CubeSlotData>,
    pub class: Option<JobClass>,
    /// Empty means all five
    pub strategies: Vec<CubeStrategyKind>,
    pub sample_size: usize,
    pub histogram_bin_width: f64,
    pub seed: Option<u64>,
}

impl Default for CubeSimulationRequest {
    fn default() -> Self {
        Self {
            budget: 100,
            simulations: 100,
            potential_type: PotentialType::Regular,
            use_user_data: false,
            slots: Vec::new(),
            class: None,
            strategies: Vec::new(),
            sample_size: 50,
            histogram_bin_width: 1.0,
            seed: None,
        }
    }
}

impl CubeSimulationRequest {
    pub fn strategy_kinds(&self) -> Vec<CubeStrategyKind> {
        if self.strategies.is_empty() {
            CubeStrategyKind::all()
        } else {
            self.strategies.clone()
        }
    }

    /// Starting slots for one trajectory
    pub fn initial_tracks(&self, engine: &CubeEngine) -> Vec<SlotTrack> {
        if self.use_user_data {
            return self
                .slots
                .iter()
                .map(|data| {
                    let state = data.state(self.potential_type).clone();
                    let gain = state.set_a.as_ref().map_or(0.0, |s| engine.set_gain(s));
                    SlotTrack { slot: data.slot, state, gain, tier_ups: 0 }
                })
                .collect();
        }
        if self.slots.is_empty() {
            SlotId::ALL.iter().copied().map(SlotTrack::fresh).collect()
        } else {
            self.slots.iter().map(|d| SlotTrack::fresh(d.slot)).collect()
        }
    }
}

/// Outcome distribution for one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeStrategyReport {
    pub strategy: String,
    pub simulations: usize,
    /// Final total DPS gain (percent) across trajectories
    pub gain: Distribution,
    pub mean_tier_ups: f64,
    /// How many slots finished at each rarity, summed over trajectories
    pub final_rarities: BTreeMap<Rarity, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeSimulationReport {
    pub budget: usize,
    pub potential_type: PotentialType,
    pub base_dps: f64,
    pub strategies: Vec<CubeStrategyReport>,
    pub failures: Vec<StrategyFailure>,
}

struct Trajectory {
    total_gain: f64,
    tier_ups: u32,
    tracks: Vec<SlotTrack>,
}

/// Spend one cube on a slot: roll rarity, roll lines, keep the better set
/// (a tier-up always takes the new lines).
pub fn apply_cube(engine: &CubeEngine, potential_type: PotentialType, track: &mut SlotTrack, mut rng: &mut dyn RngCore) {
    let rate = engine.data().upgrade_rate(potential_type, track.state.rarity).copied();
    let upgraded = track.state.roll_rarity(rate.as_ref(), &mut rng);
    if upgraded {
        track.tier_ups += 1;
    }

    let rolled = engine
        .pool(potential_type, track.state.rarity, track.slot)
        .and_then(|pool| pool.sample_set(&mut rng));
    let Some(set) = rolled else {
        return;
    };
    let gain = engine.set_gain(&set);
    if upgraded || gain > track.gain {
        track.state.set_a = Some(set);
        track.gain = gain;
    }
}

fn run_trajectory(
    engine: &CubeEngine,
    request: &CubeSimulationRequest,
    strategy: &dyn CubeStrategy,
    ctx: &StrategyContext<'_>,
    rng: &mut dyn RngCore,
) -> Trajectory {
    let mut tracks = request.initial_tracks(engine);
    if !tracks.is_empty() {
        for _ in 0..request.budget {
            let idx = strategy.select_slot(&tracks, ctx, rng).min(tracks.len() - 1);
            apply_cube(engine, request.potential_type, &mut tracks[idx], rng);
        }
    }
    let total_gain = engine.combined_gain(tracks.iter().filter_map(|t| t.state.set_a.as_ref()));
    Trajectory {
        total_gain,
        tier_ups: tracks.iter().map(|t| t.tier_ups).sum(),
        tracks,
    }
}

fn simulate_strategy(
    engine: &CubeEngine,
    request: &CubeSimulationRequest,
    kind: &CubeStrategyKind,
    rng: &mut dyn RngCore,
    progress: &mut dyn Progress,
    done: &mut usize,
    total: usize,
) -> Result<CubeStrategyReport, CalcError> {
    let strategy = kind.build(request.sample_size);
    let ctx = StrategyContext {
        engine,
        potential_type: request.potential_type,
    };

    let mut gains = Vec::with_capacity(request.simulations);
    let mut tier_ups = Vec::with_capacity(request.simulations);
    let mut final_rarities = BTreeMap::new();

    for _ in 0..request.simulations {
        checkpoint(progress, *done, total)?;
        let t = run_trajectory(engine, request, strategy.as_ref(), &ctx, rng);
        gains.push(t.total_gain);
        tier_ups.push(t.tier_ups as f64);
        for track in &t.tracks {
            *final_rarities.entry(track.state.rarity).or_insert(0) += 1;
        }
        *done += 1;
    }

    Ok(CubeStrategyReport {
        strategy: strategy.name().to_string(),
        simulations: request.simulations,
        gain: Distribution::from_samples(&gains, request.histogram_bin_width),
        mean_tier_ups: mean(&tier_ups),
        final_rarities,
    })
}

fn strategy_label(kind: &CubeStrategyKind) -> String {
    kind.build(0).name().to_string()
}

/// Run every requested strategy in turn on the calling thread.
///
/// Progress is reported every 50 trajectories across all strategies. A
/// strategy that panics is recorded in `failures`; the rest still run.
pub fn run_cube_simulation(
    engine: &CubeEngine,
    request: &CubeSimulationRequest,
    progress: &mut dyn Progress,
) -> Result<CubeSimulationReport, CalcError> {
    if request.class.is_none() {
        return Err(CalcError::NoClassSelected);
    }
    check_bin_width(request.histogram_bin_width)?;
    let kinds = request.strategy_kinds();
    let total = kinds.len() * request.simulations;
    tracing::info!(
        strategies = kinds.len(),
        simulations = request.simulations,
        budget = request.budget,
        "starting cube simulation"
    );

    let mut done = 0usize;
    let mut results = Vec::with_capacity(kinds.len());
    for (i, kind) in kinds.iter().enumerate() {
        let mut rng = make_rng(stream_seed(request.seed, i as u64));
        let label = strategy_label(kind);
        results.push(run_guarded(&label, || {
            simulate_strategy(engine, request, kind, &mut rng, &mut *progress, &mut done, total)
        }));
    }
    finish(progress, total);

    let (strategies, failures) = partition_outcomes(results)?;
    tracing::info!(completed = strategies.len(), failed = failures.len(), "cube simulation finished");
    Ok(CubeSimulationReport {
        budget: request.budget,
        potential_type: request.potential_type,
        base_dps: engine.base_dps(),
        strategies,
        failures,
    })
}

/// Same as [`run_cube_simulation`] with strategies spread over a rayon
/// pool. Every worker gets its own RNG stream and its own copy of the
/// engine baseline. No progress is reported.
pub fn run_cube_simulation_parallel(
    engine: &CubeEngine,
    request: &CubeSimulationRequest,
) -> Result<CubeSimulationReport, CalcError> {
    if request.class.is_none() {
        return Err(CalcError::NoClassSelected);
    }
    check_bin_width(request.histogram_bin_width)?;
    let kinds = request.strategy_kinds();
    tracing::info!(strategies = kinds.len(), simulations = request.simulations, "starting parallel cube simulation");

    let results = fan_out(&kinds, |i, kind| {
        let worker = engine.fork();
        let mut rng = make_rng(stream_seed(request.seed, i as u64));
        let label = strategy_label(kind);
        run_guarded(&label, || {
            simulate_strategy(&worker, request, kind, &mut rng, &mut Silent, &mut 0, request.simulations)
        })
    });

    let (strategies, failures) = partition_outcomes(results)?;
    tracing::info!(completed = strategies.len(), failed = failures.len(), "parallel cube simulation finished");
    Ok(CubeSimulationReport {
        budget: request.budget,
        potential_type: request.potential_type,
        base_dps: engine.base_dps(),
        strategies,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{StatAggregate, StatKey};
    use crate::damage::{DamageContext, Target};
    use crate::game_data::GameData;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::ops::ControlFlow;

    fn engine() -> CubeEngine {
        let stats = StatAggregate::from_pairs([
            (StatKey::Attack, 4000.0),
            (StatKey::SkillCoefficient, 250.0),
            (StatKey::CritRate, 30.0),
            (StatKey::Damage, 40.0),
        ]);
        CubeEngine::new(GameData::builtin(), stats, DamageContext::new(Target::Boss))
    }

    fn track(slot: SlotId, rarity: Rarity, roll_count: u32, gain: f64) -> SlotTrack {
        SlotTrack {
            slot,
            state: PotentialState { rarity, roll_count, set_a: None, set_b: None },
            gain,
            tier_ups: 0,
        }
    }

    fn request(strategies: Vec<CubeStrategyKind>) -> CubeSimulationRequest {
        CubeSimulationRequest {
            budget: 40,
            simulations: 6,
            class: Some(JobClass::Warrior),
            slots: [SlotId::Top, SlotId::Gloves, SlotId::Ring].into_iter().map(CubeSlotData::new).collect(),
            strategies,
            sample_size: 8,
            seed: Some(21),
            ..CubeSimulationRequest::default()
        }
    }

    #[test]
    fn test_worst_first_and_weighted() {
        let e = engine();
        let ctx = StrategyContext { engine: &e, potential_type: PotentialType::Regular };
        let mut rng = SmallRng::seed_from_u64(1);
        let slots = [
            track(SlotId::Top, Rarity::Epic, 0, 4.0),
            track(SlotId::Cape, Rarity::Epic, 0, 2.0),
            track(SlotId::Belt, Rarity::Epic, 63, 2.5),
        ];
        assert_eq!(WorstFirst.select_slot(&slots, &ctx, &mut rng), 1);
        // belt is 90% of the way to epic pity: 2.5 * (1 - 0.5 * 0.9) = 1.375
        assert_eq!(RarityWeightedWorstFirst { weight: 0.5 }.select_slot(&slots, &ctx, &mut rng), 2);
    }

    #[test]
    fn test_balanced_threshold() {
        let e = engine();
        let ctx = StrategyContext { engine: &e, potential_type: PotentialType::Regular };
        let mut rng = SmallRng::seed_from_u64(1);
        let strategy = BalancedThreshold { tolerance: 0.2 };

        let uneven = [
            track(SlotId::Top, Rarity::Rare, 0, 10.0),
            track(SlotId::Cape, Rarity::Rare, 0, 3.0),
            track(SlotId::Belt, Rarity::Rare, 0, 1.0),
        ];
        assert_eq!(strategy.select_slot(&uneven, &ctx, &mut rng), 2);

        let even = [
            track(SlotId::Top, Rarity::Rare, 3, 5.0),
            track(SlotId::Cape, Rarity::Rare, 20, 5.0),
            track(SlotId::Belt, Rarity::Rare, 10, 5.0),
        ];
        assert_eq!(strategy.select_slot(&even, &ctx, &mut rng), 1);
    }

    #[test]
    fn test_hybrid_rushes_lowest_rarity() {
        let e = engine();
        let ctx = StrategyContext { engine: &e, potential_type: PotentialType::Regular };
        let mut rng = SmallRng::seed_from_u64(1);
        let strategy = HybridFastRarity { target: Rarity::Unique };

        let slots = [
            track(SlotId::Top, Rarity::Epic, 5, 1.0),
            track(SlotId::Cape, Rarity::Rare, 2, 9.0),
            track(SlotId::Belt, Rarity::Rare, 7, 9.0),
        ];
        assert_eq!(strategy.select_slot(&slots, &ctx, &mut rng), 2);

        let done = [
            track(SlotId::Top, Rarity::Unique, 0, 6.0),
            track(SlotId::Cape, Rarity::Legendary, 0, 2.0),
        ];
        assert_eq!(strategy.select_slot(&done, &ctx, &mut rng), 1);
    }

    #[test]
    fn test_apply_cube_keeps_better_lines() {
        let e = engine();
        let mut rng = SmallRng::seed_from_u64(5);
        let mut t = track(SlotId::Top, Rarity::Mystic, 0, 0.0);
        let mut best = 0.0;
        for _ in 0..50 {
            apply_cube(&e, PotentialType::Regular, &mut t, &mut rng);
            assert!(t.gain >= best);
            best = t.gain;
        }
        assert_eq!(t.state.rarity, Rarity::Mystic);
        assert_eq!(t.state.roll_count, 50);
        assert!(t.state.set_a.is_some());
    }

    #[test]
    fn test_requires_class() {
        let e = engine();
        let req = CubeSimulationRequest { class: None, ..request(vec![]) };
        assert_eq!(run_cube_simulation(&e, &req, &mut Silent), Err(CalcError::NoClassSelected));
        assert_eq!(run_cube_simulation_parallel(&e, &req), Err(CalcError::NoClassSelected));
    }

    #[test]
    fn test_all_strategies_report() {
        let e = engine();
        let req = request(vec![]);
        let report = run_cube_simulation(&e, &req, &mut Silent).unwrap();
        assert_eq!(report.strategies.len(), 5);
        assert!(report.failures.is_empty());
        for s in &report.strategies {
            assert_eq!(s.gain.samples, 6);
            assert_eq!(s.final_rarities.values().sum::<usize>(), 6 * 3);
            assert!(s.gain.min <= s.gain.mean && s.gain.mean <= s.gain.max);
        }
    }

    #[test]
    fn test_parallel_matches_sequential_with_seed() {
        let e = engine();
        let req = request(vec![CubeStrategyKind::WorstFirst, CubeStrategyKind::RarityWeightedWorstFirst { weight: 0.5 }]);
        let seq = run_cube_simulation(&e, &req, &mut Silent).unwrap();
        let par = run_cube_simulation_parallel(&e, &req).unwrap();
        assert_eq!(seq.strategies, par.strategies);
    }

    #[test]
    fn test_progress_can_cancel() {
        let e = engine();
        let req = CubeSimulationRequest {
            simulations: 60,
            budget: 5,
            ..request(vec![CubeStrategyKind::WorstFirst])
        };
        let mut stop = |_: usize, _: usize| ControlFlow::Break(());
        assert_eq!(
            run_cube_simulation(&e, &req, &mut stop),
            Err(CalcError::Cancelled { completed: 50, total: 60 })
        );
    }

    #[test]
    fn test_strategy_kind_parses_with_defaults() {
        let kinds: Vec<CubeStrategyKind> =
            serde_json::from_str(r#"[{"kind": "balanced_threshold"}, {"kind": "dp_optimal", "sample_size": 5}]"#).unwrap();
        assert_eq!(kinds[0], CubeStrategyKind::BalancedThreshold { tolerance: 0.2 });
        assert_eq!(kinds[1], CubeStrategyKind::DpOptimal { sample_size: Some(5) });
    }
}
