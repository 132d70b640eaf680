//! Scroll enhancement minigame: ten slots, one scroll each, optional resets.
//!
//! Strategies decide which scroll goes on each slot and whether a finished
//! (or half-finished) run is worth resetting for another try.

use crate::aggregate::{StatAggregate, StatKey};
use crate::config::JobClass;
use crate::damage::{dps_of, percent_gain, DamageContext};
use crate::error::CalcError;
use crate::progress::{checkpoint, finish, Progress, Silent};
use crate::simulation::{fan_out, make_rng, partition_outcomes, run_guarded, stream_seed, StrategyFailure};
use crate::stats::{check_bin_width, mean, Distribution};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const SCROLL_SLOTS: usize = 10;
/// Safety cap on resets within one simulated attempt
pub const MAX_RESETS: usize = 10_000;
pub const PREMIUM_RATE_BONUS: f64 = 0.02;
pub const GUILD_RATE_CAP: f64 = 0.10;

/// Scroll success tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollGrade {
    /// 100%
    Guaranteed,
    /// 70%
    High,
    /// 30%
    Medium,
    /// 10%
    Low,
}

impl ScrollGrade {
    pub const ALL: [ScrollGrade; 4] = [ScrollGrade::Guaranteed, ScrollGrade::High, ScrollGrade::Medium, ScrollGrade::Low];
}

/// What a scroll grants on success and what it costs to use
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollType {
    pub success_rate: f64,
    pub attack: f64,
    pub damage_amp: f64,
    pub cost: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollCatalogue {
    pub guaranteed: ScrollType,
    pub high: ScrollType,
    pub medium: ScrollType,
    pub low: ScrollType,
}

impl Default for ScrollCatalogue {
    fn default() -> Self {
        let s = |success_rate, attack, damage_amp, cost| ScrollType { success_rate, attack, damage_amp, cost };
        Self {
            guaranteed: s(1.0, 10.0, 0.5, 15),
            high: s(0.7, 20.0, 1.0, 30),
            medium: s(0.3, 45.0, 2.5, 60),
            low: s(0.1, 80.0, 4.0, 100),
        }
    }
}

impl ScrollCatalogue {
    pub fn get(&self, grade: ScrollGrade) -> &ScrollType {
        match grade {
            ScrollGrade::Guaranteed => &self.guaranteed,
            ScrollGrade::High => &self.high,
            ScrollGrade::Medium => &self.medium,
            ScrollGrade::Low => &self.low,
        }
    }
}

/// Rate bonuses and fees that apply to every run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollSettings {
    pub premium: bool,
    /// Clamped to `0..=0.10`
    pub guild_bonus: f64,
    /// Trace paid to wipe the ten slots and start over
    pub reset_fee: u64,
    pub catalogue: ScrollCatalogue,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            premium: false,
            guild_bonus: 0.0,
            reset_fee: 500,
            catalogue: ScrollCatalogue::default(),
        }
    }
}

/// Extra success rate on the bonus slots
pub fn slot_rate_bonus(slot: usize) -> f64 {
    match slot {
        5 => 0.10,
        10 => 0.20,
        _ => 0.0,
    }
}

impl ScrollSettings {
    /// Success rate of `grade` on `slot` (1-based) after all bonuses, capped at 1
    pub fn effective_rate(&self, grade: ScrollGrade, slot: usize) -> f64 {
        let premium = if self.premium { PREMIUM_RATE_BONUS } else { 0.0 };
        let guild = self.guild_bonus.clamp(0.0, GUILD_RATE_CAP);
        (self.catalogue.get(grade).success_rate + premium + guild + slot_rate_bonus(slot)).min(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollSlotResult {
    /// 1..=10
    pub slot: usize,
    pub scroll: ScrollGrade,
    pub success: bool,
    pub attack: f64,
    pub damage_amp: f64,
    pub success_rate: f64,
    /// The budget ran out (or the run was abandoned) before this slot
    pub unfunded: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollRunResult {
    pub slots: Vec<ScrollSlotResult>,
    pub total_attack: f64,
    pub total_damage_amp: f64,
    pub success_count: u32,
    /// Trace spent on scrolls during this run
    pub trace_cost: u64,
    pub early_reset: bool,
}

impl ScrollRunResult {
    /// Every slot was scrolled
    pub fn is_complete(&self) -> bool {
        !self.early_reset && self.slots.len() == SCROLL_SLOTS && self.slots.iter().all(|s| !s.unfunded)
    }

    /// Most successes, then attack, then amp
    pub fn rank(&self, other: &Self) -> Ordering {
        self.success_count
            .cmp(&other.success_count)
            .then(self.total_attack.total_cmp(&other.total_attack))
            .then(self.total_damage_amp.total_cmp(&other.total_damage_amp))
    }
}

/// What a strategy sees when picking the scroll for the next slot
#[derive(Debug, Clone, Copy)]
pub struct RunState<'a> {
    /// Slot about to be scrolled, 1-based
    pub slot: usize,
    pub results: &'a [ScrollSlotResult],
    /// Trace spent before this run started (earlier runs and reset fees)
    pub spent_before: u64,
    pub spent_this_run: u64,
    pub budget: u64,
}

impl RunState<'_> {
    pub fn total_spent(&self) -> u64 {
        self.spent_before.saturating_add(self.spent_this_run)
    }

    pub fn successes(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

/// Stateless decision rules for one scrolling approach
pub trait ScrollStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn select_scroll(&self, state: &RunState<'_>) -> ScrollGrade;

    /// Abandon the run right after `current_slot`
    fn should_reset_early(&self, _results: &[ScrollSlotResult], _current_slot: usize) -> bool {
        false
    }

    /// Pay the reset fee and try again after a finished run
    fn should_reset(&self, _run: &ScrollRunResult, _trace_used: u64, _budget: u64) -> bool {
        false
    }
}

/// 70% scrolls everywhere, never resets
#[derive(Debug, Clone, Copy, Default)]
pub struct Safe;

impl ScrollStrategy for Safe {
    fn name(&self) -> &str {
        "safe"
    }

    fn select_scroll(&self, _state: &RunState<'_>) -> ScrollGrade {
        ScrollGrade::High
    }
}

/// 30% scrolls on the bonus slots, 70% elsewhere
#[derive(Debug, Clone, Copy, Default)]
pub struct BonusSlots;

impl ScrollStrategy for BonusSlots {
    fn name(&self) -> &str {
        "bonus_slots"
    }

    fn select_scroll(&self, state: &RunState<'_>) -> ScrollGrade {
        if slot_rate_bonus(state.slot) > 0.0 {
            ScrollGrade::Medium
        } else {
            ScrollGrade::High
        }
    }
}

/// Gamble a 30% on slot 1 and reset immediately if it fails
#[derive(Debug, Clone, Copy, Default)]
pub struct LockFirst;

impl ScrollStrategy for LockFirst {
    fn name(&self) -> &str {
        "lock_first"
    }

    fn select_scroll(&self, state: &RunState<'_>) -> ScrollGrade {
        if state.slot == 1 {
            ScrollGrade::Medium
        } else {
            ScrollGrade::High
        }
    }

    fn should_reset_early(&self, results: &[ScrollSlotResult], current_slot: usize) -> bool {
        current_slot == 1 && results.first().map_or(false, |r| !r.success)
    }
}

/// Fixed grade; reset until enough slots succeed
#[derive(Debug, Clone, Copy)]
pub struct MinSuccesses {
    pub required: u32,
    pub grade: ScrollGrade,
}

impl ScrollStrategy for MinSuccesses {
    fn name(&self) -> &str {
        "min_successes"
    }

    fn select_scroll(&self, _state: &RunState<'_>) -> ScrollGrade {
        self.grade
    }

    fn should_reset(&self, run: &ScrollRunResult, _trace_used: u64, _budget: u64) -> bool {
        run.success_count < self.required
    }
}

/// 70% scrolls; reset until total damage amp clears a bar
#[derive(Debug, Clone, Copy)]
pub struct DamageAmpBar {
    pub required: f64,
}

impl ScrollStrategy for DamageAmpBar {
    fn name(&self) -> &str {
        "damage_amp_bar"
    }

    fn select_scroll(&self, _state: &RunState<'_>) -> ScrollGrade {
        ScrollGrade::High
    }

    fn should_reset(&self, run: &ScrollRunResult, _trace_used: u64, _budget: u64) -> bool {
        run.total_damage_amp < self.required
    }
}

/// Aggressive while the budget is fresh, safe once half of it is gone
#[derive(Debug, Clone, Copy, Default)]
pub struct Adaptive;

impl ScrollStrategy for Adaptive {
    fn name(&self) -> &str {
        "adaptive"
    }

    fn select_scroll(&self, state: &RunState<'_>) -> ScrollGrade {
        if state.total_spent().saturating_mul(2) < state.budget {
            ScrollGrade::Medium
        } else {
            ScrollGrade::High
        }
    }
}

/// Serializable strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScrollStrategyKind {
    Safe,
    BonusSlots,
    LockFirst,
    MinSuccesses {
        required: u32,
        #[serde(default = "default_grade")]
        grade: ScrollGrade,
    },
    DamageAmpBar {
        required: f64,
    },
    Adaptive,
}

fn default_grade() -> ScrollGrade {
    ScrollGrade::High
}

impl ScrollStrategyKind {
    pub fn all() -> Vec<Self> {
        vec![
            ScrollStrategyKind::Safe,
            ScrollStrategyKind::BonusSlots,
            ScrollStrategyKind::LockFirst,
            ScrollStrategyKind::MinSuccesses { required: 7, grade: ScrollGrade::High },
            ScrollStrategyKind::DamageAmpBar { required: 6.0 },
            ScrollStrategyKind::Adaptive,
        ]
    }

    pub fn build(&self) -> Box<dyn ScrollStrategy> {
        match *self {
            ScrollStrategyKind::Safe => Box::new(Safe),
            ScrollStrategyKind::BonusSlots => Box::new(BonusSlots),
            ScrollStrategyKind::LockFirst => Box::new(LockFirst),
            ScrollStrategyKind::MinSuccesses { required, grade } => Box::new(MinSuccesses { required, grade }),
            ScrollStrategyKind::DamageAmpBar { required } => Box::new(DamageAmpBar { required }),
            ScrollStrategyKind::Adaptive => Box::new(Adaptive),
        }
    }
}

/// Scroll all ten slots once.
///
/// A slot whose scroll costs more than what is left of `budget` is marked
/// unfunded, and so is every slot after it. An early reset marks the
/// remaining slots unfunded without charging for them.
pub fn attempt_scroll_run(
    strategy: &dyn ScrollStrategy,
    settings: &ScrollSettings,
    spent_before: u64,
    budget: u64,
    rng: &mut dyn RngCore,
) -> ScrollRunResult {
    let mut run = ScrollRunResult { slots: Vec::with_capacity(SCROLL_SLOTS), ..ScrollRunResult::default() };
    let mut stopped = false;

    for slot in 1..=SCROLL_SLOTS {
        let state = RunState {
            slot,
            results: &run.slots,
            spent_before,
            spent_this_run: run.trace_cost,
            budget,
        };
        let grade = strategy.select_scroll(&state);
        let scroll = settings.catalogue.get(grade);
        let success_rate = settings.effective_rate(grade, slot);

        let affordable = scroll.cost <= budget.saturating_sub(spent_before).saturating_sub(run.trace_cost);
        if stopped || !affordable {
            stopped = true;
            run.slots.push(ScrollSlotResult {
                slot,
                scroll: grade,
                success: false,
                attack: 0.0,
                damage_amp: 0.0,
                success_rate,
                unfunded: true,
            });
            continue;
        }

        run.trace_cost = run.trace_cost.saturating_add(scroll.cost);
        let success = rng.gen::<f64>() < success_rate;
        let (attack, damage_amp) = if success { (scroll.attack, scroll.damage_amp) } else { (0.0, 0.0) };
        if success {
            run.success_count += 1;
            run.total_attack += attack;
            run.total_damage_amp += damage_amp;
        }
        run.slots.push(ScrollSlotResult { slot, scroll: grade, success, attack, damage_amp, success_rate, unfunded: false });

        if strategy.should_reset_early(&run.slots, slot) {
            run.early_reset = true;
            stopped = true;
        }
    }
    run
}

/// Final run of a reset loop and what it took to get there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollOutcome {
    pub run: ScrollRunResult,
    pub resets: usize,
    /// Scroll costs plus reset fees
    pub trace_used: u64,
    /// The strategy accepted a complete run
    pub met_bar: bool,
}

/// Run, check, reset, repeat.
///
/// Stops when the strategy accepts a complete run, when the budget runs
/// out mid-run, when the next reset is unaffordable, or at [`MAX_RESETS`].
/// Without an accepted run the best complete run is returned (the last run
/// if none completed).
pub fn simulate_scroll_with_resets(
    strategy: &dyn ScrollStrategy,
    settings: &ScrollSettings,
    budget: u64,
    rng: &mut dyn RngCore,
) -> ScrollOutcome {
    let mut trace_used = 0u64;
    let mut resets = 0usize;
    let mut best: Option<ScrollRunResult> = None;

    loop {
        let run = attempt_scroll_run(strategy, settings, trace_used, budget, rng);
        trace_used = trace_used.saturating_add(run.trace_cost);
        let complete = run.is_complete();

        if complete && !strategy.should_reset(&run, trace_used, budget) {
            return ScrollOutcome { run, resets, trace_used, met_bar: true };
        }

        let out_of_budget = !complete && !run.early_reset;
        let reset_unaffordable = settings.reset_fee > budget.saturating_sub(trace_used);
        let capped = resets >= MAX_RESETS;
        if capped {
            tracing::warn!(resets, strategy = strategy.name(), "scroll reset cap reached");
        }

        if complete && best.as_ref().map_or(true, |b| run.rank(b) == Ordering::Greater) {
            best = Some(run.clone());
        }
        if out_of_budget || reset_unaffordable || capped {
            return ScrollOutcome { run: best.unwrap_or(run), resets, trace_used, met_bar: false };
        }

        trace_used = trace_used.saturating_add(settings.reset_fee);
        resets += 1;
    }
}

/// Everything one scroll simulation run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollSimulationRequest {
    /// Trace available per simulated attempt
    pub budget: u64,
    /// Attempts per strategy
    pub simulations: usize,
    pub class: Option<JobClass>,
    /// Empty means all six
    pub strategies: Vec<ScrollStrategyKind>,
    pub settings: ScrollSettings,
    pub histogram_bin_width: f64,
    pub seed: Option<u64>,
}

impl Default for ScrollSimulationRequest {
    fn default() -> Self {
        Self {
            budget: 5_000,
            simulations: 1_000,
            class: None,
            strategies: Vec::new(),
            settings: ScrollSettings::default(),
            histogram_bin_width: 10.0,
            seed: None,
        }
    }
}

impl ScrollSimulationRequest {
    pub fn strategy_kinds(&self) -> Vec<ScrollStrategyKind> {
        if self.strategies.is_empty() {
            ScrollStrategyKind::all()
        } else {
            self.strategies.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollStrategyReport {
    pub strategy: String,
    pub simulations: usize,
    pub mean_attack: f64,
    pub mean_damage_amp: f64,
    pub mean_successes: f64,
    pub mean_resets: f64,
    pub mean_trace_used: f64,
    /// Share of attempts that ended on an accepted run
    pub bar_met_rate: f64,
    /// DPS gain (percent) of the mean attack and amp on top of the baseline
    pub dps_gain: f64,
    /// Distribution of raw attack gained
    pub attack: Distribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollSimulationReport {
    pub budget: u64,
    pub base_dps: f64,
    pub strategies: Vec<ScrollStrategyReport>,
    pub failures: Vec<StrategyFailure>,
}

#[allow(clippy::too_many_arguments)]
fn simulate_strategy(
    request: &ScrollSimulationRequest,
    kind: &ScrollStrategyKind,
    baseline: &StatAggregate,
    ctx: &DamageContext,
    base_dps: f64,
    rng: &mut dyn RngCore,
    progress: &mut dyn Progress,
    done: &mut usize,
    total: usize,
) -> Result<ScrollStrategyReport, CalcError> {
    let strategy = kind.build();
    let n = request.simulations;
    let mut attacks = Vec::with_capacity(n);
    let mut amps = Vec::with_capacity(n);
    let mut successes = Vec::with_capacity(n);
    let mut resets = Vec::with_capacity(n);
    let mut traces = Vec::with_capacity(n);
    let mut met = 0usize;

    for _ in 0..n {
        checkpoint(progress, *done, total)?;
        let outcome = simulate_scroll_with_resets(strategy.as_ref(), &request.settings, request.budget, rng);
        attacks.push(outcome.run.total_attack);
        amps.push(outcome.run.total_damage_amp);
        successes.push(outcome.run.success_count as f64);
        resets.push(outcome.resets as f64);
        traces.push(outcome.trace_used as f64);
        if outcome.met_bar {
            met += 1;
        }
        *done += 1;
    }

    let mean_attack = mean(&attacks);
    let mean_damage_amp = mean(&amps);
    // the engine sees the averages once, not every trial
    let mut boosted = baseline.clone();
    boosted.add(StatKey::Attack, mean_attack);
    boosted.add(StatKey::DamageAmp, mean_damage_amp);

    Ok(ScrollStrategyReport {
        strategy: strategy.name().to_string(),
        simulations: n,
        mean_attack,
        mean_damage_amp,
        mean_successes: mean(&successes),
        mean_resets: mean(&resets),
        mean_trace_used: mean(&traces),
        bar_met_rate: if n == 0 { 0.0 } else { met as f64 / n as f64 },
        dps_gain: percent_gain(dps_of(&boosted, ctx), base_dps),
        attack: Distribution::from_samples(&attacks, request.histogram_bin_width),
    })
}

/// Run every requested scroll strategy on the calling thread.
///
/// Progress is reported every 50 attempts across all strategies; a
/// panicking strategy is recorded in `failures`.
pub fn run_scroll_simulation(
    request: &ScrollSimulationRequest,
    baseline: &StatAggregate,
    ctx: &DamageContext,
    progress: &mut dyn Progress,
) -> Result<ScrollSimulationReport, CalcError> {
    if request.class.is_none() {
        return Err(CalcError::NoClassSelected);
    }
    check_bin_width(request.histogram_bin_width)?;
    let kinds = request.strategy_kinds();
    let total = kinds.len() * request.simulations;
    let base_dps = dps_of(baseline, ctx);
    tracing::info!(strategies = kinds.len(), simulations = request.simulations, budget = request.budget, "starting scroll simulation");

    let mut done = 0usize;
    let mut results = Vec::with_capacity(kinds.len());
    for (i, kind) in kinds.iter().enumerate() {
        let mut rng = make_rng(stream_seed(request.seed, i as u64));
        let label = kind.build().name().to_string();
        results.push(run_guarded(&label, || {
            simulate_strategy(request, kind, baseline, ctx, base_dps, &mut rng, &mut *progress, &mut done, total)
        }));
    }
    finish(progress, total);

    let (strategies, failures) = partition_outcomes(results)?;
    tracing::info!(completed = strategies.len(), failed = failures.len(), "scroll simulation finished");
    Ok(ScrollSimulationReport { budget: request.budget, base_dps, strategies, failures })
}

/// [`run_scroll_simulation`] with strategies spread over a rayon pool;
/// each worker clones the baseline and owns its RNG. No progress reports.
pub fn run_scroll_simulation_parallel(
    request: &ScrollSimulationRequest,
    baseline: &StatAggregate,
    ctx: &DamageContext,
) -> Result<ScrollSimulationReport, CalcError> {
    if request.class.is_none() {
        return Err(CalcError::NoClassSelected);
    }
    check_bin_width(request.histogram_bin_width)?;
    let kinds = request.strategy_kinds();
    let base_dps = dps_of(baseline, ctx);
    tracing::info!(strategies = kinds.len(), simulations = request.simulations, "starting parallel scroll simulation");

    let results = fan_out(&kinds, |i, kind| {
        let baseline = baseline.clone();
        let mut rng = make_rng(stream_seed(request.seed, i as u64));
        let label = kind.build().name().to_string();
        run_guarded(&label, || {
            simulate_strategy(request, kind, &baseline, ctx, base_dps, &mut rng, &mut Silent, &mut 0, request.simulations)
        })
    });

    let (strategies, failures) = partition_outcomes(results)?;
    Ok(ScrollSimulationReport { budget: request.budget, base_dps, strategies, failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_effective_rate_bonuses() {
        let mut settings = ScrollSettings::default();
        assert!((settings.effective_rate(ScrollGrade::High, 1) - 0.7).abs() < 1e-12);
        assert!((settings.effective_rate(ScrollGrade::High, 5) - 0.8).abs() < 1e-12);
        assert!((settings.effective_rate(ScrollGrade::Medium, 10) - 0.5).abs() < 1e-12);

        settings.premium = true;
        settings.guild_bonus = 0.5;
        assert!((settings.effective_rate(ScrollGrade::Low, 1) - 0.22).abs() < 1e-12);
        assert_eq!(settings.effective_rate(ScrollGrade::High, 10), 1.0);
        assert_eq!(settings.effective_rate(ScrollGrade::Guaranteed, 3), 1.0);
    }

    #[test]
    fn test_guaranteed_run_is_deterministic() {
        let strategy = MinSuccesses { required: 10, grade: ScrollGrade::Guaranteed };
        let mut rng = SmallRng::seed_from_u64(1);
        let run = attempt_scroll_run(&strategy, &ScrollSettings::default(), 0, 1_000, &mut rng);
        assert!(run.is_complete());
        assert_eq!(run.success_count, 10);
        assert_eq!(run.trace_cost, 150);
        assert_eq!(run.total_attack, 100.0);
        assert!((run.total_damage_amp - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_budget_marks_remaining_slots_unfunded() {
        let mut rng = SmallRng::seed_from_u64(1);
        // 100 trace buys three 30-cost scrolls
        let run = attempt_scroll_run(&Safe, &ScrollSettings::default(), 0, 100, &mut rng);
        assert_eq!(run.trace_cost, 90);
        assert_eq!(run.slots.iter().filter(|s| s.unfunded).count(), 7);
        assert!(run.slots[3..].iter().all(|s| s.unfunded && !s.success));
        assert!(!run.is_complete());
    }

    #[test]
    fn test_lock_first_resets_on_first_failure() {
        let settings = ScrollSettings::default();
        let mut rng = SmallRng::seed_from_u64(3);
        let mut saw_early = false;
        for _ in 0..50 {
            let run = attempt_scroll_run(&LockFirst, &settings, 0, 10_000, &mut rng);
            if !run.slots[0].success {
                saw_early = true;
                assert!(run.early_reset);
                assert_eq!(run.trace_cost, 60);
                assert!(run.slots[1..].iter().all(|s| s.unfunded));
            } else {
                assert!(run.is_complete());
            }
        }
        assert!(saw_early);
    }

    #[test]
    fn test_safe_strategy_never_resets() {
        let mut rng = SmallRng::seed_from_u64(8);
        let out = simulate_scroll_with_resets(&Safe, &ScrollSettings::default(), 5_000, &mut rng);
        assert_eq!(out.resets, 0);
        assert!(out.met_bar);
        assert_eq!(out.trace_used, 300);
    }

    #[test]
    fn test_unreachable_bar_returns_best_run() {
        let strategy = MinSuccesses { required: 11, grade: ScrollGrade::High };
        let mut rng = SmallRng::seed_from_u64(8);
        let out = simulate_scroll_with_resets(&strategy, &ScrollSettings::default(), 3_000, &mut rng);
        assert!(!out.met_bar);
        assert!(out.run.is_complete());
        assert!(out.trace_used <= 3_000);
        // each cycle costs 300 + 500
        assert_eq!(out.resets, 3);
    }

    #[test]
    fn test_simulation_requires_class() {
        let req = ScrollSimulationRequest::default();
        let stats = StatAggregate::new();
        let err = run_scroll_simulation(&req, &stats, &DamageContext::default(), &mut Silent).unwrap_err();
        assert_eq!(err, CalcError::NoClassSelected);
    }

    #[test]
    fn test_simulation_report() {
        let req = ScrollSimulationRequest {
            simulations: 40,
            class: Some(JobClass::Mage),
            seed: Some(99),
            ..ScrollSimulationRequest::default()
        };
        let stats = StatAggregate::from_pairs([(StatKey::Attack, 3000.0), (StatKey::SkillCoefficient, 100.0)]);
        let ctx = DamageContext::default();
        let report = run_scroll_simulation(&req, &stats, &ctx, &mut Silent).unwrap();
        assert_eq!(report.strategies.len(), 6);
        for s in &report.strategies {
            assert_eq!(s.attack.samples, 40);
            assert!(s.dps_gain >= 0.0);
            assert!(s.mean_trace_used <= 5_000.0);
        }
        let safe = &report.strategies[0];
        assert_eq!(safe.strategy, "safe");
        assert_eq!(safe.bar_met_rate, 1.0);

        let par = run_scroll_simulation_parallel(&req, &stats, &ctx).unwrap();
        assert_eq!(par.strategies, report.strategies);
    }
}
