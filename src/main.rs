//! CLI entry point for DPS Forge

use clap::{Args, Parser, Subcommand, ValueEnum};
use dps_forge_lib::{
    calculate_upgrade_gain, plan_upgrades, run_cube_simulation, run_cube_simulation_parallel, run_scroll_simulation,
    run_scroll_simulation_parallel, CalculatorConfig, CubeEngine, GameData, PotentialType, Rarity, SetComparison,
    SlotCandidate, SlotId, StatCalculator,
};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use std::error::Error;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
struct Common {
    /// Path to the calculator configuration file (YAML or JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Game data override (YAML or JSON); built-in tables otherwise
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Damage breakdown for the configured stats
    Dps {
        #[command(flatten)]
        common: Common,
    },
    /// Attack and upgrade gain for each configured weapon
    Weapon {
        #[command(flatten)]
        common: Common,
    },
    /// Greedy upgrade plan for the configured budget
    Plan {
        #[command(flatten)]
        common: Common,
        /// Override the configured upgrade budget
        #[arg(long)]
        budget: Option<u64>,
    },
    /// Exact ranking of line combinations for one slot and rarity
    CubeRank {
        #[command(flatten)]
        common: Common,
        #[arg(long)]
        slot: SlotId,
        #[arg(long)]
        rarity: Rarity,
        /// Rank bonus potential instead of regular
        #[arg(long, default_value = "false")]
        bonus: bool,
        /// Rows to print in text mode
        #[arg(long, default_value = "20")]
        top: usize,
    },
    /// Best slot to cube next and a greedy cube sequence
    CubeEv {
        #[command(flatten)]
        common: Common,
        /// Cubes to plan
        #[arg(long, default_value = "100")]
        budget: usize,
        /// Monte-Carlo samples per slot evaluation
        #[arg(long, default_value = "200")]
        samples: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = "false")]
        bonus: bool,
    },
    /// Gain of each configured slot's equipped lines against its alternative set
    CubeCompare {
        #[command(flatten)]
        common: Common,
        #[arg(long, default_value = "false")]
        bonus: bool,
    },
    /// Cube strategy simulation
    CubeSim {
        #[command(flatten)]
        common: Common,
        /// Spread strategies over worker threads
        #[arg(short, long, default_value = "false")]
        parallel: bool,
    },
    /// Scroll strategy simulation
    ScrollSim {
        #[command(flatten)]
        common: Common,
        #[arg(short, long, default_value = "false")]
        parallel: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "dps-forge")]
#[command(version = "1.0")]
#[command(about = "Damage calculator and upgrade simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

type CliResult = Result<(), Box<dyn Error>>;

fn load(common: &Common) -> Result<(CalculatorConfig, GameData), Box<dyn Error>> {
    let config = CalculatorConfig::from_file(&common.config)?;
    let data = match &common.data {
        Some(path) => GameData::from_file(path)?,
        None => GameData::builtin(),
    };
    Ok((config, data))
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn potential_type(bonus: bool) -> PotentialType {
    if bonus {
        PotentialType::Bonus
    } else {
        PotentialType::Regular
    }
}

fn log_progress(done: usize, total: usize) -> ControlFlow<()> {
    tracing::debug!(done, total, "simulation progress");
    ControlFlow::Continue(())
}

fn cmd_dps(common: &Common) -> CliResult {
    let (config, _) = load(common)?;
    let b = StatCalculator::new(&config.stats).compute_in(&config.context());
    match common.output {
        OutputFormat::Json => print_json(&b)?,
        OutputFormat::Text => {
            println!("=== Damage Breakdown ===");
            println!("Target: {:?} (defense {:.1}%)", config.target, config.enemy_defense);
            println!();
            println!("Base Damage: {:.2}", b.base_damage);
            println!("Non-crit: {:.2} - {:.2} (avg {:.2})", b.non_crit.min, b.non_crit.max, b.non_crit.avg);
            println!("Crit: {:.2} - {:.2} (avg {:.2})", b.crit.min, b.crit.max, b.crit.avg);
            println!("Damage Amp: x{:.3}", b.damage_amp_multiplier);
            println!("Defense: x{:.3}", b.defense_multiplier);
            println!("Attack Speed: x{:.3}", b.attack_speed_multiplier);
            println!();
            println!("Expected Damage: {:.2}", b.expected_damage);
            println!("DPS: {:.2}", b.dps);
        }
    }
    Ok(())
}

fn cmd_weapon(common: &Common) -> CliResult {
    let (config, data) = load(common)?;
    let armory = config.armory();
    let rows: Vec<_> = armory
        .weapons()
        .iter()
        .map(|w| (w, w.attacks(&data), calculate_upgrade_gain(w, config.upgrade_budget, &data)))
        .collect();

    match common.output {
        OutputFormat::Json => {
            let out: Vec<_> = rows
                .iter()
                .map(|(w, attacks, gain)| serde_json::json!({ "weapon": w, "attacks": attacks, "upgrade": gain }))
                .collect();
            print_json(&out)?;
        }
        OutputFormat::Text => {
            println!("=== Weapons ===");
            for (w, attacks, gain) in &rows {
                let mark = if w.equipped { "*" } else { " " };
                println!(
                    "{} {} {} Lv.{}/{}: inventory {:.2}%, equipped {:.1}%",
                    mark,
                    w.rarity,
                    w.tier.name(),
                    w.level,
                    w.max_level(),
                    attacks.inventory_attack,
                    attacks.equipped_attack
                );
                if gain.is_unaffordable {
                    println!("    next level costs {} ({:.3} per 1000)", gain.single_level_cost, gain.efficiency);
                } else {
                    println!(
                        "    +{} levels for {}: +{:.2}% ({:.3} per 1000)",
                        gain.levels_gained,
                        gain.resources_used,
                        gain.attack_gain(w.equipped),
                        gain.efficiency
                    );
                }
            }
            println!();
            println!("Total attack: {:.2}%", armory.total_attack_percent(&data));
        }
    }
    Ok(())
}

fn cmd_plan(common: &Common, budget: Option<u64>) -> CliResult {
    let (config, data) = load(common)?;
    let budget = budget.unwrap_or(config.upgrade_budget);
    let plan = plan_upgrades(config.armory().weapons(), budget, &data);

    match common.output {
        OutputFormat::Json => print_json(&plan)?,
        OutputFormat::Text => {
            println!("=== Upgrade Plan ===");
            println!("Budget: {}  Spent: {}  Remaining: {}", budget, plan.spent, plan.remaining);
            println!();
            for (i, link) in plan.chain.iter().enumerate() {
                println!(
                    "{:>3}. weapon #{} ({} {}) Lv.{} -> {}: cost {}, +{:.2}%",
                    i + 1,
                    link.weapon,
                    link.rarity,
                    link.tier.name(),
                    link.from_level,
                    link.to_level,
                    link.cost,
                    link.gain
                );
            }
            println!();
            println!("Total gain: +{:.2}%", plan.total_gain);
            if plan.capped {
                println!("(stopped at the iteration cap)");
            }
        }
    }
    Ok(())
}

fn cmd_cube_rank(common: &Common, slot: SlotId, rarity: Rarity, bonus: bool, top: usize) -> CliResult {
    let (config, data) = load(common)?;
    let mut engine = CubeEngine::new(data, config.stats.clone(), config.context());
    let mut progress = log_progress;
    let rankings = engine.calculate_rankings_for_rarity(slot, potential_type(bonus), rarity, &mut progress)?;

    match common.output {
        OutputFormat::Json => print_json(&rankings.to_vec())?,
        OutputFormat::Text => {
            println!("=== {} {} rankings ({} distinct) ===", slot, rarity, rankings.len());
            for (i, entry) in rankings.iter().take(top).enumerate() {
                let lines: Vec<String> = entry
                    .set
                    .lines()
                    .iter()
                    .map(|l| format!("{} {}", l.stat.label(), l.value))
                    .collect();
                println!("{:>3}. +{:.3}%  {}", i + 1, entry.dps_gain, lines.join(" / "));
            }
        }
    }
    Ok(())
}

fn cmd_cube_ev(common: &Common, budget: usize, samples: usize, seed: Option<u64>, bonus: bool) -> CliResult {
    let (config, data) = load(common)?;
    let engine = CubeEngine::new(data, config.stats.clone(), config.context());
    let potential_type = potential_type(bonus);
    let candidates: Vec<SlotCandidate> = if config.cube.slots.is_empty() {
        SlotId::ALL
            .iter()
            .map(|&slot| SlotCandidate { slot, rarity: Rarity::Normal, roll_count: 0, current_gain: 0.0 })
            .collect()
    } else {
        config.cube.slots.iter().map(|s| engine.candidate(s, potential_type)).collect()
    };

    let mut rng = match seed {
        Some(s) => SmallRng::seed_from_u64(s),
        None => SmallRng::from_entropy(),
    };
    let next = engine.find_optimal_slot_to_cube(&candidates, potential_type, samples, &mut rng);
    let mut progress = log_progress;
    let sequence = engine.calculate_optimal_sequence(&candidates, potential_type, budget, samples, &mut rng, &mut progress)?;

    match common.output {
        OutputFormat::Json => print_json(&serde_json::json!({ "next": next, "sequence": sequence }))?,
        OutputFormat::Text => {
            println!("=== Cube Expected Value ===");
            println!("Base DPS: {:.2}", engine.base_dps());
            if let Some(choice) = next {
                println!(
                    "Next cube: {} (+{:.3}% expected, tier-up {:.1}%)",
                    choice.slot,
                    choice.gain.marginal_gain,
                    choice.gain.tier_up_probability * 100.0
                );
            }
            println!();
            println!("--- Priority ({} cubes) ---", budget);
            for row in &sequence.priority {
                println!(
                    "cubes {:>4}-{:<4} {:<9} x{:<4} -> {:<9} cumulative +{:.2}% ({:.0} DPS)",
                    row.from_cube, row.to_cube, row.slot, row.cubes, row.ending_rarity, row.cumulative_gain, row.cumulative_dps
                );
            }
        }
    }
    Ok(())
}

fn cmd_cube_compare(common: &Common, bonus: bool) -> CliResult {
    let (config, data) = load(common)?;
    let engine = CubeEngine::new(data, config.stats.clone(), config.context());
    let potential_type = potential_type(bonus);
    let rows: Vec<SetComparison> = config.cube.slots.iter().map(|s| engine.compare_sets(s, potential_type)).collect();

    match common.output {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Text => {
            println!("=== Set A vs Set B ===");
            if rows.is_empty() {
                println!("(no slots configured)");
            }
            for row in &rows {
                let verdict = if row.delta > 0.0 { "switch to B" } else { "keep A" };
                println!(
                    "{:<9} A +{:>6.3}%  B +{:>6.3}%  delta {:>+7.3}%  {}",
                    row.slot, row.gain_a, row.gain_b, row.delta, verdict
                );
            }
        }
    }
    Ok(())
}

fn cmd_cube_sim(common: &Common, parallel: bool) -> CliResult {
    let (config, data) = load(common)?;
    let engine = CubeEngine::new(data, config.stats.clone(), config.context());
    let request = config.cube_request();

    let start = Instant::now();
    let report = if parallel {
        run_cube_simulation_parallel(&engine, &request)?
    } else {
        let mut progress = log_progress;
        run_cube_simulation(&engine, &request, &mut progress)?
    };
    let elapsed = start.elapsed();

    match common.output {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("=== Cube Simulation ===");
            println!("Budget: {} cubes, {} simulations per strategy", request.budget, request.simulations);
            println!();
            for s in &report.strategies {
                println!(
                    "{:<28} mean +{:>7.2}% ± {:.2}  p10 {:.2}  p50 {:.2}  p90 {:.2}  tier-ups {:.1}",
                    s.strategy,
                    s.gain.mean,
                    s.gain.std_dev,
                    s.gain.percentiles.p10,
                    s.gain.percentiles.p50,
                    s.gain.percentiles.p90,
                    s.mean_tier_ups
                );
            }
            for f in &report.failures {
                println!("{:<28} FAILED: {}", f.strategy, f.reason);
            }
            println!();
            println!("Total time: {:.3}s", elapsed.as_secs_f64());
        }
    }
    Ok(())
}

fn cmd_scroll_sim(common: &Common, parallel: bool) -> CliResult {
    let (config, _) = load(common)?;
    let request = config.scroll_request();
    let ctx = config.context();

    let start = Instant::now();
    let report = if parallel {
        run_scroll_simulation_parallel(&request, &config.stats, &ctx)?
    } else {
        let mut progress = log_progress;
        run_scroll_simulation(&request, &config.stats, &ctx, &mut progress)?
    };
    let elapsed = start.elapsed();

    match common.output {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("=== Scroll Simulation ===");
            println!("Budget: {} trace, {} simulations per strategy", request.budget, request.simulations);
            println!();
            for s in &report.strategies {
                println!(
                    "{:<16} atk {:>6.1}  amp {:>5.2}  DPS +{:>6.2}%  resets {:>5.2}  trace {:>7.0}  bar met {:>5.1}%",
                    s.strategy,
                    s.mean_attack,
                    s.mean_damage_amp,
                    s.dps_gain,
                    s.mean_resets,
                    s.mean_trace_used,
                    s.bar_met_rate * 100.0
                );
            }
            for f in &report.failures {
                println!("{:<16} FAILED: {}", f.strategy, f.reason);
            }
            println!();
            println!("Total time: {:.3}s", elapsed.as_secs_f64());
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Dps { common } => cmd_dps(common),
        Command::Weapon { common } => cmd_weapon(common),
        Command::Plan { common, budget } => cmd_plan(common, *budget),
        Command::CubeRank { common, slot, rarity, bonus, top } => cmd_cube_rank(common, *slot, *rarity, *bonus, *top),
        Command::CubeEv { common, budget, samples, seed, bonus } => cmd_cube_ev(common, *budget, *samples, *seed, *bonus),
        Command::CubeCompare { common, bonus } => cmd_cube_compare(common, *bonus),
        Command::CubeSim { common, parallel } => cmd_cube_sim(common, *parallel),
        Command::ScrollSim { common, parallel } => cmd_scroll_sim(common, *parallel),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
